// crates/lwm2m-client/src/observe/attributes.rs

//! Write-Attributes storage and inheritance (spec §4.7): one bounded table of
//! `(ssid, path) -> Attributes` entries, overlaid root-to-path to produce an
//! observation's effective attributes.

use alloc::string::String;

use crate::dm::ResourceKind;
use crate::error::CoreError;
use crate::types::{Ssid, MAX_WRITE_ATTRIBUTES, SSID_BOOTSTRAP};

/// One notification-attributes set. Every field absent means "not set at this
/// level"; `overlay` lets a child path's present fields win over an ancestor's.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Attributes {
    pub pmin: Option<u32>,
    pub pmax: Option<u32>,
    pub lt: Option<f64>,
    pub gt: Option<f64>,
    pub st: Option<f64>,
    pub edge: Option<bool>,
    pub epmin: Option<u32>,
    pub epmax: Option<u32>,
    pub con: Option<bool>,
}

impl Attributes {
    /// Overlays `self` (closer to the path) atop `ancestor`, used while
    /// inheriting root-to-path (§4.7).
    pub fn overlay(ancestor: &Attributes, closer: &Attributes) -> Attributes {
        Attributes {
            pmin: closer.pmin.or(ancestor.pmin),
            pmax: closer.pmax.or(ancestor.pmax),
            lt: closer.lt.or(ancestor.lt),
            gt: closer.gt.or(ancestor.gt),
            st: closer.st.or(ancestor.st),
            edge: closer.edge.or(ancestor.edge),
            epmin: closer.epmin.or(ancestor.epmin),
            epmax: closer.epmax.or(ancestor.epmax),
            con: closer.con.or(ancestor.con),
        }
    }

    pub fn has_change_value_condition(&self) -> bool {
        self.lt.is_some() || self.gt.is_some() || self.st.is_some() || self.edge.is_some()
    }

    /// Drops `lt`/`gt`/`st`/`edge`: they never apply to composite
    /// observations, multi-instance resources, or anything but a plain
    /// resource (§4.7, silently dropped rather than rejected).
    pub fn without_change_value(&self) -> Attributes {
        Attributes { lt: None, gt: None, st: None, edge: None, ..*self }
    }

    /// Validates the combination per §4.7. Resource-type-dependent checks
    /// (`lt/gt/st` need a numeric resource, `edge` needs boolean) are the
    /// caller's responsibility since they need `get_resource_type`.
    pub fn validate(&self) -> Result<(), CoreError> {
        if let (Some(mn), Some(mx)) = (self.epmin, self.epmax) {
            if mn >= mx {
                return Err(CoreError::InvalidAttributes("epmin must be less than epmax"));
            }
        }
        if let (Some(lt), Some(gt)) = (self.lt, self.gt) {
            if lt >= gt {
                return Err(CoreError::InvalidAttributes("lt must be less than gt"));
            }
            if let Some(st) = self.st {
                if lt + 2.0 * st >= gt {
                    return Err(CoreError::InvalidAttributes("lt + 2*st must be less than gt"));
                }
            }
        }
        Ok(())
    }

    /// Checks a resource's declared type against the attributes that require
    /// a specific kind, dropping ones that do not apply rather than failing
    /// the whole request (§4.7 "silently drop").
    pub fn applicable_to(&self, kind: ResourceKind, is_multi_instance: bool, is_composite: bool) -> Attributes {
        if is_composite || is_multi_instance || !matches!(kind, ResourceKind::Integer | ResourceKind::UnsignedInteger | ResourceKind::Float | ResourceKind::Boolean) {
            return self.without_change_value();
        }
        let numeric = matches!(kind, ResourceKind::Integer | ResourceKind::UnsignedInteger | ResourceKind::Float);
        let boolean = matches!(kind, ResourceKind::Boolean);
        let mut out = *self;
        if !numeric {
            out.lt = None;
            out.gt = None;
            out.st = None;
        }
        if !boolean {
            out.edge = None;
        }
        out
    }
}

/// One stored Write-Attributes row. A free slot is marked by
/// `ssid == SSID_BOOTSTRAP` (0), which never originates a real observation.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeEntry {
    pub ssid: Ssid,
    pub path: String,
    pub attrs: Attributes,
}

impl AttributeEntry {
    fn free() -> Self {
        AttributeEntry { ssid: SSID_BOOTSTRAP, path: String::new(), attrs: Attributes::default() }
    }

    fn is_free(&self) -> bool {
        self.ssid == SSID_BOOTSTRAP
    }
}

/// Bounded `(ssid, path) -> Attributes` table (`MAX_WRITE_ATTRIBUTES` rows).
pub struct AttributeStore {
    entries: [AttributeEntry; MAX_WRITE_ATTRIBUTES],
}

impl AttributeStore {
    pub fn new() -> Self {
        AttributeStore { entries: core::array::from_fn(|_| AttributeEntry::free()) }
    }

    fn slot_for(&self, ssid: Ssid, path: &str) -> Option<usize> {
        self.entries.iter().position(|e| !e.is_free() && e.ssid == ssid && e.path == path)
    }

    /// Inserts or updates the attributes stored for `(ssid, path)`.
    pub fn set(&mut self, ssid: Ssid, path: &str, attrs: Attributes) -> Result<(), CoreError> {
        attrs.validate()?;
        if let Some(i) = self.slot_for(ssid, path) {
            self.entries[i].attrs = attrs;
            return Ok(());
        }
        let free = self.entries.iter().position(|e| e.is_free()).ok_or(CoreError::AttributeStoreFull)?;
        self.entries[free] = AttributeEntry { ssid, path: String::from(path), attrs };
        Ok(())
    }

    /// Drops every entry for `ssid` whose path is `subtree_prefix` or nested
    /// under it (§4.7 "deleted" data-model-change handling).
    pub fn remove_subtree(&mut self, ssid: Ssid, subtree_prefix: &str) {
        for e in self.entries.iter_mut() {
            if !e.is_free() && e.ssid == ssid && path_is_within(&e.path, subtree_prefix) {
                *e = AttributeEntry::free();
            }
        }
    }

    /// Produces the effective attributes for `path` by inheriting from the
    /// root (`/obj`, `/obj/iid`, `/obj/iid/rid`, `/obj/iid/rid/riid`) toward
    /// the leaf, overlaying each stored entry found along the way.
    pub fn effective_for(&self, ssid: Ssid, path: &str) -> Attributes {
        let mut acc = Attributes::default();
        for ancestor in ancestor_paths(path) {
            if let Some(i) = self.slot_for(ssid, ancestor) {
                acc = Attributes::overlay(&acc, &self.entries[i].attrs);
            }
        }
        acc
    }
}

impl Default for AttributeStore {
    fn default() -> Self {
        Self::new()
    }
}

/// True if `path` equals `prefix` or is nested under it (`prefix` is itself
/// one of its own ancestors).
fn path_is_within(path: &str, prefix: &str) -> bool {
    path == prefix || path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'/')
}

/// Yields `path`'s ancestor URIs from the root object down to `path` itself,
/// e.g. `/3/0/1` yields `/3`, `/3/0`, `/3/0/1`.
fn ancestor_paths(path: &str) -> impl Iterator<Item = &str> {
    let mut boundaries = path
        .char_indices()
        .filter(|&(_, c)| c == '/')
        .map(|(i, _)| i)
        .skip(1)
        .collect::<alloc::vec::Vec<_>>();
    boundaries.push(path.len());
    boundaries.into_iter().map(move |end| &path[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ancestor_paths_walks_root_to_leaf() {
        let got: alloc::vec::Vec<&str> = ancestor_paths("/3/0/1").collect();
        assert_eq!(got, alloc::vec!["/3", "/3/0", "/3/0/1"]);
    }

    #[test]
    fn overlay_prefers_closer_attribute() {
        let root = Attributes { pmax: Some(60), ..Default::default() };
        let leaf = Attributes { pmax: Some(10), ..Default::default() };
        let eff = Attributes::overlay(&root, &leaf);
        assert_eq!(eff.pmax, Some(10));
    }

    #[test]
    fn effective_for_inherits_from_object_level() {
        let mut store = AttributeStore::new();
        store.set(1, "/3", Attributes { pmax: Some(60), ..Default::default() }).unwrap();
        store.set(1, "/3/0/1", Attributes { pmin: Some(5), ..Default::default() }).unwrap();
        let eff = store.effective_for(1, "/3/0/1");
        assert_eq!(eff.pmax, Some(60));
        assert_eq!(eff.pmin, Some(5));
    }

    #[test]
    fn validate_rejects_inverted_epmin_epmax() {
        let a = Attributes { epmin: Some(10), epmax: Some(5), ..Default::default() };
        assert!(a.validate().is_err());
    }

    #[test]
    fn validate_rejects_lt_plus_2st_crossing_gt() {
        let a = Attributes { lt: Some(10.0), gt: Some(20.0), st: Some(6.0), ..Default::default() };
        assert!(a.validate().is_err());
    }

    #[test]
    fn remove_subtree_drops_nested_entries_only() {
        let mut store = AttributeStore::new();
        store.set(1, "/3/0/1", Attributes::default()).unwrap();
        store.set(1, "/4/0/1", Attributes::default()).unwrap();
        store.remove_subtree(1, "/3");
        assert_eq!(store.effective_for(1, "/3/0/1"), Attributes::default());
        assert!(store.slot_for(1, "/4/0/1").is_some());
    }

    #[test]
    fn store_full_is_reported() {
        let mut store = AttributeStore::new();
        for i in 0..MAX_WRITE_ATTRIBUTES {
            store.set(1, alloc::format!("/{i}").as_str(), Attributes::default()).unwrap();
        }
        assert_eq!(store.set(1, "/overflow", Attributes::default()), Err(CoreError::AttributeStoreFull));
    }
}
