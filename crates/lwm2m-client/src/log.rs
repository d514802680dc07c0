use alloc::format;
use alloc::string::String;

/// Trait for structs that provide metadata to prefix a log line with.
pub trait LogMetadata {
    fn meta(&self) -> String;
}

/// Log context for exchange-related messages: which server, which direction.
pub struct ExchangeContext {
    pub ssid: crate::types::Ssid,
    pub client_initiated: bool,
}

impl LogMetadata for ExchangeContext {
    fn meta(&self) -> String {
        format!(
            "ssid={}, dir={}",
            self.ssid,
            if self.client_initiated { "client" } else { "server" }
        )
    }
}

/// Log context for observation-related messages.
pub struct ObserveContext {
    pub ssid: crate::types::Ssid,
    pub token: &'static str,
}

impl LogMetadata for ObserveContext {
    fn meta(&self) -> String {
        format!("ssid={}, token={}", self.ssid, self.token)
    }
}

// =============================================
// Logging Macros (namespaced under crate::log)
// =============================================

macro_rules! lwm2m_info {
    ($ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let meta = $crate::log::LogMetadata::meta(&$ctx);
        log::info!(concat!("[{}] ", $fmt), meta $(, $($arg)+)?);
    }};
    ($fmt:literal $(, $($arg:tt)+)?) => {{
        log::info!($fmt $(, $($arg)+)?);
    }};
}

macro_rules! lwm2m_warn {
    ($ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let meta = $crate::log::LogMetadata::meta(&$ctx);
        log::warn!(concat!("[{}] ", $fmt), meta $(, $($arg)+)?);
    }};
    ($fmt:literal $(, $($arg:tt)+)?) => {{
        log::warn!($fmt $(, $($arg)+)?);
    }};
}

macro_rules! lwm2m_error {
    ($ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let meta = $crate::log::LogMetadata::meta(&$ctx);
        log::error!(concat!("[{}] ", $fmt), meta $(, $($arg)+)?);
    }};
    ($fmt:literal $(, $($arg:tt)+)?) => {{
        log::error!($fmt $(, $($arg)+)?);
    }};
}

macro_rules! lwm2m_debug {
    ($ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let meta = $crate::log::LogMetadata::meta(&$ctx);
        log::debug!(concat!("[{}] ", $fmt), meta $(, $($arg)+)?);
    }};
    ($fmt:literal $(, $($arg:tt)+)?) => {{
        log::debug!($fmt $(, $($arg)+)?);
    }};
}

macro_rules! lwm2m_trace {
    ($ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let meta = $crate::log::LogMetadata::meta(&$ctx);
        log::trace!(concat!("[{}] ", $fmt), meta $(, $($arg)+)?);
    }};
    ($fmt:literal $(, $($arg:tt)+)?) => {{
        log::trace!($fmt $(, $($arg)+)?);
    }};
}

pub(crate) use lwm2m_debug;
pub(crate) use lwm2m_error;
pub(crate) use lwm2m_info;
pub(crate) use lwm2m_trace;
pub(crate) use lwm2m_warn;
