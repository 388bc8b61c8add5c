//! Logging macros that set target to "guac_gateway" for all log calls.
//!
//! Without an explicit target, tracing uses the full module path
//! (e.g., "guac_gateway::tunnel::intercept::output"), creating overly
//! verbose logger names when the gateway is embedded in a larger host.
//! These macros ensure all logs from this crate use a single
//! "guac_gateway" target.

macro_rules! trace {
    ($($arg:tt)*) => { ::tracing::trace!(target: "guac_gateway", $($arg)*) };
}

macro_rules! debug {
    ($($arg:tt)*) => { ::tracing::debug!(target: "guac_gateway", $($arg)*) };
}

macro_rules! info {
    ($($arg:tt)*) => { ::tracing::info!(target: "guac_gateway", $($arg)*) };
}

macro_rules! warn {
    ($($arg:tt)*) => { ::tracing::warn!(target: "guac_gateway", $($arg)*) };
}

macro_rules! error {
    ($($arg:tt)*) => { ::tracing::error!(target: "guac_gateway", $($arg)*) };
}
