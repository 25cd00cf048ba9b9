//! Gauge of live connection engines.

/// RAII guard held by a supervisor for the lifetime of its connection.
///
/// Keeps the active-connections gauge in step with running supervisors.
pub(super) struct ActiveConnection;

impl ActiveConnection {
    pub(super) fn new() -> Self {
        crate::metrics::inc_connections();
        Self
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) { crate::metrics::dec_connections(); }
}
