/// Trait for crediting a sensor after one of its events has been persisted
///
/// Implementations must return immediately: any ledger work happens in a
/// detached task whose outcome is logged and never reported back. Callers
/// cannot observe completion and must not depend on it.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait SensorRewarder: Send + Sync {
    /// Start a best-effort reward for `sensor_id`
    fn settle(&self, sensor_id: &str);
}
