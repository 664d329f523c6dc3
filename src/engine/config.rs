//! Engine-level settings, separate from market economics.

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bounded event log length; oldest entries drop first.
    pub max_events: usize,
    /// Batch size for draining the book at settlement.
    pub drain_batch: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_events: 10_000,
            drain_batch: 64,
        }
    }
}
