//! Tick counting for the service loop.

/// Decides which ticks of the service loop refresh the network snapshot.
///
/// Fires on step 0 and then every `refresh_every` steps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshSchedule {
    step: u64,
    refresh_every: u64,
}

impl RefreshSchedule {
    pub fn new(refresh_every: u64) -> Self {
        Self {
            step: 0,
            refresh_every: refresh_every.max(1),
        }
    }

    /// Advance one tick; true when this tick should refresh
    pub fn on_tick(&mut self) -> bool {
        let due = self.step % self.refresh_every == 0;
        self.step = self.step.wrapping_add(1);
        due
    }

    pub fn step(&self) -> u64 {
        self.step
    }
}
