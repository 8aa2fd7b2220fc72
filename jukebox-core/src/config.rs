use std::time::Duration;

/// Timing behavior shared by the coordinator and its observers.
#[derive(Debug, Clone)]
pub struct Config {
    /// How far a local playback position may drift from the expected position
    /// before it is corrected, in seconds.
    pub sync_tolerance_in_seconds: f32,
    /// How often a playing observer resynchronizes against a status snapshot,
    /// in seconds.
    pub resync_interval_in_seconds: f32,
}

impl Config {
    /// The drift tolerance as a [Duration].
    pub fn sync_tolerance(&self) -> Duration {
        Duration::from_secs_f32(self.sync_tolerance_in_seconds)
    }

    /// The resync interval as a [Duration].
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs_f32(self.resync_interval_in_seconds)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_tolerance_in_seconds: 0.1,
            resync_interval_in_seconds: 5.,
        }
    }
}
