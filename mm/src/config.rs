use crate::mm_constants::{MAX_CPUS, STEAL_QUOTA};

/// Runtime tunables for [`crate::PagePools`].
///
/// Values are clamped into range by the `with_*` builders; constructing the
/// struct by hand skips that, and `PagePools::new` clamps again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// CPUs taking part in allocation and stealing (`1..=MAX_CPUS`).
    pub cpu_count: usize,
    /// Most pages moved per steal event.
    pub steal_quota: usize,
    /// Keep a free/allocated bit per page to catch double releases and
    /// free-list corruption. The bitmap lives in pages carved from the front
    /// of the managed range.
    pub track_page_state: bool,
}

impl PoolConfig {
    pub const DEFAULT: Self = Self {
        cpu_count: MAX_CPUS,
        steal_quota: STEAL_QUOTA,
        track_page_state: false,
    };

    pub const fn with_cpu_count(mut self, cpu_count: usize) -> Self {
        self.cpu_count = clamp_cpu_count(cpu_count);
        self
    }

    pub const fn with_steal_quota(mut self, steal_quota: usize) -> Self {
        self.steal_quota = if steal_quota == 0 { 1 } else { steal_quota };
        self
    }

    pub const fn with_page_state_tracking(mut self, enabled: bool) -> Self {
        self.track_page_state = enabled;
        self
    }

    pub(crate) const fn sanitized(self) -> Self {
        self.with_cpu_count(self.cpu_count)
            .with_steal_quota(self.steal_quota)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

const fn clamp_cpu_count(cpu_count: usize) -> usize {
    if cpu_count == 0 {
        1
    } else if cpu_count > MAX_CPUS {
        MAX_CPUS
    } else {
        cpu_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_clamp_out_of_range_values() {
        let config = PoolConfig::DEFAULT
            .with_cpu_count(0)
            .with_steal_quota(0);
        assert_eq!(config.cpu_count, 1);
        assert_eq!(config.steal_quota, 1);

        assert_eq!(PoolConfig::DEFAULT.with_cpu_count(64).cpu_count, MAX_CPUS);
    }

    #[test]
    fn sanitized_fixes_hand_built_configs() {
        let raw = PoolConfig {
            cpu_count: 100,
            steal_quota: 0,
            track_page_state: true,
        };
        let config = raw.sanitized();
        assert_eq!(config.cpu_count, MAX_CPUS);
        assert_eq!(config.steal_quota, 1);
        assert!(config.track_page_state);
    }
}
