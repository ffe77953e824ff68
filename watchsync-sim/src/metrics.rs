//! Drift tracking for the simulator

/// Drift statistics for one follower
#[derive(Debug, Clone, Default)]
pub struct FollowerStats {
    pub samples: u64,
    pub total_drift: f64,
    pub max_drift: f64,
    /// Drift at the last sample
    pub last_drift: f64,
    pub corrections: usize,
}

impl FollowerStats {
    pub fn mean_drift(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.total_drift / self.samples as f64
        }
    }
}

/// Simulation metrics
pub struct Metrics {
    pub followers: Vec<FollowerStats>,
    /// Host broadcasts that reached the hub
    pub broadcasts: usize,
    pub errors: u64,
}

impl Metrics {
    pub fn new(followers: usize) -> Self {
        Self {
            followers: vec![FollowerStats::default(); followers],
            broadcasts: 0,
            errors: 0,
        }
    }

    /// Record one drift sample (seconds, absolute) for a follower
    pub fn record_drift(&mut self, follower: usize, drift: f64) {
        if let Some(stats) = self.followers.get_mut(follower) {
            stats.samples += 1;
            stats.total_drift += drift;
            stats.max_drift = stats.max_drift.max(drift);
            stats.last_drift = drift;
        }
    }

    pub fn summary(&self) -> String {
        let mut out = format!(
            "Host broadcasts: {}, reported errors: {}\n",
            self.broadcasts, self.errors
        );
        for (i, stats) in self.followers.iter().enumerate() {
            out.push_str(&format!(
                "  guest-{}: mean drift {:.3}s, max {:.3}s, final {:.3}s, corrections {}\n",
                i, stats.mean_drift(), stats.max_drift, stats.last_drift, stats.corrections
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drift_stats() {
        let mut m = Metrics::new(2);
        m.record_drift(0, 0.2);
        m.record_drift(0, 0.6);
        m.record_drift(5, 9.0);

        assert_eq!(m.followers[0].samples, 2);
        assert!((m.followers[0].mean_drift() - 0.4).abs() < 1e-9);
        assert_eq!(m.followers[0].max_drift, 0.6);
        assert_eq!(m.followers[1].mean_drift(), 0.0);
        assert!(m.summary().contains("guest-1"));
    }
}
