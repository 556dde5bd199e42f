use std::time::Duration;

use super::settings::LifeguardSettings;

/// Lifeguard suspicion timeout for a member suspected by `suspected_by_count`
/// independent nodes.
///
/// Decays logarithmically from the configured maximum towards the minimum as
/// confirmations accumulate:
///
/// ```text
/// T = max(Min, Max - (Max - Min) * log2(c + 1) / log2(K + 1))
/// ```
///
/// With zero confirmations the full maximum applies; at K independent
/// suspicions the timeout bottoms out at the minimum.
pub(crate) fn suspicion_timeout(
    suspected_by_count: usize,
    lifeguard: &LifeguardSettings,
) -> Duration {
    let min = lifeguard.suspicion_timeout_min.as_nanos() as f64;
    let max = lifeguard.suspicion_timeout_max.as_nanos() as f64;
    let c = suspected_by_count as f64;
    let k = lifeguard.max_independent_suspicions as f64;

    let timeout = max - (max - min) * ((c + 1.0).log2() / (k + 1.0).log2());
    Duration::from_nanos(timeout.max(min) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lifeguard(min_secs: u64, max_secs: u64, k: usize) -> LifeguardSettings {
        LifeguardSettings {
            suspicion_timeout_min: Duration::from_secs(min_secs),
            suspicion_timeout_max: Duration::from_secs(max_secs),
            max_independent_suspicions: k,
            ..LifeguardSettings::default()
        }
    }

    #[test]
    fn no_confirmations_means_maximum_timeout() {
        let settings = lifeguard(1, 10, 3);
        assert_eq!(suspicion_timeout(0, &settings), Duration::from_secs(10));
    }

    #[test]
    fn full_confirmations_means_minimum_timeout() {
        let settings = lifeguard(1, 10, 3);
        assert_eq!(suspicion_timeout(3, &settings), Duration::from_secs(1));
    }

    #[test]
    fn single_confirmation_with_k_three_halves_the_span() {
        // log2(2) / log2(4) = 0.5, so T = 10 - 9 * 0.5 = 5.5s.
        let settings = lifeguard(1, 10, 3);
        assert_eq!(
            suspicion_timeout(1, &settings),
            Duration::from_millis(5500)
        );
    }

    #[test]
    fn timeout_decreases_monotonically_with_confirmations() {
        let settings = lifeguard(1, 30, 8);
        let mut previous = suspicion_timeout(0, &settings);
        for c in 1..=8 {
            let current = suspicion_timeout(c, &settings);
            assert!(current < previous, "c={c}: {current:?} >= {previous:?}");
            previous = current;
        }
    }

    #[test]
    fn never_drops_below_the_minimum() {
        let settings = lifeguard(2, 10, 3);
        // More confirmations than K can arrive before the cap is applied.
        assert_eq!(suspicion_timeout(30, &settings), Duration::from_secs(2));
    }
}
