use std::time::Duration;

use super::clock::Clock;
use super::gossip::default_needs_more_gossip;

/// Tunables of the failure detector. Defaults suit a LAN cluster; every value
/// can be overridden before constructing the instance.
#[derive(Clone, Debug)]
pub struct SwimSettings {
    /// Base interval between protocol periods, before local-health dilation.
    pub probe_interval: Duration,
    /// Base timeout for a direct ping, before local-health dilation.
    pub ping_timeout: Duration,
    /// How many peers are asked to probe on our behalf when a direct ping
    /// times out.
    pub indirect_probe_count: usize,
    /// Factor applied to `ping_timeout` for the pings an intermediary sends
    /// on behalf of someone else; below 1 so the intermediary can still nack
    /// within the origin's window.
    pub indirect_ping_timeout_multiplier: f64,
    /// When disabled (the default), any transition that would produce
    /// `unreachable` is promoted straight to `dead`.
    pub unreachability_enabled: bool,
    pub lifeguard: LifeguardSettings,
    pub gossip: GossipSettings,
    pub clock: Clock,
    /// Seed for the instance RNG; `None` seeds from entropy.
    pub rng_seed: Option<u64>,
}

impl Default for SwimSettings {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(1),
            ping_timeout: Duration::from_millis(300),
            indirect_probe_count: 3,
            indirect_ping_timeout_multiplier: 0.8,
            unreachability_enabled: false,
            lifeguard: LifeguardSettings::default(),
            gossip: GossipSettings::default(),
            clock: Clock::monotonic(),
            rng_seed: None,
        }
    }
}

/// Lifeguard extension knobs.
#[derive(Clone, Debug)]
pub struct LifeguardSettings {
    /// Ceiling for the local health multiplier.
    pub max_local_health_multiplier: u32,
    /// Suspicion timeout once `max_independent_suspicions` nodes agree.
    pub suspicion_timeout_min: Duration,
    /// Suspicion timeout when nobody else has confirmed the suspicion.
    pub suspicion_timeout_max: Duration,
    /// Cap on the suspected-by set, and the K of the decay formula.
    pub max_independent_suspicions: usize,
}

impl Default for LifeguardSettings {
    fn default() -> Self {
        Self {
            max_local_health_multiplier: 8,
            suspicion_timeout_min: Duration::from_secs(3),
            suspicion_timeout_max: Duration::from_secs(10),
            max_independent_suspicions: 4,
        }
    }
}

#[derive(Clone, Debug)]
pub struct GossipSettings {
    /// Cap on member records per outgoing payload; keeps a payload well under
    /// a single UDP datagram.
    pub max_messages_per_gossip: usize,
    /// Predicate deciding whether an entry gossiped this many times should
    /// ride along again, given the current cluster size.
    pub needs_more_gossip: fn(u64, usize) -> bool,
}

impl Default for GossipSettings {
    fn default() -> Self {
        Self {
            max_messages_per_gossip: 12,
            needs_more_gossip: default_needs_more_gossip,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = SwimSettings::default();
        assert!(settings.indirect_ping_timeout_multiplier < 1.0);
        assert!(settings.ping_timeout < settings.probe_interval);
        assert!(
            settings.lifeguard.suspicion_timeout_min < settings.lifeguard.suspicion_timeout_max
        );
        assert!(!settings.unreachability_enabled);
    }

    #[test]
    fn settings_are_cloneable() {
        // The instance and the shell both keep a copy.
        let settings = SwimSettings::default();
        let cloned = settings.clone();
        assert_eq!(
            cloned.gossip.max_messages_per_gossip,
            settings.gossip.max_messages_per_gossip
        );
    }
}
