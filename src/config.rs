use std::net::SocketAddr;
use std::sync::LazyLock;
use std::time::Duration;

use clap::Parser;

use crate::swim::SwimSettings;

pub static ENV: LazyLock<Environment> = LazyLock::new(Environment::parse);

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Environment {
    /// --port or -p or PORT=
    #[arg(short, long, env = "PORT", default_value_t = 7946)]
    pub port: u16,

    /// --host or HOST=
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Comma-separated seed addresses to join through.
    #[arg(long, env = "SEEDS", value_delimiter = ',')]
    pub seeds: Vec<SocketAddr>,

    /// Base protocol period in milliseconds.
    #[arg(long, env = "PROBE_INTERVAL_MS", default_value_t = 1000)]
    pub probe_interval_ms: u64,

    /// Base direct-ping timeout in milliseconds.
    #[arg(long, env = "PING_TIMEOUT_MS", default_value_t = 300)]
    pub ping_timeout_ms: u64,
}

impl Environment {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn swim_settings(&self) -> SwimSettings {
        SwimSettings {
            probe_interval: Duration::from_millis(self.probe_interval_ms),
            ping_timeout: Duration::from_millis(self.ping_timeout_ms),
            ..SwimSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults() {
        let args = vec!["swimguard"];

        let env = Environment::try_parse_from(args).expect("Failed to parse defaults");

        assert_eq!(env.port, 7946);
        assert_eq!(env.host, "127.0.0.1");
        assert!(env.seeds.is_empty());
        assert_eq!(env.bind_addr(), "127.0.0.1:7946");
    }

    #[test]
    fn test_flags_override() {
        let args = vec![
            "swimguard",
            "--port",
            "9999",
            "--host",
            "0.0.0.0",
            "--seeds",
            "10.0.0.1:7946,10.0.0.2:7946",
        ];

        let env = Environment::try_parse_from(args).expect("Failed to parse flags");

        assert_eq!(env.port, 9999);
        assert_eq!(env.host, "0.0.0.0");
        assert_eq!(
            env.seeds,
            vec![
                "10.0.0.1:7946".parse::<SocketAddr>().unwrap(),
                "10.0.0.2:7946".parse::<SocketAddr>().unwrap(),
            ]
        );
    }

    #[test]
    fn test_timings_map_into_settings() {
        let args = vec![
            "swimguard",
            "--probe-interval-ms",
            "500",
            "--ping-timeout-ms",
            "100",
        ];

        let env = Environment::try_parse_from(args).expect("Failed to parse timings");
        let settings = env.swim_settings();

        assert_eq!(settings.probe_interval, Duration::from_millis(500));
        assert_eq!(settings.ping_timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_invalid_seed_input() {
        let args = vec!["swimguard", "--seeds", "not-an-address"];

        let result = Environment::try_parse_from(args);
        assert!(result.is_err());
    }
}
