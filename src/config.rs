use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{ensure, Result};
use clap::{Parser, ValueEnum};

use crate::nfc::DiscoveryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Simulated tag held in memory.
    Memory,
    /// ACR122U-class reader through PC/SC (needs the `pcsc` feature).
    Pcsc,
}

/// HTTP API for reading and writing NTAG records.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct Config {
    /// Address to listen on.
    #[arg(long, env = "NTAG_BIND", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// Reader backend.
    #[arg(long, env = "NTAG_BACKEND", value_enum, default_value_t = Backend::Memory)]
    pub backend: Backend,

    /// Substring of the PC/SC reader name to use. Defaults to the first reader.
    #[arg(long, env = "NTAG_READER")]
    pub reader: Option<String>,

    /// How long to wait for a tag, in milliseconds.
    #[arg(long, env = "NTAG_DISCOVERY_TIMEOUT_MS", default_value_t = 10_000)]
    pub discovery_timeout_ms: u64,

    /// How long a single reader poll may wait, in milliseconds.
    #[arg(long, env = "NTAG_POLL_TIMEOUT_MS", default_value_t = 500)]
    pub poll_timeout_ms: u64,

    /// Pause between reader polls, in milliseconds.
    #[arg(long, env = "NTAG_POLL_INTERVAL_MS", default_value_t = 100)]
    pub poll_interval_ms: u64,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.discovery_timeout_ms > 0, "discovery timeout must be non-zero");
        ensure!(self.poll_timeout_ms > 0, "poll timeout must be non-zero");
        ensure!(self.poll_interval_ms > 0, "poll interval must be non-zero");
        Ok(())
    }

    pub fn discovery(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            timeout: Duration::from_millis(self.discovery_timeout_ms),
            poll_timeout: Duration::from_millis(self.poll_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_discovery_defaults() {
        let config = Config::try_parse_from(["ntag-bridge"]).unwrap();
        config.validate().unwrap();
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.bind, "0.0.0.0:8000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.discovery(), DiscoveryConfig::default());
    }

    #[test]
    fn parses_flags() {
        let config = Config::try_parse_from([
            "ntag-bridge",
            "--backend",
            "pcsc",
            "--reader",
            "ACR122",
            "--discovery-timeout-ms",
            "2500",
        ])
        .unwrap();
        assert_eq!(config.backend, Backend::Pcsc);
        assert_eq!(config.reader.as_deref(), Some("ACR122"));
        assert_eq!(config.discovery().timeout, Duration::from_millis(2500));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = Config::try_parse_from(["ntag-bridge", "--poll-interval-ms", "0"]).unwrap();
        assert!(config.validate().is_err());
    }
}
