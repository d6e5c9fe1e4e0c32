use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::connection::ConnectionTimeouts;
use crate::error::{ConfigError, ValidationError};
use crate::protocol::{ConnectParams, ServerDescriptor};

// Default configuration
pub const DEFAULT_SERVER: &str = "irc.slirc.net:6667";
pub const DEFAULT_CHANNEL: &str = "#straylight";
pub const DEFAULT_COMMAND_PREFIX: char = '/';

/// Represents a saved IRC network with connection settings
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Network {
    pub name: String,
    pub servers: Vec<String>, // e.g. ["irc.libera.chat:6667", "irc.libera.chat:6697"]
    pub nick: String,
    #[serde(default)]
    pub auto_connect: bool,
    #[serde(default)]
    pub auto_join: Vec<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub use_tls: bool,
}

impl Default for Network {
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            servers: vec![DEFAULT_SERVER.to_string()],
            nick: "slirc_user".to_string(),
            auto_connect: false,
            auto_join: vec![DEFAULT_CHANNEL.to_string()],
            password: None,
            use_tls: false,
        }
    }
}

impl Network {
    /// Connection parameters for the first configured server.
    pub fn connect_params(&self) -> Result<ConnectParams, ValidationError> {
        let addr = self.servers.first().ok_or(ValidationError::EmptyServer)?;
        let server = ServerDescriptor::parse(addr, self.use_tls)?;
        let mut params =
            ConnectParams::new(server, &self.nick).with_auto_join(self.auto_join.iter().cloned());
        params.password = self.password.clone();
        Ok(params)
    }
}

/// Where conversation transcripts are written.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct TranscriptSettings {
    pub enabled: bool,
    /// Defaults to the platform data directory.
    pub directory: Option<PathBuf>,
}

/// Session configuration. Missing fields take their defaults.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub command_prefix: char,
    pub connect_timeout_ms: u64,
    pub disconnect_timeout_ms: u64,
    /// How long `/topic <text>` waits for the server to echo the change.
    pub topic_timeout_ms: u64,
    /// How long `/part` waits for the server to confirm.
    pub part_timeout_ms: u64,
    pub quit_message: String,
    /// Keywords forwarded verbatim in addition to the built-in list.
    pub extra_raw_commands: Vec<String>,
    pub transcripts: TranscriptSettings,
    pub networks: Vec<Network>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_prefix: DEFAULT_COMMAND_PREFIX,
            connect_timeout_ms: 30_000,
            disconnect_timeout_ms: 5_000,
            topic_timeout_ms: 10_000,
            part_timeout_ms: 10_000,
            quit_message: "Leaving".to_string(),
            extra_raw_commands: Vec::new(),
            transcripts: TranscriptSettings::default(),
            networks: Vec::new(),
        }
    }
}

impl SessionConfig {
    pub fn connection_timeouts(&self) -> ConnectionTimeouts {
        ConnectionTimeouts {
            connect: Duration::from_millis(self.connect_timeout_ms),
            disconnect: Duration::from_millis(self.disconnect_timeout_ms),
        }
    }

    pub fn topic_timeout(&self) -> Duration {
        Duration::from_millis(self.topic_timeout_ms)
    }

    pub fn part_timeout(&self) -> Duration {
        Duration::from_millis(self.part_timeout_ms)
    }

    pub fn network(&self, name: &str) -> Option<&Network> {
        self.networks
            .iter()
            .find(|n| n.name.eq_ignore_ascii_case(name))
    }
}

/// Platform config file location, creating its directory.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let proj = ProjectDirs::from("com", "sid3xyz", "slirc-session").ok_or(ConfigError::NoConfigDir)?;
    let dir = proj.config_dir();
    fs::create_dir_all(dir)?;
    Ok(dir.join("session.json"))
}

pub fn load_config(path: &Path) -> Result<SessionConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn save_config(path: &Path, config: &SessionConfig) -> Result<(), ConfigError> {
    let data = serde_json::to_string_pretty(config)?;
    let mut file = fs::File::create(path)?;
    file.write_all(data.as_bytes())?;
    Ok(())
}

/// Load from the platform location, falling back to defaults if absent.
pub fn load_default() -> Result<SessionConfig, ConfigError> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(SessionConfig::default());
    }
    load_config(&path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let cfg: SessionConfig =
            serde_json::from_str(r#"{ "command_prefix": "!", "topic_timeout_ms": 250 }"#).unwrap();
        assert_eq!(cfg.command_prefix, '!');
        assert_eq!(cfg.topic_timeout(), Duration::from_millis(250));
        assert_eq!(cfg.part_timeout_ms, 10_000);
        assert_eq!(cfg.quit_message, "Leaving");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let mut cfg = SessionConfig::default();
        cfg.extra_raw_commands.push("KNOCK".into());
        cfg.networks.push(Network {
            name: "Libera".into(),
            servers: vec!["irc.libera.chat:6697".into()],
            nick: "tester".into(),
            use_tls: true,
            ..Network::default()
        });
        save_config(&path, &cfg).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded, cfg);
        assert!(loaded.network("libera").is_some());
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(load_config(&missing), Err(ConfigError::Io(_))));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(load_config(&broken), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_network_connect_params() {
        let network = Network {
            name: "Test".into(),
            servers: vec!["irc.example.org:6697".into()],
            nick: "tester".into(),
            auto_join: vec!["#a".into(), "#b".into()],
            password: Some("hunter2".into()),
            use_tls: true,
            auto_connect: false,
        };
        let params = network.connect_params().unwrap();
        assert_eq!(params.server.port, 6697);
        assert!(params.server.use_tls);
        assert_eq!(params.auto_join, vec!["#a", "#b"]);
        assert_eq!(params.password.as_deref(), Some("hunter2"));

        let empty = Network {
            servers: vec![],
            ..Network::default()
        };
        assert_eq!(empty.connect_params(), Err(ValidationError::EmptyServer));
    }
}
