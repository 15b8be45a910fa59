use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::columns::{file_columns, peer_columns, torrent_columns, NamedIcons};
use crate::projection::Column;

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if let Some(rest) = path_str.strip_prefix("~/") {
            if let Some(home) = std::env::var_os("HOME") {
                return PathBuf::from(home).join(rest);
            }
        } else if path_str == "~" {
            if let Some(home) = std::env::var_os("HOME") {
                return PathBuf::from(home);
            }
        }
    }
    path.to_path_buf()
}

/// Initial sort of one view, by column header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Directory the daemon dumps torrent status and events into
    pub state_dir: PathBuf,
    /// Directory for command files (default: {state_dir}/../commands)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_dir: Option<PathBuf>,
    pub poll_interval_ms: u64,
    /// Torrent list columns to hide, by header
    pub hidden_torrent_columns: Vec<String>,
    pub sidebar_show_zero: bool,
    pub sidebar_show_trackers: bool,
    pub torrent_sort: SortConfig,
    pub peer_sort: SortConfig,
    pub file_sort: SortConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("/var/lib/swarmd/state"),
            command_dir: None,
            poll_interval_ms: 2000,
            hidden_torrent_columns: vec!["Avail".to_string(), "Save Path".to_string()],
            torrent_sort: SortConfig {
                column: Some("#".to_string()),
                descending: false,
            },
            peer_sort: SortConfig {
                column: Some("Address".to_string()),
                descending: false,
            },
            file_sort: SortConfig::default(),
            sidebar_show_zero: false,
            sidebar_show_trackers: true,
        }
    }
}

impl ClientConfig {
    /// Command directory, derived from `state_dir` unless set explicitly.
    pub fn command_dir(&self) -> PathBuf {
        self.command_dir.clone().unwrap_or_else(|| {
            self.state_dir
                .parent()
                .map(|p| p.join("commands"))
                .unwrap_or_else(|| PathBuf::from("/var/lib/swarmd/commands"))
        })
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }

    fn expand_tilde_in_paths(&mut self) {
        self.state_dir = expand_tilde(&self.state_dir);
        if let Some(ref cmd_dir) = self.command_dir {
            self.command_dir = Some(expand_tilde(cmd_dir));
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    let mut config = if let Some(config_path) = path {
        if config_path.exists() {
            let contents = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

            toml::from_str::<ClientConfig>(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?
        } else {
            #[cfg(not(test))]
            tracing::warn!("Config file not found at {:?}, using defaults", config_path);
            ClientConfig::default()
        }
    } else {
        #[cfg(not(test))]
        tracing::info!("No config path provided, using defaults");
        ClientConfig::default()
    };

    config.expand_tilde_in_paths();
    validate_config(&config)?;
    Ok(config)
}

fn check_sort_column(view: &str, sort: &SortConfig, columns: &[Column]) -> Result<()> {
    if let Some(name) = &sort.column {
        if !columns.iter().any(|c| c.name() == name) {
            anyhow::bail!("{} sort column {:?} does not exist", view, name);
        }
    }
    Ok(())
}

pub fn validate_config(config: &ClientConfig) -> Result<()> {
    if config.state_dir.as_os_str().is_empty() {
        anyhow::bail!("state_dir cannot be empty");
    }

    if config.poll_interval_ms == 0 {
        anyhow::bail!("poll_interval_ms must be at least 1");
    }

    let torrents = torrent_columns(Arc::new(NamedIcons));
    check_sort_column("torrent", &config.torrent_sort, &torrents)?;
    check_sort_column("peer", &config.peer_sort, &peer_columns(Arc::new(NamedIcons)))?;
    check_sort_column("file", &config.file_sort, &file_columns())?;

    for hidden in &config.hidden_torrent_columns {
        if !torrents.iter().any(|c| c.name() == hidden) {
            tracing::warn!("Ignoring unknown hidden column {:?}", hidden);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn arb_sort_config(names: Vec<&'static str>) -> impl Strategy<Value = SortConfig> {
        (proptest::option::of(proptest::sample::select(names)), any::<bool>()).prop_map(
            |(column, descending)| SortConfig {
                column: column.map(str::to_string),
                descending,
            },
        )
    }

    fn arb_client_config() -> impl Strategy<Value = ClientConfig> {
        (
            "/[a-z]{1,8}/[a-z]{1,8}",
            proptest::option::of("/[a-z]{1,8}"),
            1u64..60_000,
            proptest::collection::vec(proptest::sample::select(vec!["Ratio", "Avail", "Tracker"]), 0..3),
            arb_sort_config(vec!["#", "Name", "Size", "Progress", "ETA"]),
            arb_sort_config(vec!["Address", "Client", "Progress"]),
            arb_sort_config(vec!["Filename", "Size", "Priority"]),
            any::<bool>(),
            any::<bool>(),
        )
            .prop_map(
                |(state, command, poll, hidden, torrent_sort, peer_sort, file_sort, zero, trackers)| {
                    ClientConfig {
                        state_dir: PathBuf::from(state),
                        command_dir: command.map(PathBuf::from),
                        poll_interval_ms: poll,
                        hidden_torrent_columns: hidden.into_iter().map(str::to_string).collect(),
                        torrent_sort,
                        peer_sort,
                        file_sort,
                        sidebar_show_zero: zero,
                        sidebar_show_trackers: trackers,
                    }
                },
            )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// **Feature: swarmview, Property: Configuration loading**
        ///
        /// Any valid ClientConfig written as TOML loads back unchanged.
        #[test]
        fn prop_config_round_trip(config in arb_client_config()) {
            let toml_string = toml::to_string(&config)
                .expect("Failed to serialize config to TOML");

            let mut temp_file = NamedTempFile::new()
                .expect("Failed to create temp file");
            temp_file.write_all(toml_string.as_bytes())
                .expect("Failed to write to temp file");
            temp_file.flush()
                .expect("Failed to flush temp file");

            let loaded_config = load_config(Some(temp_file.path()))
                .expect("Failed to load config from file");

            prop_assert_eq!(config, loaded_config);
        }
    }

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let non_existent_path = PathBuf::from("/tmp/non_existent_swarmview_12345.toml");
        let config = load_config(Some(&non_existent_path)).expect("Should load defaults");
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_invalid_toml_syntax() {
        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        temp_file
            .write_all(b"poll_interval_ms = [[[")
            .expect("Failed to write");
        temp_file.flush().expect("Failed to flush");

        let result = load_config(Some(temp_file.path()));
        assert!(result.is_err());
        assert!(format!("{:#}", result.unwrap_err()).contains("parse TOML"));
    }

    #[test]
    fn test_partial_config_with_defaults() {
        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let partial_toml = r#"
state_dir = "/srv/swarm/state"

[torrent_sort]
column = "Name"
descending = true
"#;
        temp_file
            .write_all(partial_toml.as_bytes())
            .expect("Failed to write");
        temp_file.flush().expect("Failed to flush");

        let config = load_config(Some(temp_file.path())).expect("Should load partial config");

        assert_eq!(config.state_dir, PathBuf::from("/srv/swarm/state"));
        assert_eq!(config.torrent_sort.column.as_deref(), Some("Name"));
        assert!(config.torrent_sort.descending);
        assert_eq!(config.poll_interval_ms, 2000);
        assert_eq!(config.command_dir(), PathBuf::from("/srv/swarm/commands"));
    }

    #[test]
    fn test_validation_zero_poll_interval() {
        let config = ClientConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("poll_interval_ms"));
    }

    #[test]
    fn test_validation_unknown_sort_column() {
        let config = ClientConfig {
            peer_sort: SortConfig {
                column: Some("Latency".to_string()),
                descending: false,
            },
            ..Default::default()
        };
        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Latency"));
    }

    #[test]
    fn test_tilde_expansion() {
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(expand_tilde(Path::new("~/state")), PathBuf::from(home).join("state"));
        }
        assert_eq!(expand_tilde(Path::new("/abs")), PathBuf::from("/abs"));
    }
}
