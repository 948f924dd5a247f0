//! Daemon configuration.
//!
//! Configuration is validated at load time, and the subset of it that
//! defines daemon identity is reduced to a [`Fingerprint`]. A running
//! instance whose persisted fingerprint no longer matches the current
//! configuration is stale and must be replaced before reuse.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use velador_meta::Fingerprint;

use crate::error::{Result, SupervisorError};

/// Daemon configuration.
///
/// Every launch decision flows from this struct: where the daemon keeps its
/// metadata and logs, which host/port its command endpoint binds, and which
/// options participate in the identity fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Daemon name (must be a valid identifier). Used for the metadata
    /// namespace, the log directory, and the process title.
    pub name: String,

    /// Root of the workspace this daemon serves. Two daemons serving
    /// different roots are distinct identities.
    pub build_root: PathBuf,

    /// Scratch directory for daemon-owned state (logs, metadata).
    pub work_dir: PathBuf,

    /// Override for the metadata directory. Defaults to
    /// `<work_dir>/metadata`.
    #[serde(default)]
    pub metadata_dir: Option<PathBuf>,

    /// Log filter directive for the daemon process (e.g. `info`,
    /// `velador=debug`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Host the command endpoint binds.
    #[serde(default = "default_command_host")]
    pub command_host: String,

    /// Port the command endpoint binds. Zero asks the service for an
    /// ephemeral port; the bound port is published through the metadata
    /// store either way.
    #[serde(default)]
    pub command_port: u16,

    /// External file-watching helper to keep alive alongside the daemon,
    /// if any.
    #[serde(default)]
    pub watcher_command: Option<PathBuf>,

    /// Extra identity-defining options supplied by the embedding
    /// application. Any change to a value here forces a daemon restart.
    #[serde(default)]
    pub identity_options: BTreeMap<String, String>,

    /// Grace period between SIGTERM and SIGKILL when replacing a running
    /// instance.
    #[serde(default = "default_terminate_grace")]
    #[serde(with = "humantime_serde")]
    pub terminate_grace: Duration,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_command_host() -> String {
    "127.0.0.1".to_string()
}

fn default_terminate_grace() -> Duration {
    Duration::from_secs(5)
}

impl DaemonConfig {
    /// Creates a configuration with required fields and default options.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        build_root: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            build_root: build_root.into(),
            work_dir: work_dir.into(),
            metadata_dir: None,
            log_level: default_log_level(),
            command_host: default_command_host(),
            command_port: 0,
            watcher_command: None,
            identity_options: BTreeMap::new(),
            terminate_grace: default_terminate_grace(),
        }
    }

    /// Loads configuration from a TOML file and validates it.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| SupervisorError::config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(SupervisorError::config("name cannot be empty"));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
        {
            return Err(SupervisorError::config(
                "name must contain only alphanumeric characters, hyphens, and underscores",
            ));
        }
        if self.build_root.as_os_str().is_empty() {
            return Err(SupervisorError::config("build_root cannot be empty"));
        }
        if self.work_dir.as_os_str().is_empty() {
            return Err(SupervisorError::config("work_dir cannot be empty"));
        }
        if self.log_level.is_empty() {
            return Err(SupervisorError::config("log_level cannot be empty"));
        }
        Ok(())
    }

    /// Directory holding this identity's metadata records.
    #[must_use]
    pub fn metadata_dir(&self) -> PathBuf {
        self.metadata_dir
            .clone()
            .unwrap_or_else(|| self.work_dir.join("metadata"))
    }

    /// Directory holding the daemon's log file.
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.work_dir.join(&self.name)
    }

    /// Path of the daemon's log file.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.log_dir().join(format!("{}.log", self.name))
    }

    /// Computes the identity fingerprint for this configuration.
    ///
    /// The digest covers every identity-defining field in a stable key
    /// order, so equal configurations always produce equal fingerprints
    /// across processes and runs.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        let mut identity: BTreeMap<String, String> = BTreeMap::new();
        identity.insert("name".into(), self.name.clone());
        identity.insert("build_root".into(), self.build_root.display().to_string());
        identity.insert("work_dir".into(), self.work_dir.display().to_string());
        identity.insert("log_level".into(), self.log_level.clone());
        identity.insert("command_host".into(), self.command_host.clone());
        identity.insert("command_port".into(), self.command_port.to_string());
        identity.insert(
            "watcher_command".into(),
            self.watcher_command
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        );
        for (key, value) in &self.identity_options {
            identity.insert(format!("option.{key}"), value.clone());
        }

        let mut buf = String::new();
        for (key, value) in &identity {
            buf.push_str(key);
            buf.push('=');
            buf.push_str(value);
            buf.push('\n');
        }
        Fingerprint::digest(buf)
    }
}

/// Serde helper for humantime durations.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serializes a duration as a human-readable string.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    /// Deserializes a duration from a human-readable string.
    ///
    /// # Errors
    /// Returns an error if the string cannot be parsed.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DaemonConfig {
        DaemonConfig::new("velador", "/repo", "/repo/.velador.d")
    }

    #[test]
    fn test_config_new_defaults() {
        let config = sample();
        assert_eq!(config.name, "velador");
        assert_eq!(config.command_host, "127.0.0.1");
        assert_eq!(config.command_port, 0);
        assert_eq!(config.terminate_grace, Duration::from_secs(5));
        assert_eq!(config.metadata_dir(), PathBuf::from("/repo/.velador.d/metadata"));
        assert_eq!(
            config.log_path(),
            PathBuf::from("/repo/.velador.d/velador/velador.log")
        );
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_name() {
        let mut config = sample();
        config.name = "bad name!".to_string();
        assert!(config.validate().is_err());

        config.name = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_paths() {
        let mut config = sample();
        config.build_root = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(sample().fingerprint(), sample().fingerprint());
    }

    #[test]
    fn test_fingerprint_tracks_identity_fields() {
        let base = sample();
        let mut other = sample();
        other.log_level = "debug".to_string();
        assert_ne!(base.fingerprint(), other.fingerprint());

        let mut rerooted = sample();
        rerooted.build_root = PathBuf::from("/elsewhere");
        assert_ne!(base.fingerprint(), rerooted.fingerprint());
    }

    #[test]
    fn test_fingerprint_tracks_identity_options() {
        let base = sample();
        let mut tuned = sample();
        tuned
            .identity_options
            .insert("concurrency".to_string(), "8".to_string());
        assert_ne!(base.fingerprint(), tuned.fingerprint());
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("velador.toml");
        std::fs::write(
            &path,
            r#"
name = "velador"
build_root = "/repo"
work_dir = "/repo/.velador.d"
command_port = 9090
terminate_grace = "10s"
"#,
        )
        .unwrap();

        let config = DaemonConfig::load(&path).unwrap();
        assert_eq!(config.command_port, 9090);
        assert_eq!(config.terminate_grace, Duration::from_secs(10));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_load_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("velador.toml");
        std::fs::write(
            &path,
            r#"
name = "bad name!"
build_root = "/repo"
work_dir = "/repo/.velador.d"
"#,
        )
        .unwrap();

        assert!(DaemonConfig::load(&path).is_err());
    }
}
