//! Engine configuration loader for Steward.
//!
//! Reads `steward.toml` from the data directory (`~/.steward/` by default)
//! and deserializes it into [`EngineConfig`].

use std::path::{Path, PathBuf};

use steward_types::config::EngineConfig;

pub const CONFIG_FILE_NAME: &str = "steward.toml";
pub const DATA_DIR_ENV: &str = "STEWARD_DATA_DIR";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("cannot determine a data directory: set STEWARD_DATA_DIR or HOME")]
    NoDataDir,
}

/// Read and parse a config file, failing on any problem.
///
/// Used when the operator names a file explicitly.
pub async fn read_engine_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load `{data_dir}/steward.toml`.
///
/// - Missing file: [`EngineConfig::default()`].
/// - Unreadable or unparseable file: a warning, then the default.
pub async fn load_engine_config(data_dir: &Path) -> EngineConfig {
    let config_path = data_dir.join(CONFIG_FILE_NAME);

    match read_engine_config(&config_path).await {
        Ok(config) => {
            tracing::debug!(
                path = %config_path.display(),
                templates = config.templates.len(),
                "loaded engine config"
            );
            config
        }
        Err(ConfigError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No {CONFIG_FILE_NAME} found at {}, using defaults", config_path.display());
            EngineConfig::default()
        }
        Err(err) => {
            tracing::warn!("{err}, using defaults");
            EngineConfig::default()
        }
    }
}

/// Resolve the data directory: explicit override, then `STEWARD_DATA_DIR`,
/// then `~/.steward`.
pub fn resolve_data_dir(explicit: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    data_dir_from(
        explicit,
        std::env::var_os(DATA_DIR_ENV).map(PathBuf::from),
        dirs::home_dir(),
    )
}

fn data_dir_from(
    explicit: Option<PathBuf>,
    env: Option<PathBuf>,
    home: Option<PathBuf>,
) -> Result<PathBuf, ConfigError> {
    explicit
        .or(env.filter(|p| !p.as_os_str().is_empty()))
        .or_else(|| home.map(|h| h.join(".steward")))
        .ok_or(ConfigError::NoDataDir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use steward_types::config::InactiveResumePolicy;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_engine_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config.delay_poll_interval_ms, 1_000);
        assert_eq!(config.inactive_resume, InactiveResumePolicy::Deliver);
        assert!(config.templates.is_empty());
    }

    #[tokio::test]
    async fn load_engine_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join(CONFIG_FILE_NAME),
            r#"
delay_batch_size = 8
webhook_timeout_secs = 3
inactive_resume = "skip"

[templates.welcome]
subject = "Welcome, {{ member.display_name }}"
body = "We are glad you are here."
"#,
        )
        .await
        .unwrap();

        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config.delay_batch_size, 8);
        assert_eq!(config.webhook_timeout_secs, 3);
        assert_eq!(config.inactive_resume, InactiveResumePolicy::Skip);
        assert_eq!(config.templates["welcome"].body, "We are glad you are here.");
    }

    #[tokio::test]
    async fn load_engine_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join(CONFIG_FILE_NAME), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config.delay_batch_size, 64);
    }

    #[tokio::test]
    async fn read_engine_config_reports_errors() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.toml");
        assert!(matches!(
            read_engine_config(&missing).await,
            Err(ConfigError::Io { .. })
        ));

        let bad = tmp.path().join("bad.toml");
        tokio::fs::write(&bad, "inactive_resume = \"sometimes\"").await.unwrap();
        assert!(matches!(
            read_engine_config(&bad).await,
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn data_dir_precedence() {
        let explicit = Some(PathBuf::from("/srv/steward"));
        let env = Some(PathBuf::from("/env/steward"));
        let home = Some(PathBuf::from("/home/ruth"));

        assert_eq!(
            data_dir_from(explicit, env.clone(), home.clone()).unwrap(),
            PathBuf::from("/srv/steward")
        );
        assert_eq!(
            data_dir_from(None, env, home.clone()).unwrap(),
            PathBuf::from("/env/steward")
        );
        assert_eq!(
            data_dir_from(None, Some(PathBuf::new()), home).unwrap(),
            PathBuf::from("/home/ruth/.steward")
        );
        assert!(matches!(
            data_dir_from(None, None, None),
            Err(ConfigError::NoDataDir)
        ));
    }
}
