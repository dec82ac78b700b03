//! Service configuration loading.
//!
//! Services read an optional YAML file `<config>/<serviceID>.yaml`. Before parsing,
//! `${VAR}`, `${VAR:-default}` and `$VAR` references are replaced with values from
//! the environment. A missing file yields the service defaults.

use std::path::Path;
use std::sync::LazyLock;

use config::{Config, File, FileFormat};
use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::error::HubError;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("config file '{0}' has no supported extension")]
    UnsupportedFormat(String),

    #[error("invalid config: {0}")]
    Parse(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

impl From<ConfigError> for HubError {
    fn from(err: ConfigError) -> Self {
        HubError::InvalidInput(err.to_string())
    }
}

static BRACED_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("braced variable pattern")
});
static BARE_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").expect("bare variable pattern"));

/// File format from the extension: `.yaml`/`.yml`, `.toml` or `.json`.
pub fn detect_format(path: &Path) -> ConfigResult<FileFormat> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    match ext.to_ascii_lowercase().as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
    }
}

/// Replace environment references. Unset variables without a default are
/// kept as written.
pub fn substitute_env_vars(content: &str) -> String {
    let braced = BRACED_VAR.replace_all(content, |caps: &regex::Captures| {
        match (std::env::var(&caps[1]), caps.get(2)) {
            (Ok(value), _) => value,
            (Err(_), Some(default)) => default.as_str().to_string(),
            (Err(_), None) => caps[0].to_string(),
        }
    });
    BARE_VAR
        .replace_all(&braced, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

pub fn load_config<T: DeserializeOwned>(path: &Path) -> ConfigResult<T> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    from_str(&content, format)
}

pub fn from_str<T: DeserializeOwned>(content: &str, format: FileFormat) -> ConfigResult<T> {
    Config::builder()
        .add_source(File::from_str(&substitute_env_vars(content), format))
        .build()
        .and_then(|config| config.try_deserialize())
        .map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Load a service configuration file if it exists.
///
/// A missing file returns `T::default()`; a file that does not parse is an
/// error.
pub fn load_optional_config<T>(path: &Path) -> ConfigResult<T>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        info!("no config at {}, using defaults", path.display());
        return Ok(T::default());
    }
    let config = load_config(path)?;
    info!("loaded config {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct SampleConfig {
        address: String,
        port: u16,
        no_tls: bool,
    }

    #[test]
    fn detect_format_by_extension() {
        assert_eq!(detect_format(Path::new("a.yaml")).unwrap(), FileFormat::Yaml);
        assert_eq!(detect_format(Path::new("a.yml")).unwrap(), FileFormat::Yaml);
        assert!(detect_format(Path::new("a.cfg")).is_err());
        assert!(detect_format(Path::new("noext")).is_err());
    }

    #[test]
    fn default_applies_to_unset_variable() {
        let out = substitute_env_vars("port: ${HIVEOT_TEST_SURELY_UNSET_VAR:-9883}");
        assert_eq!(out, "port: 9883");
        let out = substitute_env_vars("port: ${HIVEOT_TEST_SURELY_UNSET_VAR}");
        assert_eq!(out, "port: ${HIVEOT_TEST_SURELY_UNSET_VAR}");
    }

    #[test]
    fn path_variable_is_substituted() {
        let path = std::env::var("PATH").unwrap();
        assert_eq!(substitute_env_vars("p: $PATH"), format!("p: {path}"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg: SampleConfig = load_optional_config(&dir.path().join("gateway.yaml")).unwrap();
        assert_eq!(cfg, SampleConfig::default());
    }

    #[test]
    fn yaml_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "address: 127.0.0.1\nport: 9999\nno_tls: true").unwrap();
        let cfg: SampleConfig = load_optional_config(&path).unwrap();
        assert_eq!(cfg.address, "127.0.0.1");
        assert_eq!(cfg.port, 9999);
        assert!(cfg.no_tls);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.yaml");
        std::fs::write(&path, "port: [not a number").unwrap();
        assert!(load_optional_config::<SampleConfig>(&path).is_err());
    }
}
