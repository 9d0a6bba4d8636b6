//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, GatewayConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files, optionally with a CLI override path.
///
/// Returns paths in load order (system, user, local/cli). Only returns files
/// that exist. If `cli_path` is provided and exists, it replaces the local
/// override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/pigateway/config.toml");
    if system.exists() {
        files.push(system);
    }

    // User config (XDG_CONFIG_HOME or ~/.config)
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("pigateway/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("pigateway.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file into a raw table.
pub fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_table(&contents, path)
}

fn parse_table(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    contents
        .parse()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Load config from a single TOML file.
pub fn load_from_file(path: &Path) -> Result<GatewayConfig, ConfigError> {
    from_table(load_table(path)?, path)
}

/// Deserialize a (possibly merged) table, filling gaps with defaults.
pub fn from_table(table: toml::Table, path: &Path) -> Result<GatewayConfig, ConfigError> {
    let mut config: GatewayConfig =
        toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

    config.audio.dir = expand_path(&config.audio.dir.to_string_lossy());
    Ok(config)
}

/// Merge `overlay` into `base`. Nested tables merge key by key, everything
/// else (including arrays) is replaced.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Apply `PIGATEWAY_*` environment variable overrides to config.
pub fn apply_env_overrides(config: &mut GatewayConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, env::vars());
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Apply overrides from an explicit set of variables.
pub fn apply_overrides_from<I>(config: &mut GatewayConfig, sources: &mut ConfigSources, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        let applied = match key.as_str() {
            "PIGATEWAY_HOME" => {
                config.gateway.home = value;
                true
            }
            "PIGATEWAY_SOURCES" => {
                config.sources.urls = split_list(&value);
                true
            }
            "PIGATEWAY_DEVICES" => {
                config.devices.fixed = split_list(&value);
                true
            }
            "PIGATEWAY_LOG_LEVEL" => {
                config.telemetry.log_level = value;
                true
            }
            "PIGATEWAY_AUDIO_DIR" => {
                config.audio.dir = expand_path(&value);
                true
            }
            _ => false,
        };
        if applied {
            sources.env_overrides.push(key);
        }
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(stripped);
        }
        return PathBuf::from(path);
    }

    if let Some(stripped) = path.strip_prefix('$') {
        // Handle $VAR/rest/of/path
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            if let Ok(var_value) = env::var(var_name) {
                return PathBuf::from(var_value).join(&stripped[slash_pos + 1..]);
            }
            return PathBuf::from(path);
        }
        return env::var(stripped)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(path));
    }

    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/test/path");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("test/path"));
    }

    #[test]
    fn test_expand_path_absolute() {
        let expanded = expand_path("/absolute/path");
        assert_eq!(expanded, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_parse_minimal_toml() {
        let table = parse_table(
            r#"
[gateway]
home = "Alpha"
"#,
            Path::new("test.toml"),
        )
        .unwrap();
        let config = from_table(table, Path::new("test.toml")).unwrap();
        assert_eq!(config.gateway.home, "Alpha");
        // Other values should be defaults
        assert_eq!(config.gateway.refresh_ms, 2000);
        assert_eq!(config.devices.scan_ms, 10_000);
    }

    #[test]
    fn test_merge_keeps_untouched_keys() {
        let mut base = parse_table(
            r#"
[sources]
urls = ["http://a:1"]
poll_ms = 1000

[devices]
scan_ms = 5000
"#,
            Path::new("base.toml"),
        )
        .unwrap();
        let overlay = parse_table(
            r#"
[sources]
poll_ms = 3000
"#,
            Path::new("overlay.toml"),
        )
        .unwrap();

        merge_tables(&mut base, overlay);
        let config = from_table(base, Path::new("merged")).unwrap();

        assert_eq!(config.sources.urls, vec!["http://a:1"]);
        assert_eq!(config.sources.poll_ms, 3000);
        assert_eq!(config.devices.scan_ms, 5000);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[devices]
fixed = ["/dev/ttyUSB0", "/dev/ttyUSB1"]
baud_rate = 9600

[telemetry]
log_level = "debug"
"#
        )
        .unwrap();

        let config = load_from_file(file.path()).unwrap();
        assert_eq!(config.devices.fixed.len(), 2);
        assert_eq!(config.devices.baud_rate, 9600);
        assert_eq!(config.telemetry.log_level, "debug");
    }

    #[test]
    fn test_bad_toml_reports_path() {
        let err = parse_table("[gateway\nhome = 1", Path::new("broken.toml")).unwrap_err();
        match err {
            ConfigError::Parse { path, .. } => assert_eq!(path, PathBuf::from("broken.toml")),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_env_overrides() {
        let mut config = GatewayConfig::default();
        let mut sources = ConfigSources::default();
        apply_overrides_from(
            &mut config,
            &mut sources,
            vec![
                ("PIGATEWAY_HOME".to_string(), "Alpha".to_string()),
                (
                    "PIGATEWAY_SOURCES".to_string(),
                    "http://a:1, http://b:2,".to_string(),
                ),
                ("UNRELATED".to_string(), "x".to_string()),
            ],
        );

        assert_eq!(config.gateway.home, "Alpha");
        assert_eq!(config.sources.urls, vec!["http://a:1", "http://b:2"]);
        assert_eq!(sources.env_overrides, vec!["PIGATEWAY_HOME", "PIGATEWAY_SOURCES"]);
    }
}
