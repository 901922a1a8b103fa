//! Application configuration loading.
//!
//! `config.toml` uses a flat `key = value` subset of TOML: double-quoted
//! strings, non-negative integers and `#` comments.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use timeshift_core::{Credentials, HttpTimeouts, ProviderType};

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_RECORDER: &str = "livedl";
const SEARCH_WORDS_FILE: &str = "searchWords.json";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SEARCH_PAGES: u32 = 1;

/// Values read from the config file; everything is optional at this stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Account e-mail or username.
    pub username: Option<String>,
    /// Account password.
    pub password: Option<String>,
    /// Directory holding the session cache, ledger and program directories.
    pub data_dir: Option<PathBuf>,
    /// Recorder binary.
    pub recorder_path: Option<PathBuf>,
    /// Notification webhook; unset disables notifications.
    pub webhook_url: Option<String>,
    /// Search words JSON; defaults to `<data_dir>/searchWords.json`.
    pub search_words_file: Option<PathBuf>,
    /// Search result pages fetched per word.
    pub search_pages: Option<u32>,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// HTTP request timeout in seconds.
    pub read_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Validates config values against runtime constraints.
    pub fn validate(&self) -> Result<()> {
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        if let Some(pages) = self.search_pages
            && !(1..=10).contains(&pages)
        {
            bail!("Invalid config value for `search_pages`: {pages}. Expected range: 1..=10");
        }
        if let Some(url) = &self.webhook_url {
            url::Url::parse(url)
                .with_context(|| format!("Invalid config value for `webhook_url`: '{url}'"))?;
        }
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub credentials: Credentials,
    pub data_dir: PathBuf,
    pub recorder_path: PathBuf,
    pub webhook_url: Option<String>,
    pub search_words_file: PathBuf,
    pub search_pages: u32,
    pub timeouts: HttpTimeouts,
}

impl AppConfig {
    /// Applies defaults and CLI overrides to file values.
    pub fn resolve(file: FileConfig, data_dir_override: Option<PathBuf>) -> Result<Self> {
        let username = file
            .username
            .filter(|value| !value.is_empty())
            .context("Missing required config key `username`")?;
        let password = file
            .password
            .filter(|value| !value.is_empty())
            .context("Missing required config key `password`")?;
        let data_dir = data_dir_override
            .or(file.data_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let search_words_file = file
            .search_words_file
            .unwrap_or_else(|| data_dir.join(SEARCH_WORDS_FILE));

        Ok(Self {
            credentials: Credentials { username, password },
            recorder_path: file
                .recorder_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_RECORDER)),
            webhook_url: file.webhook_url.filter(|url| !url.is_empty()),
            search_words_file,
            search_pages: file.search_pages.unwrap_or(DEFAULT_SEARCH_PAGES),
            timeouts: HttpTimeouts::from_secs(
                file.connect_timeout_secs
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
                file.read_timeout_secs.unwrap_or(DEFAULT_READ_TIMEOUT_SECS),
            ),
            data_dir,
        })
    }

    pub fn session_file(&self) -> PathBuf {
        self.data_dir.join("session.txt")
    }

    pub fn ledger_file(&self) -> PathBuf {
        self.data_dir.join("downloaded.json")
    }
}

/// Search keywords per provider type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SearchWords {
    pub official: Vec<String>,
    pub channel: Vec<String>,
    pub community: Vec<String>,
}

impl SearchWords {
    /// Reads the search words JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read search words file '{}'", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse search words file '{}'", path.display()))
    }

    /// Every (provider, word) pair in official, channel, community order.
    pub fn queries(&self) -> Vec<(ProviderType, &str)> {
        [
            (ProviderType::Official, &self.official),
            (ProviderType::Channel, &self.channel),
            (ProviderType::Community, &self.community),
        ]
        .into_iter()
        .flat_map(|(provider, words)| words.iter().map(move |word| (provider, word.as_str())))
        .collect()
    }
}

/// Resolves the config path.
///
/// Priority:
/// 1. `--config`
/// 2. `$XDG_CONFIG_HOME/timeshift/config.toml`
/// 3. `$HOME/.config/timeshift/config.toml`
#[must_use]
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("timeshift")
                .join("config.toml"),
        );
    }
    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("timeshift")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file; a missing default file yields empty values, a
/// missing explicit file is an error.
pub fn load_file_config(explicit: Option<&Path>) -> Result<FileConfig> {
    let Some(path) = resolve_config_path(explicit) else {
        return Ok(FileConfig::default());
    };
    if explicit.is_none() && !path.exists() {
        return Ok(FileConfig::default());
    }
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };
        let key = raw_key.trim();
        let value = raw_value.trim();
        let string_value = || {
            parse_string_literal(value)
                .with_context(|| format!("Invalid `{key}` value on line {line_no}"))
        };
        let integer_value = || {
            parse_integer_u64(value)
                .with_context(|| format!("Invalid `{key}` value on line {line_no}"))
        };

        match key {
            "username" => cfg.username = Some(string_value()?),
            "password" => cfg.password = Some(string_value()?),
            "data_dir" => cfg.data_dir = Some(PathBuf::from(string_value()?)),
            "recorder_path" => cfg.recorder_path = Some(PathBuf::from(string_value()?)),
            "webhook_url" => cfg.webhook_url = Some(string_value()?),
            "search_words_file" => cfg.search_words_file = Some(PathBuf::from(string_value()?)),
            "search_pages" => {
                let pages = u32::try_from(integer_value()?)
                    .map_err(|_| anyhow::anyhow!("search_pages out of range for u32"))?;
                cfg.search_pages = Some(pages);
            }
            "connect_timeout_secs" => cfg.connect_timeout_secs = Some(integer_value()?),
            "read_timeout_secs" => cfg.read_timeout_secs = Some(integer_value()?),
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    let Some(inner) = raw_value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        bail!("Expected double-quoted string");
    };
    Ok(inner.replace("\\\"", "\"").replace("\\\\", "\\"))
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_parse_config_full() {
        let cfg = parse_config_str(
            r#"
# account
username = "me@example.com"
password = "p#ss" # inline comment
data_dir = "/srv/timeshift"
recorder_path = "/usr/local/bin/livedl"
webhook_url = "http://discord-deliver/"
search_words_file = "/etc/timeshift/words.json"
search_pages = 3
connect_timeout_secs = 5
read_timeout_secs = 60
"#,
        )
        .expect("full config should parse");
        assert_eq!(cfg.username.as_deref(), Some("me@example.com"));
        assert_eq!(cfg.password.as_deref(), Some("p#ss"));
        assert_eq!(cfg.data_dir, Some(PathBuf::from("/srv/timeshift")));
        assert_eq!(cfg.webhook_url.as_deref(), Some("http://discord-deliver/"));
        assert_eq!(cfg.search_pages, Some(3));
        assert_eq!(cfg.connect_timeout_secs, Some(5));
        assert_eq!(cfg.read_timeout_secs, Some(60));
    }

    #[test]
    fn test_parse_config_rejects_unknown_keys() {
        let err = parse_config_str("concurrency = 4").expect_err("unknown key error expected");
        assert!(err.to_string().contains("Unknown configuration key"));
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn test_parse_config_rejects_unquoted_string() {
        let err = parse_config_str("username = me").expect_err("unquoted string");
        assert!(err.to_string().contains("username"));
    }

    #[test]
    fn test_parse_config_rejects_out_of_range_timeout() {
        let err = parse_config_str("read_timeout_secs = 0").expect_err("timeout below range");
        assert!(err.to_string().contains("read_timeout_secs"));
        let err = parse_config_str("connect_timeout_secs = 3601").expect_err("timeout above range");
        assert!(err.to_string().contains("connect_timeout_secs"));
    }

    #[test]
    fn test_parse_config_rejects_invalid_webhook_url() {
        let err = parse_config_str(r#"webhook_url = "not a url""#).expect_err("invalid url");
        assert!(err.to_string().contains("webhook_url"));
    }

    #[test]
    fn test_parse_config_rejects_missing_equals() {
        let err = parse_config_str("username").expect_err("syntax error");
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_resolve_applies_defaults_and_override() {
        let file = FileConfig {
            username: Some("u".to_string()),
            password: Some("p".to_string()),
            data_dir: Some(PathBuf::from("/from/file")),
            ..FileConfig::default()
        };
        let config = AppConfig::resolve(file.clone(), None).expect("resolves");
        assert_eq!(config.data_dir, PathBuf::from("/from/file"));
        assert_eq!(
            config.search_words_file,
            PathBuf::from("/from/file/searchWords.json")
        );
        assert_eq!(config.recorder_path, PathBuf::from("livedl"));
        assert_eq!(config.timeouts.connect, Duration::from_secs(10));
        assert_eq!(config.timeouts.request, Duration::from_secs(30));
        assert_eq!(config.search_pages, 1);
        assert!(config.webhook_url.is_none());

        let config =
            AppConfig::resolve(file, Some(PathBuf::from("/from/cli"))).expect("resolves");
        assert_eq!(config.data_dir, PathBuf::from("/from/cli"));
        assert_eq!(config.ledger_file(), PathBuf::from("/from/cli/downloaded.json"));
        assert_eq!(config.session_file(), PathBuf::from("/from/cli/session.txt"));
    }

    #[test]
    fn test_resolve_requires_credentials() {
        let err = AppConfig::resolve(FileConfig::default(), None).expect_err("missing username");
        assert!(err.to_string().contains("username"));

        let file = FileConfig {
            username: Some("u".to_string()),
            ..FileConfig::default()
        };
        let err = AppConfig::resolve(file, None).expect_err("missing password");
        assert!(err.to_string().contains("password"));
    }

    #[test]
    fn test_search_words_missing_lists_are_empty() {
        let words: SearchWords =
            serde_json::from_str(r#"{"official": ["news"]}"#).expect("parses");
        assert_eq!(words.official, ["news"]);
        assert!(words.channel.is_empty());
        assert!(words.community.is_empty());
    }

    #[test]
    fn test_search_words_queries_order() {
        let words = SearchWords {
            official: vec!["a".to_string()],
            channel: vec!["b".to_string(), "c".to_string()],
            community: vec!["d".to_string()],
        };
        assert_eq!(
            words.queries(),
            [
                (ProviderType::Official, "a"),
                (ProviderType::Channel, "b"),
                (ProviderType::Channel, "c"),
                (ProviderType::Community, "d"),
            ]
        );
    }

    #[test]
    fn test_load_explicit_missing_file_is_error() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let err = load_file_config(Some(&dir.path().join("absent.toml")))
            .expect_err("explicit path must exist");
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_resolve_config_path_prefers_explicit() {
        let explicit = Path::new("/tmp/custom.toml");
        assert_eq!(
            resolve_config_path(Some(explicit)),
            Some(PathBuf::from("/tmp/custom.toml"))
        );
    }
}
