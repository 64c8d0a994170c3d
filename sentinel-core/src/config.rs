use crate::feed::schema::ColumnLayout;
use crate::filter::RelevancePolicy;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Config {
  pub output: OutputConfig,
  pub logging: LoggingConfig,
  pub http: HttpConfig,
  pub pipeline: PipelineConfig,
  /// Feeds in priority order: earlier entries win hash collisions.
  pub sources: Vec<SourceConfig>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      output: OutputConfig::default(),
      logging: LoggingConfig::default(),
      http: HttpConfig::default(),
      pipeline: PipelineConfig::default(),
      sources: default_sources(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
  Single,
  Sharded,
  Both,
}

impl OutputMode {
  pub fn writes_single(self) -> bool {
    matches!(self, Self::Single | Self::Both)
  }

  pub fn writes_shards(self) -> bool {
    matches!(self, Self::Sharded | Self::Both)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
  #[serde(default = "default_output_path")]
  pub path: PathBuf,

  #[serde(default = "default_shard_dir")]
  pub shard_dir: PathBuf,

  #[serde(default = "default_output_mode")]
  pub mode: OutputMode,
}

impl Default for OutputConfig {
  fn default() -> Self {
    Self {
      path: default_output_path(),
      shard_dir: default_shard_dir(),
      mode: default_output_mode(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
  #[serde(default = "default_log_level")]
  pub level: String,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub dir: Option<PathBuf>,

  #[serde(default = "default_retention_days")]
  pub retention_days: u64,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      dir: None,
      retention_days: default_retention_days(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
  #[serde(default = "default_user_agent")]
  pub user_agent: String,

  /// Upper bound for bodies that must be buffered whole (JSON payloads).
  #[serde(default = "default_max_body_bytes")]
  pub max_body_bytes: u64,
}

impl Default for HttpConfig {
  fn default() -> Self {
    Self {
      user_agent: default_user_agent(),
      max_body_bytes: default_max_body_bytes(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
  #[serde(default = "default_min_expected_indicators")]
  pub min_expected_indicators: usize,

  #[serde(default = "default_query_delay_ms")]
  pub query_delay_ms: u64,

  #[serde(default = "default_retry_backoff_ms")]
  pub retry_backoff_ms: u64,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      min_expected_indicators: default_min_expected_indicators(),
      query_delay_ms: default_query_delay_ms(),
      retry_backoff_ms: default_retry_backoff_ms(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
  Delimited,
  Structured,
  TagQuery,
  HashList,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
  pub name: String,
  pub kind: SourceKind,
  pub url: String,

  #[serde(default = "default_true")]
  pub enabled: bool,

  #[serde(default = "default_source_timeout_seconds")]
  pub timeout_seconds: u64,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub relevance: Option<RelevancePolicy>,

  /// Environment variable holding the API key sent with every request.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub api_key_env: Option<String>,

  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub tags: Vec<String>,

  #[serde(default = "default_query_limit")]
  pub query_limit: u32,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default_name: Option<String>,

  /// Appended to names the feed supplies, e.g. `(ThreatFox)`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name_suffix: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub columns: Option<ColumnLayout>,
}

impl SourceConfig {
  pub fn new(name: &str, kind: SourceKind, url: &str) -> Self {
    Self {
      name: name.to_string(),
      kind,
      url: url.to_string(),
      enabled: true,
      timeout_seconds: default_source_timeout_seconds(),
      relevance: None,
      api_key_env: None,
      tags: Vec::new(),
      query_limit: default_query_limit(),
      default_name: None,
      name_suffix: None,
      columns: None,
    }
  }

  pub fn relevance(&self) -> RelevancePolicy {
    self.relevance.unwrap_or(match self.kind {
      SourceKind::Delimited | SourceKind::TagQuery => RelevancePolicy::Heuristic,
      SourceKind::Structured => RelevancePolicy::TypeOnly,
      SourceKind::HashList => RelevancePolicy::Unfiltered,
    })
  }
}

fn default_true() -> bool {
  true
}

fn default_output_path() -> PathBuf {
  PathBuf::from("sentinel.json")
}

fn default_shard_dir() -> PathBuf {
  PathBuf::from("sentinel")
}

fn default_output_mode() -> OutputMode {
  OutputMode::Single
}

fn default_log_level() -> String {
  "info".to_string()
}

fn default_retention_days() -> u64 {
  14
}

fn default_user_agent() -> String {
  format!("sentinel-compiler/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_body_bytes() -> u64 {
  64 * 1024 * 1024
}

fn default_min_expected_indicators() -> usize {
  5
}

fn default_query_delay_ms() -> u64 {
  1_000
}

fn default_retry_backoff_ms() -> u64 {
  2_000
}

fn default_source_timeout_seconds() -> u64 {
  30
}

fn default_query_limit() -> u32 {
  100
}

fn default_sources() -> Vec<SourceConfig> {
  let mut threatfox = SourceConfig::new(
    "ThreatFox",
    SourceKind::Delimited,
    "https://threatfox.abuse.ch/export/csv/recent/",
  );
  threatfox.name_suffix = Some("(ThreatFox)".to_string());

  let mut bazaar = SourceConfig::new(
    "MalwareBazaar",
    SourceKind::TagQuery,
    "https://mb-api.abuse.ch/api/v1/",
  );
  bazaar.api_key_env = Some("ABUSECH_AUTH_KEY".to_string());
  bazaar.tags = ["android", "apk", "spyware", "stalkerware"]
    .iter()
    .map(|t| t.to_string())
    .collect();

  let mut echap = SourceConfig::new(
    "Echap",
    SourceKind::Structured,
    "https://raw.githubusercontent.com/AssoEchap/stalkerware-indicators/master/generated/indicators-for-tinycheck.json",
  );
  echap.default_name = Some("Stalkerware".to_string());

  let mut bulk = SourceConfig::new(
    "MalwareBazaar-Recent",
    SourceKind::HashList,
    "https://bazaar.abuse.ch/export/txt/sha256/recent/",
  );
  bulk.timeout_seconds = 120;

  vec![threatfox, bazaar, echap, bulk]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
  #[serde(default)]
  pub output: Option<OutputConfig>,

  #[serde(default)]
  pub logging: Option<LoggingConfig>,

  #[serde(default)]
  pub http: Option<HttpConfig>,

  #[serde(default)]
  pub pipeline: Option<PipelineConfig>,

  #[serde(default)]
  pub sources: Option<Vec<SourceConfig>>,
}

impl ConfigFile {
  fn normalize(self) -> Config {
    let mut cfg = Config::default();
    if let Some(o) = self.output {
      cfg.output = o;
    }
    if let Some(l) = self.logging {
      cfg.logging = l;
    }
    if let Some(h) = self.http {
      cfg.http = h;
    }
    if let Some(p) = self.pipeline {
      cfg.pipeline = p;
    }
    if let Some(s) = self.sources {
      cfg.sources = s;
    }
    cfg
  }
}

/// Reads the config at `path`. Missing or invalid files fall back to defaults; the run
/// must still produce an artifact.
pub fn load_or_default(path: &Path) -> Config {
  if !path.exists() {
    eprintln!(
      "Sentinel: config missing at {}; using built-in defaults.",
      path.display()
    );
    return Config::default();
  }

  let raw = match fs::read_to_string(path) {
    Ok(r) => r,
    Err(e) => {
      eprintln!(
        "Sentinel: cannot read config at {}; using built-in defaults: {e}",
        path.display()
      );
      return Config::default();
    }
  };

  parse_or_default(&raw, path)
}

fn parse_or_default(raw: &str, path: &Path) -> Config {
  match toml::from_str::<ConfigFile>(raw) {
    Ok(file) => file.normalize(),
    Err(e) => {
      eprintln!(
        "Sentinel: invalid config at {}; using built-in defaults: {e}",
        path.display()
      );
      Config::default()
    }
  }
}

pub fn write_default(path: &Path) -> anyhow::Result<()> {
  let cfg = Config::default();
  let text = toml::to_string_pretty(&to_config_file(&cfg)).context("serialize default config")?;
  crate::serialize::atomic_write_file(path, text.as_bytes())
}

fn to_config_file(cfg: &Config) -> ConfigFile {
  ConfigFile {
    output: Some(cfg.output.clone()),
    logging: Some(cfg.logging.clone()),
    http: Some(cfg.http.clone()),
    pipeline: Some(cfg.pipeline.clone()),
    sources: Some(cfg.sources.clone()),
  }
}

/// Disables sources that cannot be fetched safely and logs why. Returns how many were
/// disabled.
pub fn disable_invalid_sources(cfg: &mut Config) -> usize {
  let mut disabled = 0;
  for source in cfg.sources.iter_mut().filter(|s| s.enabled) {
    if let Some(reason) = validate_source(source) {
      tracing::warn!(source = %source.name, reason = %reason, "source config invalid; source disabled");
      source.enabled = false;
      disabled += 1;
    }
  }
  disabled
}

fn validate_source(source: &SourceConfig) -> Option<String> {
  if source.name.trim().is_empty() {
    return Some("name must not be empty".to_string());
  }
  if source.name.trim().eq_ignore_ascii_case(crate::aggregate::MANUAL_SOURCE) {
    return Some(format!("name {} is reserved", crate::aggregate::MANUAL_SOURCE));
  }
  if source.timeout_seconds == 0 {
    return Some("timeout_seconds must be > 0".to_string());
  }

  let Ok(url) = reqwest::Url::parse(&source.url) else {
    return Some(format!("invalid URL: {}", source.url));
  };
  if url.scheme() != "https" {
    return Some(format!("URL must use HTTPS: {}", source.url));
  }
  if url.host_str().is_none() {
    return Some(format!("URL has no host: {}", source.url));
  }

  if source.kind == SourceKind::TagQuery && source.tags.is_empty() {
    return Some("tag_query source needs at least one tag".to_string());
  }

  None
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_list_sources_in_priority_order() {
    let cfg = Config::default();
    let names: Vec<&str> = cfg.sources.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
      names,
      vec!["ThreatFox", "MalwareBazaar", "Echap", "MalwareBazaar-Recent"]
    );
    assert_eq!(
      cfg.sources[3].relevance(),
      RelevancePolicy::Unfiltered
    );
    assert_eq!(cfg.sources[2].relevance(), RelevancePolicy::TypeOnly);
    assert_eq!(cfg.sources[0].name_suffix.as_deref(), Some("(ThreatFox)"));
  }

  #[test]
  fn partial_file_keeps_defaults_for_missing_sections() {
    let raw = r#"
[output]
path = "out/db.json"
mode = "both"

[pipeline]
min_expected_indicators = 10
"#;
    let cfg = parse_or_default(raw, Path::new("sentinel.toml"));
    assert_eq!(cfg.output.path, PathBuf::from("out/db.json"));
    assert_eq!(cfg.output.mode, OutputMode::Both);
    assert_eq!(cfg.output.shard_dir, PathBuf::from("sentinel"));
    assert_eq!(cfg.pipeline.min_expected_indicators, 10);
    assert_eq!(cfg.pipeline.query_delay_ms, 1_000);
    assert_eq!(cfg.sources.len(), 4);
  }

  #[test]
  fn source_list_replaces_defaults() {
    let raw = r#"
[[sources]]
name = "Local"
kind = "hash_list"
url = "https://feeds.example.org/hashes.txt"
relevance = "heuristic"
"#;
    let cfg = parse_or_default(raw, Path::new("sentinel.toml"));
    assert_eq!(cfg.sources.len(), 1);
    assert_eq!(cfg.sources[0].kind, SourceKind::HashList);
    assert_eq!(cfg.sources[0].relevance(), RelevancePolicy::Heuristic);
    assert!(cfg.sources[0].enabled);
    assert_eq!(cfg.sources[0].timeout_seconds, 30);
  }

  #[test]
  fn invalid_toml_falls_back_to_defaults() {
    let cfg = parse_or_default("[output\npath = ", Path::new("sentinel.toml"));
    assert_eq!(cfg.output.path, PathBuf::from("sentinel.json"));
    assert_eq!(cfg.sources.len(), 4);
  }

  #[test]
  fn insecure_or_incomplete_sources_are_disabled() {
    let mut cfg = Config::default();
    cfg.sources[0].url = "http://threatfox.abuse.ch/export/csv/recent/".to_string();
    cfg.sources[1].tags.clear();
    cfg.sources[2].timeout_seconds = 0;

    assert_eq!(disable_invalid_sources(&mut cfg), 3);
    assert!(!cfg.sources[0].enabled);
    assert!(!cfg.sources[1].enabled);
    assert!(!cfg.sources[2].enabled);
    assert!(cfg.sources[3].enabled);
  }

  #[test]
  fn manual_source_name_is_reserved() {
    let mut cfg = Config::default();
    cfg.sources[3].name = " manual ".to_string();
    assert_eq!(disable_invalid_sources(&mut cfg), 1);
    assert!(!cfg.sources[3].enabled);
  }

  #[test]
  fn written_defaults_load_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sentinel.toml");
    write_default(&path).unwrap();

    let cfg = load_or_default(&path);
    assert_eq!(cfg.sources.len(), 4);
    assert_eq!(cfg.sources[1].api_key_env.as_deref(), Some("ABUSECH_AUTH_KEY"));
    assert_eq!(cfg.http.max_body_bytes, 64 * 1024 * 1024);
  }
}
