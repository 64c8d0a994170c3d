pub mod aggregate;
pub mod canonical;
pub mod config;
pub mod feed;
pub mod filter;
pub mod logging;
pub mod paths;
pub mod pipeline;
pub mod serialize;
pub mod types;

use anyhow::Context;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOptions {
  pub config: Option<PathBuf>,
  pub output: Option<PathBuf>,
  pub shard: bool,
  pub offline: bool,
  pub init_config: bool,
}

impl CliOptions {
  pub fn from_args(args: &[String]) -> Self {
    let mut opts = Self::default();
    let mut i = 0;
    while i < args.len() {
      match args[i].as_str() {
        "--config" => {
          if let Some(v) = args.get(i + 1) {
            opts.config = Some(PathBuf::from(v));
            i += 2;
            continue;
          }
        }
        "--output" => {
          if let Some(v) = args.get(i + 1) {
            opts.output = Some(PathBuf::from(v));
            i += 2;
            continue;
          }
        }
        "--shard" => opts.shard = true,
        "--offline" => opts.offline = true,
        "--init-config" => opts.init_config = true,
        _ => {}
      }
      i += 1;
    }
    opts
  }
}

/// One compiler run: load config, fetch every feed, write the artifact.
pub fn run_compiler(args: &[String]) -> anyhow::Result<()> {
  let opts = CliOptions::from_args(args);
  let config_path = opts.config.clone().unwrap_or_else(paths::default_config_path);

  if opts.init_config {
    config::write_default(&config_path)
      .with_context(|| format!("write default config to {}", config_path.display()))?;
    println!("Default config written to {}", config_path.display());
    return Ok(());
  }

  let mut cfg = config::load_or_default(&config_path);
  if let Some(output) = opts.output {
    cfg.output.path = output;
  }
  if opts.shard {
    cfg.output.mode = config::OutputMode::Sharded;
  }

  if let Err(e) = logging::init(&cfg.logging) {
    eprintln!("Sentinel: logging setup failed, continuing without file logs: {e}");
  }
  config::disable_invalid_sources(&mut cfg);

  println!(
    "Sentinel threat compiler {} starting: sources={}",
    env!("CARGO_PKG_VERSION"),
    cfg.sources.iter().filter(|s| s.enabled).count()
  );

  let fetcher: Box<dyn feed::Fetcher> = if opts.offline {
    tracing::info!("offline run; only manual signatures will be written");
    Box::new(feed::DisabledFetcher)
  } else {
    feed::http_or_disabled(&cfg.http)
  };
  let summary = pipeline::run(&cfg, fetcher.as_ref()).context("write signature database")?;

  for report in &summary.reports {
    println!(
      "SOURCE {} status={} entries={} accepted={} duplicates={} filtered={} invalid={}",
      report.source,
      status_label(&report.status),
      report.entries,
      report.accepted,
      report.duplicates,
      report.filtered,
      report.invalid,
    );
  }
  if summary.low_yield {
    println!(
      "WARNING: only {} feed signatures collected; output is mostly manual test entries.",
      summary.from_feeds
    );
  }
  for file in &summary.written {
    println!(
      "Wrote {} records={} bytes={}",
      file.path.display(),
      file.records,
      file.bytes
    );
  }
  println!("Compiled {} unique signatures.", summary.total);
  Ok(())
}

fn status_label(status: &pipeline::SourceStatus) -> &'static str {
  match status {
    pipeline::SourceStatus::Complete => "ok",
    pipeline::SourceStatus::Degraded(_) => "degraded",
    pipeline::SourceStatus::Skipped(_) => "skipped",
    pipeline::SourceStatus::Disabled => "disabled",
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn args(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn parses_known_flags() {
    let opts = CliOptions::from_args(&args(&[
      "sentinel-compiler",
      "--config",
      "conf/sentinel.toml",
      "--shard",
      "--offline",
      "--output",
      "out.json",
    ]));
    assert_eq!(opts.config, Some(PathBuf::from("conf/sentinel.toml")));
    assert_eq!(opts.output, Some(PathBuf::from("out.json")));
    assert!(opts.shard);
    assert!(opts.offline);
    assert!(!opts.init_config);
  }

  #[test]
  fn dangling_value_flag_is_ignored() {
    let opts = CliOptions::from_args(&args(&["sentinel-compiler", "--config"]));
    assert_eq!(opts, CliOptions::default());
  }
}
