use anyhow::Context;
use sentinel_core::config::HttpConfig;

fn main() -> anyhow::Result<()> {
  let args: Vec<String> = std::env::args().collect();

  if args.iter().any(|a| a == "--version") {
    println!("{}", env!("CARGO_PKG_VERSION"));
    return Ok(());
  }

  if let Err(e) = sentinel_core::logging::init_stderr("info") {
    eprintln!("release-mirror: logging setup failed: {e}");
  }

  let opts = release_mirror::MirrorOptions::from_args(&args);
  let http = HttpConfig {
    user_agent: format!("release-mirror/{}", env!("CARGO_PKG_VERSION")),
    ..HttpConfig::default()
  };
  let fetcher = sentinel_core::feed::http_or_disabled(&http);
  let token = std::env::var("GITHUB_TOKEN").ok();

  release_mirror::run(&opts, fetcher.as_ref(), token.as_deref()).context("release mirror run")?;
  Ok(())
}
