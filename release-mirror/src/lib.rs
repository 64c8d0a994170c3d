use anyhow::Context;
use sentinel_core::feed::{fetch_bytes, Endpoint, Fetcher};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const GITHUB_API: &str = "https://api.github.com";
const ACCEPT_GITHUB_V3: &str = "application/vnd.github.v3+json";
const HISTORY_PAGE_SIZE: u32 = 10;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_RELEASE_BYTES: u64 = 16 * 1024 * 1024;

/// One entry of `apps.json`. Everything except the repository fields is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppEntry {
  #[serde(rename = "githubRepo", default)]
  pub github_repo: Option<String>,
  #[serde(rename = "releaseKeyword", default)]
  pub release_keyword: Option<Value>,
}

impl AppEntry {
  /// Falsy values (null, false, zero, empty or blank strings, empty lists and objects)
  /// mean no keyword.
  fn has_keyword(&self) -> bool {
    match &self.release_keyword {
      None | Some(Value::Null) => false,
      Some(Value::Bool(b)) => *b,
      Some(Value::Number(n)) => n.as_f64().map_or(true, |v| v != 0.0),
      Some(Value::String(s)) => !s.trim().is_empty(),
      Some(Value::Array(items)) => !items.is_empty(),
      Some(Value::Object(map)) => !map.is_empty(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  /// `/releases/latest`, stored as a one-element list.
  Latest,
  /// The most recent page of releases, so keyword matching has something to search.
  History,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoPlan {
  pub key: String,
  pub display: String,
  pub strategy: Strategy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorOptions {
  pub apps: PathBuf,
  pub output: PathBuf,
}

impl Default for MirrorOptions {
  fn default() -> Self {
    Self {
      apps: PathBuf::from("apps.json"),
      output: PathBuf::from("mirror.json"),
    }
  }
}

impl MirrorOptions {
  pub fn from_args(args: &[String]) -> Self {
    let mut opts = Self::default();
    let mut i = 0;
    while i < args.len() {
      let target = match args[i].as_str() {
        "--apps" => Some(&mut opts.apps),
        "--output" => Some(&mut opts.output),
        _ => None,
      };
      if let (Some(slot), Some(v)) = (target, args.get(i + 1)) {
        *slot = PathBuf::from(v);
        i += 2;
        continue;
      }
      i += 1;
    }
    opts
  }
}

/// Strips the GitHub host prefix, surrounding whitespace and trailing slashes.
/// Casing is preserved; callers lowercase for the dedup key.
pub fn clean_repo(raw: &str) -> String {
  raw
    .replace("https://github.com/", "")
    .replace("http://github.com/", "")
    .trim()
    .trim_end_matches('/')
    .to_string()
}

pub fn normalize_repo(raw: &str) -> Option<String> {
  let clean = clean_repo(raw).to_lowercase();
  if clean.is_empty() {
    None
  } else {
    Some(clean)
  }
}

/// One plan per distinct repository, in first-seen order.
pub fn plan(apps: &[AppEntry]) -> Vec<RepoPlan> {
  let mut plans: Vec<RepoPlan> = Vec::new();
  for app in apps {
    let Some(raw) = app.github_repo.as_deref() else {
      continue;
    };
    let Some(key) = normalize_repo(raw) else {
      continue;
    };
    let wants_history = app.has_keyword();

    match plans.iter_mut().find(|p| p.key == key) {
      Some(existing) => {
        if wants_history && existing.strategy == Strategy::Latest {
          tracing::info!(repo = %key, "shared repository needs keyword search; using release history");
          existing.strategy = Strategy::History;
        }
      }
      None => plans.push(RepoPlan {
        display: clean_repo(raw),
        key,
        strategy: if wants_history {
          Strategy::History
        } else {
          Strategy::Latest
        },
      }),
    }
  }
  plans
}

pub fn github_endpoint(api_base: &str, plan: &RepoPlan, token: Option<&str>) -> Endpoint {
  let base = api_base.trim_end_matches('/');
  let url = match plan.strategy {
    Strategy::Latest => format!("{base}/repos/{}/releases/latest", plan.display),
    Strategy::History => format!(
      "{base}/repos/{}/releases?per_page={HISTORY_PAGE_SIZE}",
      plan.display
    ),
  };

  let mut endpoint = Endpoint::new(url, REQUEST_TIMEOUT);
  endpoint
    .headers
    .push(("Accept".to_string(), ACCEPT_GITHUB_V3.to_string()));
  if let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) {
    endpoint
      .headers
      .push(("Authorization".to_string(), format!("Bearer {token}")));
  }
  endpoint
}

/// Releases for one repository. An empty list means "write no entry".
pub fn fetch_releases(fetcher: &dyn Fetcher, endpoint: &Endpoint, strategy: Strategy) -> anyhow::Result<Vec<Value>> {
  let body = fetch_bytes(fetcher, &endpoint.get(), MAX_RELEASE_BYTES)?;
  let value: Value = serde_json::from_slice(&body).context("parse release JSON")?;
  Ok(match (strategy, value) {
    (Strategy::Latest, release) => vec![release],
    (Strategy::History, Value::Array(releases)) => releases,
    (Strategy::History, _) => Vec::new(),
  })
}

/// Fetches every planned repository. A failing repository is logged and left out.
pub fn build_mirror(
  plans: &[RepoPlan],
  fetcher: &dyn Fetcher,
  api_base: &str,
  token: Option<&str>,
) -> Map<String, Value> {
  let mut mirror = Map::new();
  for plan in plans {
    let endpoint = github_endpoint(api_base, plan, token);
    tracing::info!(repo = %plan.display, strategy = ?plan.strategy, "fetching releases");
    match fetch_releases(fetcher, &endpoint, plan.strategy) {
      Ok(releases) if releases.is_empty() => {
        tracing::info!(repo = %plan.display, "no releases");
      }
      Ok(releases) => {
        mirror.insert(plan.display.clone(), Value::Array(releases));
      }
      Err(e) => {
        tracing::warn!(repo = %plan.display, error = %format!("{e:#}"), "release fetch failed");
      }
    }
  }
  mirror
}

pub fn load_apps(path: &Path) -> anyhow::Result<Vec<AppEntry>> {
  let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
  serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))
}

pub fn write_mirror(path: &Path, mirror: &Map<String, Value>) -> anyhow::Result<()> {
  let mut bytes = serde_json::to_vec_pretty(mirror).context("serialize mirror")?;
  bytes.push(b'\n');
  sentinel_core::serialize::atomic_write_file(path, &bytes)
}

/// Returns the number of repositories written, or `None` when there was nothing to mirror.
pub fn run(opts: &MirrorOptions, fetcher: &dyn Fetcher, token: Option<&str>) -> anyhow::Result<Option<usize>> {
  let apps = match load_apps(&opts.apps) {
    Ok(apps) => apps,
    Err(e) => {
      tracing::warn!(error = %format!("{e:#}"), "apps list unavailable");
      Vec::new()
    }
  };
  if apps.is_empty() {
    println!("No apps found.");
    return Ok(None);
  }

  let plans = plan(&apps);
  println!(
    "Scanned {} apps; {} unique repositories.",
    apps.len(),
    plans.len()
  );

  let mirror = build_mirror(&plans, fetcher, GITHUB_API, token);
  write_mirror(&opts.output, &mirror)
    .with_context(|| format!("write {}", opts.output.display()))?;
  println!(
    "Wrote {} entries to {}",
    mirror.len(),
    opts.output.display()
  );
  Ok(Some(mirror.len()))
}
