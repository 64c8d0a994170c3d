use crate::config::{Config, HttpConfig, SourceConfig, SourceKind};
use crate::types::FeedEntry;
use anyhow::Context;
use std::io::Read;
use std::time::Duration;

pub mod delimited;
pub mod fetch;
pub mod hash_list;
pub mod schema;
pub mod structured;
pub mod tag_query;

const API_KEY_HEADER: &str = "Auth-Key";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRequest {
  pub url: String,
  /// Sent as `application/x-www-form-urlencoded` with POST when present, otherwise GET.
  pub form: Option<Vec<(String, String)>>,
  pub headers: Vec<(String, String)>,
  pub timeout: Duration,
}

impl FeedRequest {
  pub fn method(&self) -> &'static str {
    if self.form.is_some() {
      "POST"
    } else {
      "GET"
    }
  }
}

/// Transport seam between adapters and the network.
pub trait Fetcher {
  /// Opens the response body for streaming. Anything but HTTP 200 is an error.
  fn open(&self, req: &FeedRequest) -> anyhow::Result<Box<dyn Read>>;
}

/// Refuses every request; used for `--offline` runs and when no HTTP client can be built.
pub struct DisabledFetcher;

impl Fetcher for DisabledFetcher {
  fn open(&self, req: &FeedRequest) -> anyhow::Result<Box<dyn Read>> {
    anyhow::bail!("network access disabled; not fetching {}", req.url)
  }
}

/// The HTTPS fetcher, or `DisabledFetcher` when no client can be built; a run never
/// fails for lack of a network stack.
pub fn http_or_disabled(http: &HttpConfig) -> Box<dyn Fetcher> {
  match fetch::HttpFetcher::new(http) {
    Ok(f) => Box::new(f),
    Err(e) => {
      tracing::warn!(error = %format!("{e:#}"), "HTTP client unavailable; every fetch will fail");
      Box::new(DisabledFetcher)
    }
  }
}

/// Reads a whole body, refusing anything larger than `max_bytes`.
pub fn fetch_bytes(fetcher: &dyn Fetcher, req: &FeedRequest, max_bytes: u64) -> anyhow::Result<Vec<u8>> {
  let body = fetcher.open(req)?;
  let mut out = Vec::new();
  let mut limited = body.take(max_bytes.saturating_add(1));
  limited
    .read_to_end(&mut out)
    .context("read response body")?;

  if out.len() as u64 > max_bytes {
    anyhow::bail!("response exceeds max size {} bytes", max_bytes);
  }

  Ok(out)
}

/// Where and how one source is fetched: URL, timeout, and any auth headers.
#[derive(Debug, Clone)]
pub struct Endpoint {
  pub url: String,
  pub timeout: Duration,
  pub headers: Vec<(String, String)>,
}

impl Endpoint {
  pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
    Self {
      url: url.into(),
      timeout,
      headers: Vec::new(),
    }
  }

  pub fn get(&self) -> FeedRequest {
    FeedRequest {
      url: self.url.clone(),
      form: None,
      headers: self.headers.clone(),
      timeout: self.timeout,
    }
  }

  pub fn post_form(&self, form: Vec<(String, String)>) -> FeedRequest {
    FeedRequest {
      form: Some(form),
      ..self.get()
    }
  }
}

/// One feed's fetch-and-decode step.
pub trait SourceAdapter {
  /// Hands each decoded entry to `sink` as soon as it is read. When an error is
  /// returned, entries already handed over stay valid.
  fn collect(&self, fetcher: &dyn Fetcher, sink: &mut dyn FnMut(FeedEntry)) -> anyhow::Result<()>;
}

/// Builds the adapter for `source`. Fails when the source names an API key variable that
/// is not set; the caller skips that source.
pub fn build_adapter(source: &SourceConfig, cfg: &Config) -> anyhow::Result<Box<dyn SourceAdapter>> {
  let mut endpoint = Endpoint::new(
    source.url.clone(),
    Duration::from_secs(source.timeout_seconds),
  );

  if let Some(var) = source.api_key_env.as_deref() {
    let key = std::env::var(var)
      .ok()
      .filter(|k| !k.trim().is_empty())
      .ok_or_else(|| anyhow::anyhow!("API key variable {var} is not set"))?;
    endpoint
      .headers
      .push((API_KEY_HEADER.to_string(), key.trim().to_string()));
  }

  let adapter: Box<dyn SourceAdapter> = match source.kind {
    SourceKind::Delimited => Box::new(delimited::DelimitedAdapter::new(
      endpoint,
      source.columns.unwrap_or_default(),
    )),
    SourceKind::Structured => Box::new(structured::StructuredAdapter::new(
      endpoint,
      cfg.http.max_body_bytes,
    )),
    SourceKind::TagQuery => Box::new(tag_query::TagQueryAdapter {
      endpoint,
      tags: source.tags.clone(),
      limit: source.query_limit,
      max_body_bytes: cfg.http.max_body_bytes,
      query_delay: Duration::from_millis(cfg.pipeline.query_delay_ms),
      retry_backoff: Duration::from_millis(cfg.pipeline.retry_backoff_ms),
    }),
    SourceKind::HashList => Box::new(hash_list::HashListAdapter::new(endpoint)?),
  };

  Ok(adapter)
}


#[cfg(test)]
mod tests {
  use super::testing::StaticFetcher;
  use super::*;

  #[test]
  fn fetch_bytes_enforces_limit() {
    let fetcher = StaticFetcher::new().with("https://feed.test/a", b"0123456789");
    let req = Endpoint::new("https://feed.test/a", Duration::from_secs(5)).get();

    assert_eq!(fetch_bytes(&fetcher, &req, 10).unwrap().len(), 10);
    assert!(fetch_bytes(&fetcher, &req, 9).is_err());
  }

  #[test]
  fn http_fallback_builds_a_usable_fetcher() {
    let fetcher = http_or_disabled(&HttpConfig::default());
    let req = Endpoint::new("http://feed.test/plain", Duration::from_secs(1)).get();
    assert!(fetcher.open(&req).is_err());
  }

  #[test]
  fn disabled_fetcher_refuses() {
    let req = Endpoint::new("https://feed.test/a", Duration::from_secs(5)).get();
    assert!(DisabledFetcher.open(&req).is_err());
  }

  #[test]
  fn post_form_keeps_endpoint_headers() {
    let mut ep = Endpoint::new("https://feed.test/api", Duration::from_secs(5));
    ep.headers.push(("Auth-Key".to_string(), "k".to_string()));
    let req = ep.post_form(vec![("query".to_string(), "get_taginfo".to_string())]);

    assert_eq!(req.method(), "POST");
    assert_eq!(req.headers, vec![("Auth-Key".to_string(), "k".to_string())]);
    assert_eq!(ep.get().method(), "GET");
  }

  #[test]
  fn missing_api_key_variable_refuses_to_build() {
    let cfg = Config::default();
    let mut source = cfg.sources[1].clone();
    source.api_key_env = Some("SENTINEL_TEST_KEY_THAT_IS_NEVER_SET".to_string());
    assert!(build_adapter(&source, &cfg).is_err());

    source.api_key_env = None;
    assert!(build_adapter(&source, &cfg).is_ok());
  }
}
