use super::{FeedRequest, Fetcher};
use crate::config::HttpConfig;
use anyhow::Context;
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use reqwest::redirect::Policy;
use reqwest::Url;
use std::io::Read;

const MAX_REDIRECTS: usize = 5;

/// Blocking HTTPS fetcher shared by every adapter in a run.
pub struct HttpFetcher {
  client: Client,
  user_agent: String,
}

impl HttpFetcher {
  pub fn new(http: &HttpConfig) -> anyhow::Result<Self> {
    let client = Client::builder()
      .redirect(Policy::limited(MAX_REDIRECTS))
      .build()
      .context("build HTTP client")?;

    Ok(Self {
      client,
      user_agent: http.user_agent.clone(),
    })
  }
}

impl Fetcher for HttpFetcher {
  fn open(&self, req: &FeedRequest) -> anyhow::Result<Box<dyn Read>> {
    let url = Url::parse(&req.url).with_context(|| format!("invalid URL: {}", req.url))?;
    validate_endpoint(&url)?;

    let builder = match &req.form {
      Some(form) => self.client.post(url.clone()).form(form),
      None => self.client.get(url.clone()),
    };
    let mut builder = builder
      .timeout(req.timeout)
      .header(USER_AGENT, self.user_agent.as_str());
    for (name, value) in &req.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }

    let response = builder
      .send()
      .with_context(|| format!("{} {}", req.method(), safe_url_label(&url)))?;

    let status = response.status().as_u16();
    if status != 200 {
      anyhow::bail!(
        "unexpected HTTP status {} for {}",
        status,
        safe_url_label(&url)
      );
    }

    tracing::debug!(url = %safe_url_label(&url), status, "feed response opened");
    Ok(Box::new(response))
  }
}

fn validate_endpoint(url: &Url) -> anyhow::Result<()> {
  if url.scheme() != "https" {
    anyhow::bail!("endpoint must use HTTPS");
  }
  if url.host_str().is_none() {
    anyhow::bail!("endpoint host missing");
  }
  Ok(())
}

/// Host and path only; query strings may carry keys.
pub fn safe_url_label(url: &Url) -> String {
  let host = url.host_str().unwrap_or("<no-host>");
  let mut path = url.path().to_string();
  if path.is_empty() {
    path = "/".to_string();
  }
  format!("{host}{path}")
}
