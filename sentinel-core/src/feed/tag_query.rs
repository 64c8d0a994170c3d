use super::structured::decode_items;
use super::{fetch_bytes, Endpoint, Fetcher, SourceAdapter};
use crate::types::FeedEntry;
use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct TagInfoResponse {
  query_status: String,
  #[serde(default)]
  data: Option<Value>,
}

/// MalwareBazaar-style API: one `get_taginfo` POST per tag.
pub struct TagQueryAdapter {
  pub endpoint: Endpoint,
  pub tags: Vec<String>,
  pub limit: u32,
  pub max_body_bytes: u64,
  pub query_delay: Duration,
  pub retry_backoff: Duration,
}

impl SourceAdapter for TagQueryAdapter {
  fn collect(&self, fetcher: &dyn Fetcher, sink: &mut dyn FnMut(FeedEntry)) -> anyhow::Result<()> {
    let mut failed = 0;
    for (i, tag) in self.tags.iter().enumerate() {
      if i > 0 && !self.query_delay.is_zero() {
        std::thread::sleep(self.query_delay);
      }

      match self.query_with_retry(fetcher, tag) {
        Ok(entries) => {
          tracing::debug!(tag = %tag, entries = entries.len(), "tag query done");
          for entry in entries {
            sink(entry);
          }
        }
        Err(e) => {
          failed += 1;
          tracing::warn!(tag = %tag, error = %format!("{e:#}"), "tag query failed");
        }
      }
    }

    if failed > 0 && failed == self.tags.len() {
      anyhow::bail!("all {failed} tag queries failed");
    }
    Ok(())
  }
}

impl TagQueryAdapter {
  fn query_with_retry(&self, fetcher: &dyn Fetcher, tag: &str) -> anyhow::Result<Vec<FeedEntry>> {
    match self.query(fetcher, tag) {
      Ok(entries) => Ok(entries),
      Err(first) => {
        tracing::debug!(tag = %tag, error = %first, "tag query failed; retrying once");
        if !self.retry_backoff.is_zero() {
          std::thread::sleep(self.retry_backoff);
        }
        self.query(fetcher, tag)
      }
    }
  }

  fn query(&self, fetcher: &dyn Fetcher, tag: &str) -> anyhow::Result<Vec<FeedEntry>> {
    let req = self.endpoint.post_form(vec![
      ("query".to_string(), "get_taginfo".to_string()),
      ("tag".to_string(), tag.to_string()),
      ("limit".to_string(), self.limit.to_string()),
    ]);
    let body = fetch_bytes(fetcher, &req, self.max_body_bytes)?;
    parse_response(&body)
  }
}

fn parse_response(body: &[u8]) -> anyhow::Result<Vec<FeedEntry>> {
  let resp: TagInfoResponse = serde_json::from_slice(body).context("parse tag query JSON")?;
  match resp.query_status.as_str() {
    "ok" => {
      let Some(Value::Array(items)) = resp.data else {
        anyhow::bail!("query_status ok without a data list");
      };
      let mut out = Vec::new();
      decode_items(items, &mut |e| out.push(e));
      Ok(out)
    }
    // Unknown tags are an empty answer, not a failure.
    "no_results" | "tag_not_found" => Ok(Vec::new()),
    other => anyhow::bail!("query_status {other}"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::feed::testing::StaticFetcher;

  const URL: &str = "https://mb-api.test/api/v1/";

  fn adapter(tags: &[&str]) -> TagQueryAdapter {
    TagQueryAdapter {
      endpoint: Endpoint::new(URL, Duration::from_secs(5)),
      tags: tags.iter().map(|t| t.to_string()).collect(),
      limit: 50,
      max_body_bytes: 1024 * 1024,
      query_delay: Duration::ZERO,
      retry_backoff: Duration::ZERO,
    }
  }

  fn ok_body(hash: &str) -> Vec<u8> {
    format!(
      r#"{{"query_status":"ok","data":[{{"sha256_hash":"{hash}","signature":"Hydra","file_type":"apk","tags":["android"]}}]}}"#
    )
    .into_bytes()
  }

  #[test]
  fn one_post_per_tag_with_form_fields() {
    let fetcher = StaticFetcher::new()
      .with(URL, &ok_body(&"aa".repeat(32)))
      .with(URL, br#"{"query_status":"no_results"}"#);
    let mut out = Vec::new();
    adapter(&["android", "spyware"]).collect(&fetcher, &mut |e| out.push(e)).unwrap();

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].name.as_deref(), Some("Hydra"));
    let reqs = fetcher.requests.borrow();
    assert_eq!(reqs.len(), 2);
    assert_eq!(reqs[0].method(), "POST");
    let form = reqs[1].form.as_ref().unwrap();
    assert!(form.contains(&("tag".to_string(), "spyware".to_string())));
    assert!(form.contains(&("limit".to_string(), "50".to_string())));
  }

  #[test]
  fn failed_query_is_retried_once() {
    let fetcher = StaticFetcher::new()
      .with(URL, br#"{"query_status":"illegal_tag"}"#)
      .with(URL, &ok_body(&"bb".repeat(32)));
    let mut out = Vec::new();
    adapter(&["android"]).collect(&fetcher, &mut |e| out.push(e)).unwrap();

    assert_eq!(out.len(), 1);
    assert_eq!(fetcher.requests.borrow().len(), 2);
  }

  #[test]
  fn one_failing_tag_keeps_the_others() {
    let fetcher = StaticFetcher::new()
      .with(URL, b"<html>busy</html>")
      .with(URL, b"<html>busy</html>")
      .with(URL, &ok_body(&"cc".repeat(32)));
    let mut out = Vec::new();
    adapter(&["apk", "android"]).collect(&fetcher, &mut |e| out.push(e)).unwrap();
    assert_eq!(out.len(), 1);
  }

  #[test]
  fn unknown_tag_is_an_empty_answer_without_retry() {
    let fetcher = StaticFetcher::new().with(URL, br#"{"query_status":"tag_not_found"}"#);
    let mut out = Vec::new();
    adapter(&["stalkerware", "banker"])
      .collect(&fetcher, &mut |e| out.push(e))
      .unwrap();
    assert!(out.is_empty());
    assert_eq!(fetcher.requests.borrow().len(), 2);
  }

  #[test]
  fn all_tags_failing_is_an_error() {
    let fetcher = StaticFetcher::new().with(URL, br#"{"query_status":"unknown_auth_key"}"#);
    let mut out = Vec::new();
    assert!(adapter(&["apk", "android"]).collect(&fetcher, &mut |e| out.push(e)).is_err());
    assert!(out.is_empty());
  }
}
