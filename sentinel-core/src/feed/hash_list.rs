use super::{Endpoint, Fetcher, SourceAdapter};
use crate::types::{FeedEntry, IndicatorKind};
use anyhow::Context;
use regex::Regex;
use std::io::{BufRead, BufReader};

const SHA256_RUN: &str = r"\b[0-9A-Fa-f]{64}\b";

/// Newline-separated hash archive. Read as a stream; bodies can run to hundreds of MB.
pub struct HashListAdapter {
  endpoint: Endpoint,
  pattern: Regex,
}

impl HashListAdapter {
  pub fn new(endpoint: Endpoint) -> anyhow::Result<Self> {
    Ok(Self {
      endpoint,
      pattern: Regex::new(SHA256_RUN).context("compile hash pattern")?,
    })
  }
}

impl SourceAdapter for HashListAdapter {
  fn collect(&self, fetcher: &dyn Fetcher, sink: &mut dyn FnMut(FeedEntry)) -> anyhow::Result<()> {
    let body = fetcher.open(&self.endpoint.get())?;
    extract_hashes(BufReader::new(body), &self.pattern, sink)
  }
}

pub fn extract_hashes<R: BufRead>(
  mut reader: R,
  pattern: &Regex,
  sink: &mut dyn FnMut(FeedEntry),
) -> anyhow::Result<()> {
  let mut buf = Vec::new();
  loop {
    buf.clear();
    let n = reader.read_until(b'\n', &mut buf).context("read hash list line")?;
    if n == 0 {
      return Ok(());
    }

    let line = String::from_utf8_lossy(&buf);
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
      continue;
    }

    for m in pattern.find_iter(line) {
      sink(FeedEntry::new(IndicatorKind::Sha256, m.as_str()));
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::feed::testing::StaticFetcher;
  use std::io::{self, Cursor, Read};
  use std::time::Duration;

  fn pattern() -> Regex {
    Regex::new(SHA256_RUN).unwrap()
  }

  #[test]
  fn extracts_exact_length_runs_only() {
    let body = format!(
      "################\n# MalwareBazaar recent\n{}\n{}\n{}\n  {}  \n\n",
      "AB".repeat(32),
      "a".repeat(65),
      "b".repeat(63),
      "cd".repeat(32),
    );
    let mut out = Vec::new();
    extract_hashes(Cursor::new(body), &pattern(), &mut |e| out.push(e)).unwrap();

    let values: Vec<&str> = out.iter().map(|e| e.value.as_str()).collect();
    assert_eq!(values, vec!["AB".repeat(32), "cd".repeat(32)]);
    assert!(out.iter().all(|e| e.kind == IndicatorKind::Sha256));
  }

  struct FailingAfter {
    inner: Cursor<Vec<u8>>,
  }

  impl Read for FailingAfter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
      let n = self.inner.read(buf)?;
      if n == 0 {
        return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
      }
      Ok(n)
    }
  }

  #[test]
  fn stream_error_keeps_lines_already_read() {
    let body = format!("{}\n{}\n", "11".repeat(32), "22".repeat(32));
    let reader = io::BufReader::new(FailingAfter {
      inner: Cursor::new(body.into_bytes()),
    });
    let mut out = Vec::new();

    assert!(extract_hashes(reader, &pattern(), &mut |e| out.push(e)).is_err());
    assert_eq!(out.len(), 2);
  }

  #[test]
  fn adapter_reads_endpoint() {
    let url = "https://bazaar.test/export/txt/sha256/recent/";
    let body = format!("{}\n", "ef".repeat(32));
    let fetcher = StaticFetcher::new().with(url, body.as_bytes());
    let adapter = HashListAdapter::new(Endpoint::new(url, Duration::from_secs(5))).unwrap();

    let mut out = Vec::new();
    adapter.collect(&fetcher, &mut |e| out.push(e)).unwrap();
    assert_eq!(out.len(), 1);
  }
}
