use super::schema::ColumnLayout;
use super::{Endpoint, Fetcher, SourceAdapter};
use crate::types::{FeedEntry, IndicatorKind};
use anyhow::Context;
use std::io::{BufRead, BufReader};

const COMMENT_MARKER: char = '#';

/// CSV export with `#` comment header (ThreatFox layout by default).
pub struct DelimitedAdapter {
  endpoint: Endpoint,
  layout: ColumnLayout,
}

impl DelimitedAdapter {
  pub fn new(endpoint: Endpoint, layout: ColumnLayout) -> Self {
    Self { endpoint, layout }
  }
}

impl SourceAdapter for DelimitedAdapter {
  fn collect(&self, fetcher: &dyn Fetcher, sink: &mut dyn FnMut(FeedEntry)) -> anyhow::Result<()> {
    let body = fetcher.open(&self.endpoint.get())?;
    let skipped = parse_rows(BufReader::new(body), &self.layout, sink)?;
    if skipped > 0 {
      tracing::debug!(skipped, min_width = self.layout.min_width(), "short rows skipped");
    }
    Ok(())
  }
}

/// Streams rows into `sink` and returns how many data rows were too short to read.
pub fn parse_rows<R: BufRead>(
  mut reader: R,
  layout: &ColumnLayout,
  sink: &mut dyn FnMut(FeedEntry),
) -> anyhow::Result<usize> {
  let mut skipped = 0;
  let mut buf = Vec::new();
  loop {
    buf.clear();
    let n = reader.read_until(b'\n', &mut buf).context("read CSV line")?;
    if n == 0 {
      break;
    }

    let line = String::from_utf8_lossy(&buf);
    let line = line.trim();
    if line.is_empty() || line.starts_with(COMMENT_MARKER) {
      continue;
    }

    match decode_row(&split_row(line), layout) {
      Some(entry) => sink(entry),
      None => skipped += 1,
    }
  }
  Ok(skipped)
}

fn decode_row(fields: &[String], layout: &ColumnLayout) -> Option<FeedEntry> {
  if fields.len() < layout.min_width() {
    return None;
  }

  let mut entry = FeedEntry::new(
    IndicatorKind::from_label(&fields[layout.kind]),
    fields[layout.value].as_str(),
  );
  let name = fields[layout.name].as_str();
  if !name.is_empty() {
    entry = entry.with_name(name);
  }
  let tags = fields[layout.tags].as_str();
  if !tags.is_empty() {
    entry = entry.with_tags([tags]);
  }
  Some(entry)
}

/// Comma split that respects double quotes; quote characters and surrounding whitespace
/// are stripped from every field.
pub fn split_row(line: &str) -> Vec<String> {
  let mut fields = Vec::new();
  let mut current = String::new();
  let mut in_quotes = false;

  for c in line.chars() {
    match c {
      '"' => in_quotes = !in_quotes,
      ',' if !in_quotes => {
        fields.push(current.trim().to_string());
        current.clear();
      }
      _ => current.push(c),
    }
  }
  fields.push(current.trim().to_string());
  fields
}
