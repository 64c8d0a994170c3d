use super::schema;
use super::{fetch_bytes, Endpoint, Fetcher, SourceAdapter};
use crate::types::{FeedEntry, IndicatorKind};
use anyhow::Context;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Accepted top-level JSON shapes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Document {
  List(Vec<Value>),
  Wrapped(Map<String, Value>),
}

impl Document {
  /// The indicator list: the document itself, a known wrapper key, or failing those the
  /// first member (in document order) that lists objects, then any list at all.
  pub fn into_items(self) -> anyhow::Result<Vec<Value>> {
    match self {
      Self::List(items) => Ok(items),
      Self::Wrapped(mut map) => {
        for key in schema::LIST_KEYS {
          if matches!(map.get(*key), Some(Value::Array(_))) {
            if let Some(Value::Array(items)) = map.remove(*key) {
              return Ok(items);
            }
          }
        }
        let mut lists: Vec<Vec<Value>> = map
          .into_iter()
          .filter_map(|(_, v)| match v {
            Value::Array(items) => Some(items),
            _ => None,
          })
          .collect();
        if lists.is_empty() {
          anyhow::bail!("JSON object holds no indicator list");
        }
        let pick = lists
          .iter()
          .position(|items| items.iter().any(Value::is_object))
          .unwrap_or(0);
        Ok(lists.swap_remove(pick))
      }
    }
  }
}

/// JSON feed fetched with one GET (Echap stalkerware indicators by default).
pub struct StructuredAdapter {
  endpoint: Endpoint,
  max_body_bytes: u64,
}

impl StructuredAdapter {
  pub fn new(endpoint: Endpoint, max_body_bytes: u64) -> Self {
    Self {
      endpoint,
      max_body_bytes,
    }
  }
}

impl SourceAdapter for StructuredAdapter {
  fn collect(&self, fetcher: &dyn Fetcher, sink: &mut dyn FnMut(FeedEntry)) -> anyhow::Result<()> {
    let body = fetch_bytes(fetcher, &self.endpoint.get(), self.max_body_bytes)?;
    let doc: Document = serde_json::from_slice(&body).context("parse feed JSON")?;
    let dropped = decode_items(doc.into_items()?, sink);
    if dropped > 0 {
      tracing::debug!(dropped, "JSON records without a usable value dropped");
    }
    Ok(())
  }
}

/// Decodes every item into `sink`; returns how many items were unusable.
pub fn decode_items(items: Vec<Value>, sink: &mut dyn FnMut(FeedEntry)) -> usize {
  let mut dropped = 0;
  for item in &items {
    match decode_entry(item) {
      Some(entry) => sink(entry),
      None => dropped += 1,
    }
  }
  dropped
}

pub fn decode_entry(item: &Value) -> Option<FeedEntry> {
  let obj = item.as_object()?;
  let (value_key, value) = schema::VALUE_KEYS
    .iter()
    .find_map(|key| text_field(obj, key).map(|v| (*key, v)))?;

  let kind = lookup_text(obj, schema::KIND_KEYS)
    .map(|label| IndicatorKind::from_label(&label))
    .or_else(|| schema::kind_for_value_key(value_key))
    .unwrap_or_else(|| IndicatorKind::infer(&value));

  let mut entry = FeedEntry::new(kind, value);
  entry.name = lookup_text(obj, schema::NAME_KEYS);
  entry.tags = lookup_tags(obj);
  entry.file_type = lookup_text(obj, schema::FILE_TYPE_KEYS);
  entry.file_name = lookup_text(obj, schema::FILE_NAME_KEYS);
  entry.mime = lookup_text(obj, schema::MIME_KEYS);
  Some(entry)
}

fn lookup_text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
  keys.iter().find_map(|key| text_field(obj, key))
}

fn text_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
  match obj.get(key)? {
    Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

fn lookup_tags(obj: &Map<String, Value>) -> Vec<String> {
  for key in schema::TAG_KEYS {
    match obj.get(*key) {
      Some(Value::Array(items)) => {
        return items
          .iter()
          .filter_map(|v| v.as_str())
          .map(str::to_string)
          .collect();
      }
      Some(Value::String(s)) if !s.trim().is_empty() => return vec![s.trim().to_string()],
      _ => {}
    }
  }
  Vec::new()
}
