//! Field lookup tables for upstream formats. Feeds rename keys and shift columns without
//! notice; when that happens, edit these tables rather than the adapters.

use crate::types::IndicatorKind;
use serde::{Deserialize, Serialize};

/// Column positions in a delimited feed row. Defaults follow the ThreatFox CSV export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnLayout {
  #[serde(default = "default_value_column")]
  pub value: usize,
  #[serde(default = "default_kind_column")]
  pub kind: usize,
  #[serde(default = "default_name_column")]
  pub name: usize,
  #[serde(default = "default_tags_column")]
  pub tags: usize,
}

impl ColumnLayout {
  /// Rows with fewer fields than this are skipped.
  pub fn min_width(&self) -> usize {
    self.value.max(self.kind).max(self.name).max(self.tags) + 1
  }
}

impl Default for ColumnLayout {
  fn default() -> Self {
    Self {
      value: default_value_column(),
      kind: default_kind_column(),
      name: default_name_column(),
      tags: default_tags_column(),
    }
  }
}

fn default_value_column() -> usize {
  2
}

fn default_kind_column() -> usize {
  3
}

fn default_name_column() -> usize {
  5
}

fn default_tags_column() -> usize {
  11
}

/// Keys under which a JSON document may wrap its indicator list, in preference order.
pub const LIST_KEYS: &[&str] = &["iocs", "indicators", "data", "results", "items"];

/// Indicator value aliases; digest-named keys first so they win over generic ones.
pub const VALUE_KEYS: &[&str] = &["sha256_hash", "sha256", "hash", "value", "indicator", "ioc"];

pub const KIND_KEYS: &[&str] = &["type", "ioc_type", "indicator_type", "hash_type"];

pub const NAME_KEYS: &[&str] = &[
  "name",
  "signature",
  "malware",
  "malware_printable",
  "family",
  "comment",
];

pub const TAG_KEYS: &[&str] = &["tags", "tag", "labels"];

pub const FILE_TYPE_KEYS: &[&str] = &["file_type", "filetype"];

pub const FILE_NAME_KEYS: &[&str] = &["file_name", "filename"];

pub const MIME_KEYS: &[&str] = &["file_type_mime", "mime", "mime_type"];

/// Kind implied by the key a value was found under, when the record has no type field.
pub fn kind_for_value_key(key: &str) -> Option<IndicatorKind> {
  match key {
    "sha256_hash" | "sha256" => Some(IndicatorKind::Sha256),
    _ => None,
  }
}
