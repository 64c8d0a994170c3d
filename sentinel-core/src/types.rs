use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;

/// Label used when a feed carries no usable malware name.
pub const DEFAULT_NAME: &str = "Generic.Malware";

/// Lowercase, 64-character hexadecimal SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sha256Hex(String);

impl Sha256Hex {
  /// Trims and lowercases `raw`; rejects anything that is not exactly 64 hex characters.
  pub fn parse(raw: &str) -> Option<Self> {
    let candidate = raw.trim().to_ascii_lowercase();
    if candidate.len() != 64 || !candidate.bytes().all(|b| b.is_ascii_hexdigit()) {
      return None;
    }
    Some(Self(candidate))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Leading hex digit, used to pick the output shard.
  pub fn shard_nibble(&self) -> u8 {
    let first = self.0.as_bytes()[0];
    match first {
      b'0'..=b'9' => first - b'0',
      _ => first - b'a' + 10,
    }
  }
}

impl fmt::Display for Sha256Hex {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl Serialize for Sha256Hex {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.0)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndicatorKind {
  Sha256,
  Sha1,
  Md5,
  Other(String),
}

impl IndicatorKind {
  pub fn from_label(label: &str) -> Self {
    let label = label.trim().to_ascii_lowercase();
    match label.as_str() {
      "sha256" | "sha256_hash" | "sha-256" | "sha_256" => Self::Sha256,
      "sha1" | "sha1_hash" | "sha-1" => Self::Sha1,
      "md5" | "md5_hash" => Self::Md5,
      _ => Self::Other(label),
    }
  }

  /// Guesses the kind from the value alone: hex digests by length, anything else is `Other`.
  pub fn infer(value: &str) -> Self {
    let value = value.trim();
    if !value.bytes().all(|b| b.is_ascii_hexdigit()) {
      return Self::Other("unknown".to_string());
    }
    match value.len() {
      64 => Self::Sha256,
      40 => Self::Sha1,
      32 => Self::Md5,
      _ => Self::Other("unknown".to_string()),
    }
  }
}

/// One indicator as decoded from a feed, before filtering and canonicalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
  pub kind: IndicatorKind,
  pub value: String,
  pub name: Option<String>,
  pub tags: Vec<String>,
  pub file_type: Option<String>,
  pub file_name: Option<String>,
  pub mime: Option<String>,
}

impl FeedEntry {
  pub fn new(kind: IndicatorKind, value: impl Into<String>) -> Self {
    Self {
      kind,
      value: value.into(),
      name: None,
      tags: Vec::new(),
      file_type: None,
      file_name: None,
      mime: None,
    }
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn with_tags<I, S>(mut self, tags: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.tags = tags.into_iter().map(Into::into).collect();
    self
  }
}

/// Canonical signature record as written to the artifact.
///
/// `compact` records come from bulk sources without metadata and serialize as
/// `{"hash": ...}` only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indicator {
  pub hash: Sha256Hex,
  pub name: String,
  pub source: String,
  pub compact: bool,
}

impl Serialize for Indicator {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let len = if self.compact { 1 } else { 3 };
    let mut map = serializer.serialize_map(Some(len))?;
    map.serialize_entry("hash", &self.hash)?;
    if !self.compact {
      map.serialize_entry("name", &self.name)?;
      map.serialize_entry("source", &self.source)?;
    }
    map.end()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_normalizes_case_and_whitespace() {
    let raw = format!("  {}\n", "AB".repeat(32));
    let h = Sha256Hex::parse(&raw).unwrap();
    assert_eq!(h.as_str(), "ab".repeat(32));
  }

  #[test]
  fn parse_rejects_wrong_length_and_non_hex() {
    assert!(Sha256Hex::parse(&"a".repeat(63)).is_none());
    assert!(Sha256Hex::parse(&"a".repeat(65)).is_none());
    assert!(Sha256Hex::parse(&format!("{}g", "a".repeat(63))).is_none());
    assert!(Sha256Hex::parse("").is_none());
  }

  #[test]
  fn shard_nibble_follows_leading_digit() {
    assert_eq!(Sha256Hex::parse(&"0".repeat(64)).unwrap().shard_nibble(), 0);
    assert_eq!(Sha256Hex::parse(&"9".repeat(64)).unwrap().shard_nibble(), 9);
    assert_eq!(Sha256Hex::parse(&"f".repeat(64)).unwrap().shard_nibble(), 15);
  }

  #[test]
  fn kind_labels_and_inference() {
    assert_eq!(IndicatorKind::from_label("SHA256_HASH"), IndicatorKind::Sha256);
    assert_eq!(IndicatorKind::from_label("md5_hash"), IndicatorKind::Md5);
    assert_eq!(
      IndicatorKind::from_label("ip:port"),
      IndicatorKind::Other("ip:port".to_string())
    );
    assert_eq!(IndicatorKind::infer(&"c".repeat(64)), IndicatorKind::Sha256);
    assert_eq!(IndicatorKind::infer(&"c".repeat(40)), IndicatorKind::Sha1);
    assert!(matches!(IndicatorKind::infer("evil.example.com"), IndicatorKind::Other(_)));
  }

  #[test]
  fn compact_indicator_serializes_hash_only() {
    let hash = Sha256Hex::parse(&"ab".repeat(32)).unwrap();
    let verbose = Indicator {
      hash: hash.clone(),
      name: "Hydra".to_string(),
      source: "ThreatFox".to_string(),
      compact: false,
    };
    let compact = Indicator {
      compact: true,
      ..verbose.clone()
    };

    assert_eq!(
      serde_json::to_string(&verbose).unwrap(),
      format!(r#"{{"hash":"{hash}","name":"Hydra","source":"ThreatFox"}}"#)
    );
    assert_eq!(
      serde_json::to_string(&compact).unwrap(),
      format!(r#"{{"hash":"{hash}"}}"#)
    );
  }
}
