use crate::types::{Indicator, Sha256Hex, DEFAULT_NAME};

/// Builds the canonical record, or `None` when the hash is not a SHA-256 digest.
pub fn canonicalize(hash: &str, name: Option<&str>, source: &str, compact: bool) -> Option<Indicator> {
  let hash = Sha256Hex::parse(hash)?;
  Some(Indicator {
    hash,
    name: canonical_name(name),
    source: source.trim().to_string(),
    compact,
  })
}

/// Blank, `n/a` and `none` carry no family information.
pub fn is_placeholder_name(name: &str) -> bool {
  let name = name.trim();
  name.is_empty() || name.eq_ignore_ascii_case("n/a") || name.eq_ignore_ascii_case("none")
}

fn canonical_name(name: Option<&str>) -> String {
  match name {
    Some(n) if !is_placeholder_name(n) => n.trim().to_string(),
    _ => DEFAULT_NAME.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builds_lowercase_record() {
    let raw = format!(" {} ", "AA".repeat(32));
    let ind = canonicalize(&raw, Some(" Hydra "), "ThreatFox", false).unwrap();
    assert_eq!(ind.hash.as_str(), "aa".repeat(32));
    assert_eq!(ind.name, "Hydra");
    assert_eq!(ind.source, "ThreatFox");
    assert!(!ind.compact);
  }

  #[test]
  fn blank_and_placeholder_names_get_default() {
    let h = "ab".repeat(32);
    for name in [None, Some(""), Some("   "), Some("N/A"), Some("None")] {
      let ind = canonicalize(&h, name, "Echap", false).unwrap();
      assert_eq!(ind.name, DEFAULT_NAME);
    }
  }

  #[test]
  fn malformed_hashes_are_dropped() {
    assert!(canonicalize(&"a".repeat(63), Some("x"), "s", false).is_none());
    assert!(canonicalize(&"a".repeat(65), Some("x"), "s", false).is_none());
    assert!(canonicalize(&"z".repeat(64), Some("x"), "s", false).is_none());
    assert!(canonicalize("example.com", Some("x"), "s", false).is_none());
  }
}
