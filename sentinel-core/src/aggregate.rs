use crate::types::{Indicator, Sha256Hex};
use std::collections::BTreeMap;

pub const MANUAL_SOURCE: &str = "Manual";

/// Self-test entries the scanner relies on; always present in the artifact.
pub const MANUAL_TEST_SIGNATURES: &[(&str, &str)] = &[
  (
    "275a021bbfb6489e54d471899f7db9d1663fc695ec2fe2a2c4538aabf651fd0f",
    "EICAR-Test-Signature",
  ),
  (
    "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8",
    "Orion-Test-Virus",
  ),
  (
    "8a39875e63821733393933393339333933393339333933393339333933393339",
    "Generic.Trojan.Dropper",
  ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
  Inserted,
  Duplicate,
}

/// Hash-keyed record set for one run. Feed records are first-writer-wins, so callers must
/// offer them in source priority order.
#[derive(Debug, Default)]
pub struct Aggregate {
  records: BTreeMap<Sha256Hex, Indicator>,
}

impl Aggregate {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn offer(&mut self, indicator: Indicator) -> Merge {
    use std::collections::btree_map::Entry;
    match self.records.entry(indicator.hash.clone()) {
      Entry::Occupied(_) => Merge::Duplicate,
      Entry::Vacant(slot) => {
        slot.insert(indicator);
        Merge::Inserted
      }
    }
  }

  /// Inserts the manual test signatures, replacing any feed record with the same hash.
  pub fn inject_manual(&mut self) {
    for (hash, name) in MANUAL_TEST_SIGNATURES {
      let Some(hash) = Sha256Hex::parse(hash) else {
        continue;
      };
      let previous = self.records.insert(
        hash.clone(),
        Indicator {
          hash,
          name: name.to_string(),
          source: MANUAL_SOURCE.to_string(),
          compact: false,
        },
      );
      if let Some(prev) = previous.filter(|p| p.source != MANUAL_SOURCE) {
        tracing::debug!(hash = %prev.hash, source = %prev.source, "feed record replaced by manual test signature");
      }
    }
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  /// Records that came from feeds rather than the manual set.
  pub fn feed_count(&self) -> usize {
    self
      .records
      .values()
      .filter(|r| r.source != MANUAL_SOURCE)
      .count()
  }

  pub fn get(&self, hash: &Sha256Hex) -> Option<&Indicator> {
    self.records.get(hash)
  }

  pub fn into_records(self) -> BTreeMap<Sha256Hex, Indicator> {
    self.records
  }
}
