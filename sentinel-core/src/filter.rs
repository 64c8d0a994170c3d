use crate::types::{FeedEntry, IndicatorKind};
use serde::{Deserialize, Serialize};

/// How much evidence a source must show before its entries enter the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelevancePolicy {
  /// SHA-256 only, plus at least one Android signal (tag, package type, known family).
  Heuristic,
  /// SHA-256 only; the feed itself is already Android-specific.
  TypeOnly,
  /// Bulk archives: every extracted hash is kept, without metadata.
  Unfiltered,
}

const TAG_KEYWORDS: &[&str] = &["android", "apk", "spyware", "banker", "rat", "stalkerware"];

const PACKAGE_EXTENSION: &str = ".apk";
const PACKAGE_MIME: &str = "android.package-archive";

const ANDROID_FAMILIES: &[&str] = &[
  "ahmyth",
  "anubis",
  "brata",
  "cerberus",
  "coper",
  "ermac",
  "flubot",
  "godfather",
  "harly",
  "hydra",
  "joker",
  "sharkbot",
  "spynote",
  "teabot",
  "triada",
  "vultur",
  "xenomorph",
];

pub fn is_relevant(policy: RelevancePolicy, entry: &FeedEntry) -> bool {
  match policy {
    RelevancePolicy::Unfiltered => true,
    RelevancePolicy::TypeOnly => entry.kind == IndicatorKind::Sha256,
    RelevancePolicy::Heuristic => {
      entry.kind == IndicatorKind::Sha256
        && (has_keyword_tag(&entry.tags)
          || is_package_file(entry)
          || has_known_family(entry.name.as_deref()))
    }
  }
}

/// Tags are free text (`"android,banker"`, `"Android.Spy"`); they are split into
/// alphanumeric tokens and matched whole, so `rat` does not match `pirate`.
fn has_keyword_tag(tags: &[String]) -> bool {
  tags
    .iter()
    .flat_map(|t| t.split(|c: char| !c.is_ascii_alphanumeric()))
    .filter(|token| !token.is_empty())
    .any(|token| {
      TAG_KEYWORDS
        .iter()
        .any(|kw| token.eq_ignore_ascii_case(kw))
    })
}

fn is_package_file(entry: &FeedEntry) -> bool {
  let file_type = entry
    .file_type
    .as_deref()
    .map(|t| t.trim().trim_start_matches('.').eq_ignore_ascii_case("apk"))
    .unwrap_or(false);
  let file_name = entry
    .file_name
    .as_deref()
    .map(|n| n.trim().to_ascii_lowercase().ends_with(PACKAGE_EXTENSION))
    .unwrap_or(false);
  let mime = entry
    .mime
    .as_deref()
    .map(|m| m.to_ascii_lowercase().contains(PACKAGE_MIME))
    .unwrap_or(false);

  file_type || file_name || mime
}

fn has_known_family(name: Option<&str>) -> bool {
  let Some(name) = name else {
    return false;
  };
  let name = name.to_ascii_lowercase();
  ANDROID_FAMILIES.iter().any(|family| name.contains(family))
}
