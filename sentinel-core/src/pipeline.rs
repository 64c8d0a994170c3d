use crate::aggregate::{Aggregate, Merge};
use crate::canonical;
use crate::config::{Config, SourceConfig};
use crate::feed::{self, Fetcher};
use crate::filter::{self, RelevancePolicy};
use crate::serialize::{self, WrittenFile};
use crate::types::FeedEntry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStatus {
  Complete,
  /// Fetch or parse failed; entries read before the failure were kept.
  Degraded(String),
  Skipped(String),
  Disabled,
}

#[derive(Debug, Clone)]
pub struct SourceReport {
  pub source: String,
  pub status: SourceStatus,
  pub entries: usize,
  pub accepted: usize,
  pub duplicates: usize,
  pub filtered: usize,
  pub invalid: usize,
}

impl SourceReport {
  fn new(source: &str) -> Self {
    Self {
      source: source.to_string(),
      status: SourceStatus::Complete,
      entries: 0,
      accepted: 0,
      duplicates: 0,
      filtered: 0,
      invalid: 0,
    }
  }
}

pub struct Compilation {
  pub aggregate: Aggregate,
  pub reports: Vec<SourceReport>,
  pub low_yield: bool,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
  pub reports: Vec<SourceReport>,
  pub total: usize,
  pub from_feeds: usize,
  pub low_yield: bool,
  pub written: Vec<WrittenFile>,
}

/// Fetches every enabled source in priority order and merges the results. Never fails:
/// a broken source contributes nothing and the manual signatures are always present.
pub fn compile(cfg: &Config, fetcher: &dyn Fetcher) -> Compilation {
  let mut aggregate = Aggregate::new();
  let reports: Vec<SourceReport> = cfg
    .sources
    .iter()
    .map(|source| ingest_source(source, cfg, fetcher, &mut aggregate))
    .collect();

  aggregate.inject_manual();

  let from_feeds = aggregate.feed_count();
  let low_yield = from_feeds < cfg.pipeline.min_expected_indicators;
  if low_yield {
    tracing::warn!(
      from_feeds,
      threshold = cfg.pipeline.min_expected_indicators,
      "very few indicators collected; feeds may be unreachable"
    );
  }

  Compilation {
    aggregate,
    reports,
    low_yield,
  }
}

/// Compiles and writes the artifact. Only an output write failure is an error.
pub fn run(cfg: &Config, fetcher: &dyn Fetcher) -> anyhow::Result<RunSummary> {
  let Compilation {
    aggregate,
    reports,
    low_yield,
  } = compile(cfg, fetcher);

  let total = aggregate.len();
  let from_feeds = aggregate.feed_count();
  let written = serialize::write_artifacts(&aggregate.into_records(), &cfg.output)?;
  for file in &written {
    tracing::info!(
      path = %file.path.display(),
      records = file.records,
      bytes = file.bytes,
      sha256 = %file.sha256,
      "artifact written"
    );
  }

  Ok(RunSummary {
    reports,
    total,
    from_feeds,
    low_yield,
    written,
  })
}

fn ingest_source(
  source: &SourceConfig,
  cfg: &Config,
  fetcher: &dyn Fetcher,
  aggregate: &mut Aggregate,
) -> SourceReport {
  let mut report = SourceReport::new(&source.name);
  if !source.enabled {
    report.status = SourceStatus::Disabled;
    tracing::info!(source = %source.name, "source disabled");
    return report;
  }

  let adapter = match feed::build_adapter(source, cfg) {
    Ok(a) => a,
    Err(e) => {
      tracing::warn!(source = %source.name, reason = %format!("{e:#}"), "source skipped");
      report.status = SourceStatus::Skipped(format!("{e:#}"));
      return report;
    }
  };

  tracing::info!(source = %source.name, kind = ?source.kind, "fetching source");
  let policy = source.relevance();
  let result = adapter.collect(fetcher, &mut |entry| {
    merge_entry(entry, source, policy, aggregate, &mut report);
  });

  if let Err(e) = result {
    tracing::warn!(
      source = %source.name,
      kept = report.accepted,
      error = %format!("{e:#}"),
      "source failed"
    );
    report.status = SourceStatus::Degraded(format!("{e:#}"));
  }

  tracing::info!(
    source = %source.name,
    entries = report.entries,
    accepted = report.accepted,
    duplicates = report.duplicates,
    filtered = report.filtered,
    invalid = report.invalid,
    "source done"
  );
  report
}

fn merge_entry(
  entry: FeedEntry,
  source: &SourceConfig,
  policy: RelevancePolicy,
  aggregate: &mut Aggregate,
  report: &mut SourceReport,
) {
  report.entries += 1;
  if !filter::is_relevant(policy, &entry) {
    report.filtered += 1;
    return;
  }

  let labelled = feed_name(&entry, source);
  let name = labelled.as_deref().or(source.default_name.as_deref());
  let compact = policy == RelevancePolicy::Unfiltered;
  let Some(indicator) = canonical::canonicalize(&entry.value, name, &source.name, compact) else {
    report.invalid += 1;
    return;
  };

  match aggregate.offer(indicator) {
    Merge::Inserted => report.accepted += 1,
    Merge::Duplicate => report.duplicates += 1,
  }
}

/// The feed's own name with the source suffix applied; placeholders count as no name.
fn feed_name(entry: &FeedEntry, source: &SourceConfig) -> Option<String> {
  let name = entry
    .name
    .as_deref()
    .map(str::trim)
    .filter(|n| !canonical::is_placeholder_name(n))?;
  match source.name_suffix.as_deref().map(str::trim) {
    Some(suffix) if !suffix.is_empty() => Some(format!("{name} {suffix}")),
    _ => Some(name.to_string()),
  }
}
