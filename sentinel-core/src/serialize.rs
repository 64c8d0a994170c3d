use crate::config::OutputConfig;
use crate::paths::{self, SHARD_COUNT};
use crate::types::{Indicator, Sha256Hex};
use anyhow::Context;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct WrittenFile {
  pub path: PathBuf,
  pub records: usize,
  pub bytes: usize,
  pub sha256: String,
}

/// Records in ascending hash order. Stable ordering keeps diffs between runs small and
/// compresses better downstream.
pub fn sorted_records(records: &BTreeMap<Sha256Hex, Indicator>) -> Vec<&Indicator> {
  let mut out: Vec<&Indicator> = records.values().collect();
  out.sort_by(|a, b| a.hash.cmp(&b.hash));
  out
}

/// Compact JSON array, no incidental whitespace.
pub fn to_compact_json(records: &[&Indicator]) -> anyhow::Result<Vec<u8>> {
  serde_json::to_vec(records).context("serialize signature records")
}

/// Splits sorted records into 16 buckets by leading hex digit; bucket order is preserved.
pub fn shard<'a>(records: &[&'a Indicator]) -> Vec<Vec<&'a Indicator>> {
  let mut buckets: Vec<Vec<&Indicator>> = (0..SHARD_COUNT).map(|_| Vec::new()).collect();
  for rec in records {
    buckets[usize::from(rec.hash.shard_nibble())].push(rec);
  }
  buckets
}

/// Writes the artifact(s) selected by `output.mode`. Any IO failure here is fatal for
/// the run.
pub fn write_artifacts(
  records: &BTreeMap<Sha256Hex, Indicator>,
  output: &OutputConfig,
) -> anyhow::Result<Vec<WrittenFile>> {
  let sorted = sorted_records(records);
  let mut written = Vec::new();

  if output.mode.writes_single() {
    written.push(write_records(&output.path, &sorted)?);
  }

  if output.mode.writes_shards() {
    fs::create_dir_all(&output.shard_dir)
      .with_context(|| format!("create {}", output.shard_dir.display()))?;
    for (nibble, bucket) in shard(&sorted).iter().enumerate() {
      let path = paths::shard_path(&output.shard_dir, nibble as u8);
      written.push(write_records(&path, bucket)?);
    }
  }

  Ok(written)
}

fn write_records(path: &Path, records: &[&Indicator]) -> anyhow::Result<WrittenFile> {
  let bytes = to_compact_json(records)?;
  atomic_write_file(path, &bytes)?;
  Ok(WrittenFile {
    path: path.to_path_buf(),
    records: records.len(),
    bytes: bytes.len(),
    sha256: format!("{:x}", Sha256::digest(&bytes)),
  })
}

pub fn atomic_write_file(dst: &Path, bytes: &[u8]) -> anyhow::Result<()> {
  let dir = match dst.parent() {
    Some(p) if !p.as_os_str().is_empty() => p,
    _ => Path::new("."),
  };
  fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;

  let tmp = tmp_path(dst);
  fs::write(&tmp, bytes).with_context(|| format!("write {}", tmp.display()))?;
  fs::rename(&tmp, dst).with_context(|| format!("rename {} -> {}", tmp.display(), dst.display()))?;
  Ok(())
}

fn tmp_path(dst: &Path) -> PathBuf {
  let name = dst.file_name().and_then(|s| s.to_str()).unwrap_or("tmp");
  dst.with_file_name(format!(".{name}.tmp"))
}
