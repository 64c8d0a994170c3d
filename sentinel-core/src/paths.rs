use std::path::{Path, PathBuf};

pub const SHARD_COUNT: u8 = 16;

pub fn default_config_path() -> PathBuf {
  PathBuf::from("sentinel.toml")
}

pub fn shard_path(shard_dir: &Path, nibble: u8) -> PathBuf {
  shard_dir.join(format!("shard_{nibble:x}.json"))
}

pub fn log_file_prefix() -> &'static str {
  "sentinel-compiler.log"
}
