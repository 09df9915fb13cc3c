use serde::Deserialize;

use crate::error::Result;

#[derive(Debug, PartialEq, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
}

/// Buffer layer tuning knobs. The embedding system loads these once at
/// startup and hands the values down to the replacer and page table
/// constructors.
#[derive(Debug, PartialEq, Deserialize)]
pub struct Config {
    pub log_level: LogLevel,
    /// Number of frames in the buffer pool, i.e. the replacer capacity.
    pub pool_frames: usize,
    /// The k in LRU-k.
    pub replacer_k: usize,
    /// Max number of entries per hash table bucket.
    pub bucket_size: usize,
}

impl Config {
    pub fn new(file: &str) -> Result<Config> {
        let mut cfg = config::Config::builder()
            .set_default("log_level", "debug")?
            .set_default("pool_frames", 64)?
            .set_default("replacer_k", 2)?
            .set_default("bucket_size", 8)?;
        if !file.is_empty() {
            cfg = cfg.add_source(config::File::with_name(file))
        }
        cfg = cfg.add_source(config::Environment::with_prefix("BUFPOOL"));
        Ok(cfg.build()?.try_deserialize()?)
    }
}
