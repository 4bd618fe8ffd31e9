//! Spill Queue: bounded-memory safety valve. Durable overflow for URLs that
//! cannot fit into the bounded work-stealing deques.
//!
//! Sharded by `hash(url) mod 16`. Each shard is an append-only text file,
//! one URL per line; `load` drains lines from each shard up to a budget and
//! truncates any shard it fully drains. Disabled in "fresh" mode.

use std::collections::hash_map::DefaultHasher;
use std::fs::{self, File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SHARD_COUNT: usize = 16;

pub struct SpillQueue {
    dir: PathBuf,
    enabled: bool,
    locks: Vec<Mutex<()>>,
}

fn shard_index(url: &str) -> usize {
    let mut hasher = DefaultHasher::new();
    url.hash(&mut hasher);
    (hasher.finish() as usize) % SHARD_COUNT
}

impl SpillQueue {
    pub fn new(dir: impl Into<PathBuf>, enabled: bool) -> io::Result<Self> {
        let dir = dir.into();
        if enabled {
            fs::create_dir_all(&dir)?;
        }
        let locks = (0..SHARD_COUNT).map(|_| Mutex::new(())).collect();
        Ok(Self { dir, enabled, locks })
    }

    fn shard_path(&self, idx: usize) -> PathBuf {
        self.dir.join(format!("shard_{:02}.txt", idx))
    }

    /// Distributes `urls` across shards and appends each to its shard file.
    /// A no-op in fresh mode.
    pub fn save(&self, urls: &[String]) -> io::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let mut by_shard: Vec<Vec<&String>> = (0..SHARD_COUNT).map(|_| Vec::new()).collect();
        for url in urls {
            by_shard[shard_index(url)].push(url);
        }
        for (idx, group) in by_shard.into_iter().enumerate() {
            if group.is_empty() {
                continue;
            }
            let _guard = self.locks[idx].lock().unwrap();
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.shard_path(idx))?;
            for url in group {
                writeln!(file, "{}", url)?;
            }
        }
        Ok(())
    }

    /// Returns up to `max_count` URLs drawn across shards, truncating any
    /// shard fully drained by the read.
    pub fn load(&self, max_count: usize) -> io::Result<Vec<String>> {
        if !self.enabled {
            return Ok(Vec::new());
        }
        let mut result = Vec::new();
        for idx in 0..SHARD_COUNT {
            if result.len() >= max_count {
                break;
            }
            let _guard = self.locks[idx].lock().unwrap();
            let path = self.shard_path(idx);
            let Ok(file) = File::open(&path) else {
                continue;
            };
            let lines: Vec<String> = BufReader::new(file)
                .lines()
                .collect::<io::Result<Vec<_>>>()?;
            if lines.is_empty() {
                continue;
            }

            let remaining_budget = max_count - result.len();
            if lines.len() <= remaining_budget {
                result.extend(lines);
                truncate(&path)?;
            } else {
                let (taken, kept) = lines.split_at(remaining_budget);
                result.extend(taken.iter().cloned());
                rewrite(&path, kept)?;
            }
        }
        Ok(result)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

fn truncate(path: &Path) -> io::Result<()> {
    File::create(path)?;
    Ok(())
}

fn rewrite(path: &Path, lines: &[String]) -> io::Result<()> {
    let mut file = File::create(path)?;
    for line in lines {
        writeln!(file, "{}", line)?;
    }
    Ok(())
}
