use std::fs;
use std::hash::Hasher;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub mod app;
mod coordinator;
mod registry;
pub mod rpc;
mod worker;

pub use coordinator::{Config, Coordinator};
pub use registry::Registry;
pub use rpc::{Assignment, Phase, Report, ReportReply, RequestReply, Task, TaskKind, TaskState};
pub use worker::{run_map, run_reduce, Worker};

/// Signature of a map function: document name and content to intermediate pairs.
pub type MapFn = fn(&Path, &str) -> Vec<KeyValue>;

/// Signature of a reduce function: one key and all of its values to one output value.
pub type ReduceFn = fn(&str, &[String]) -> String;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Non-negative 32-bit FNV hash of `key`. Use `ihash(key) % nreduce` to pick
/// the reduce partition of an intermediate pair.
pub fn ihash(key: &str) -> u32 {
    let mut hasher = fnv::FnvHasher::default();
    hasher.write(key.as_bytes());
    (hasher.finish() as u32) & 0x7fff_ffff
}

/// Partition index of `key` among `nreduce` reduce tasks.
pub fn partition(key: &str, nreduce: usize) -> usize {
    ihash(key) as usize % nreduce
}

/// Intermediate file written by map task `map_id` for partition `reduce_id`.
pub fn intermediate_path(dir: &Path, map_id: usize, reduce_id: usize) -> PathBuf {
    dir.join(format!("mr-{}-{}", map_id, reduce_id))
}

/// Final output file of reduce task `reduce_id`.
pub fn output_path(dir: &Path, reduce_id: usize) -> PathBuf {
    dir.join(format!("mr-out-{}", reduce_id))
}

/// Regular files in `dir` whose name ends with `ext`, sorted by name.
pub fn input_files(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("unable to read {}", dir.display()))? {
        let path = entry?.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.ends_with(ext));
        if path.is_file() && matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ihash_stable_and_non_negative() {
        for key in ["", "hello", "world", "go", "a much longer key with spaces"] {
            let h = ihash(key);
            assert_eq!(h, ihash(key));
            assert!(h <= 0x7fff_ffff);
        }
        assert_ne!(ihash("hello"), ihash("world"));
    }

    #[test]
    fn test_partition_in_range() {
        for n in 1..8 {
            for key in ["a", "b", "hello", "zebra", "42"] {
                let p = partition(key, n);
                assert!(p < n);
                assert_eq!(p, partition(key, n));
            }
        }
        assert_eq!(partition("anything", 1), 0);
    }

    #[test]
    fn test_file_names() {
        let dir = Path::new("/tmp/job");
        assert_eq!(intermediate_path(dir, 3, 1), PathBuf::from("/tmp/job/mr-3-1"));
        assert_eq!(output_path(dir, 7), PathBuf::from("/tmp/job/mr-out-7"));
    }

    #[test]
    fn test_input_files() {
        let dir = TempDir::new().unwrap();
        for name in ["b.json", "a.json", "notes.txt"] {
            fs::write(dir.path().join(name), "{}").unwrap();
        }
        fs::create_dir(dir.path().join("sub.json")).unwrap();

        let files = input_files(dir.path(), ".json").unwrap();
        assert_eq!(files, vec![dir.path().join("a.json"), dir.path().join("b.json")]);
        assert!(input_files(&dir.path().join("missing"), ".json").is_err());
    }
}
