use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use atomicwrites::{AllowOverwrite, AtomicFile};
use log::{debug, info, trace, warn};
use tarpc::context;

use crate::rpc::{self, Assignment, Report, Task, TaskKind};
use crate::{intermediate_path, output_path, partition, KeyValue, MapFn, ReduceFn};

/// A worker process: asks for tasks until told to exit or the coordinator
/// becomes unreachable.
pub struct Worker {
    /// Shared directory for intermediate and output files.
    pub dir: PathBuf,
    /// Address of the coordinator, e.g. `127.0.0.1:1234`.
    pub server: String,
    /// Pause before asking again after a `Wait` reply.
    pub backoff: Duration,
    pub map: MapFn,
    pub reduce: ReduceFn,
}

impl Worker {
    /// Runs until the job is over. Transport failures end the loop cleanly;
    /// file errors are returned.
    pub async fn launch(&self) -> Result<()> {
        let client = match rpc::connect(self.server.as_str()).await {
            Ok(client) => client,
            Err(e) => {
                info!("coordinator {} unreachable ({}), exiting", self.server, e);
                return Ok(());
            }
        };

        loop {
            let reply = match client.request_task(context::current()).await {
                Ok(reply) => reply,
                Err(e) => {
                    info!("coordinator gone ({}), exiting", e);
                    return Ok(());
                }
            };
            trace!("got {}", reply);

            let task = match reply.assignment {
                Assignment::Exit => {
                    info!("job done, exiting");
                    return Ok(());
                }
                Assignment::Wait => {
                    tokio::time::sleep(self.backoff).await;
                    continue;
                }
                Assignment::Task(task) => task,
            };

            info!("running {}", task);
            let report = self.execute(task, reply.nmap, reply.nreduce).await?;
            if let Err(e) = client.report_task_done(context::current(), report).await {
                info!("coordinator gone ({}), exiting", e);
                return Ok(());
            }
        }
    }

    async fn execute(&self, task: Task, nmap: usize, nreduce: usize) -> Result<Report> {
        let dir = self.dir.clone();
        let (map, reduce) = (self.map, self.reduce);
        tokio::task::spawn_blocking(move || {
            let files = match task.kind {
                TaskKind::Map => run_map(&dir, &task, nreduce, map)?,
                TaskKind::Reduce => vec![run_reduce(&dir, &task, nmap, reduce)?],
            };
            Ok::<_, anyhow::Error>(Report::completed(&task, files))
        })
        .await?
    }
}

/// Run map task `task` over its input document and write one key-sorted
/// intermediate file per partition into `dir`, empty partitions included.
/// Returns the written files indexed by partition.
pub fn run_map(dir: &Path, task: &Task, nreduce: usize, map: MapFn) -> Result<Vec<PathBuf>> {
    let input = task
        .files
        .first()
        .with_context(|| format!("map task {} has no input file", task.id))?;
    let contents = fs::read_to_string(input)
        .with_context(|| format!("unable to read {}", input.display()))?;

    let mut buckets = vec![Vec::<KeyValue>::new(); nreduce];
    for kv in map(input, &contents) {
        let r = partition(&kv.key, nreduce);
        buckets[r].push(kv);
    }

    let mut files = Vec::with_capacity(nreduce);
    for (r, mut bucket) in buckets.into_iter().enumerate() {
        bucket.sort_by(|a, b| a.key.cmp(&b.key));
        let mut s = String::new();
        for kv in bucket.iter() {
            s.push_str(&serde_json::to_string(kv)?);
            s.push('\n');
        }
        let path = intermediate_path(dir, task.id, r);
        write_atomic(&path, &s)?;
        trace!("wrote {} pairs to {:?}", bucket.len(), path);
        files.push(path);
    }
    debug!("map task {} wrote {} partitions", task.id, nreduce);
    Ok(files)
}

/// Run reduce task `task`: merge the partition's intermediate files, reduce
/// every key in sorted order and write `mr-out-<id>` into `dir`.
pub fn run_reduce(dir: &Path, task: &Task, nmap: usize, reduce: ReduceFn) -> Result<PathBuf> {
    let inputs: Vec<PathBuf> = if task.files.is_empty() {
        (0..nmap)
            .map(|m| intermediate_path(dir, m, task.id))
            .collect()
    } else {
        task.files.clone()
    };

    let mut groups = BTreeMap::<String, Vec<String>>::new();
    for path in inputs.iter() {
        let f = File::open(path).with_context(|| format!("unable to open {}", path.display()))?;
        for (i, line) in BufReader::new(f).lines().enumerate() {
            let line = line.with_context(|| format!("unable to read {}", path.display()))?;
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<KeyValue>(&line) {
                Ok(kv) => groups.entry(kv.key).or_default().push(kv.value),
                Err(e) => warn!("{}:{}: skipping malformed line: {}", path.display(), i + 1, e),
            }
        }
    }

    let mut s = String::new();
    for (k, vs) in groups.iter() {
        s.push_str(&format!("{} {}\n", k, reduce(k, vs)));
    }
    let path = output_path(dir, task.id);
    write_atomic(&path, &s)?;
    debug!(
        "reduce task {} wrote {} keys to {:?}",
        task.id,
        groups.len(),
        path
    );
    Ok(path)
}

/// Readers never observe a partially written file, even when a re-executed
/// task overwrites it.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    AtomicFile::new(path, AllowOverwrite)
        .write(|f| f.write_all(contents.as_bytes()))
        .with_context(|| format!("unable to write {}", path.display()))
}
