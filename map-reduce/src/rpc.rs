//! Wire types and the RPC service spoken between workers and the coordinator.
//!
//! Transport is tarpc with the JSON serde codec over loopback TCP. A worker
//! holds one client and keeps at most one call outstanding; any transport
//! error means the coordinator is gone.

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tarpc::{client, tokio_serde::formats::Json};
use tokio::net::ToSocketAddrs;

#[tarpc::service]
pub trait TaskService {
    /// Ask for the next unit of work.
    async fn request_task() -> RequestReply;
    /// Report a finished task. Late and duplicate reports are accepted as no-ops.
    async fn report_task_done(report: Report) -> ReportReply;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Map,
    Reduce,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Phase {
    Mapping,
    Reducing,
    Done,
}

/// Descriptor of an assigned task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub kind: TaskKind,
    pub id: usize,
    /// The input document of a map task, or the intermediate files of a
    /// reduce task's partition.
    pub files: Vec<PathBuf>,
    pub state: TaskState,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Assignment {
    Task(Task),
    /// Nothing is idle right now but the job is not finished.
    Wait,
    Exit,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestReply {
    pub assignment: Assignment,
    pub nmap: usize,
    pub nreduce: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub id: usize,
    pub kind: TaskKind,
    pub state: TaskState,
    /// Intermediate files written by a map task, indexed by partition.
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportReply {
    /// False when the report changed nothing.
    pub accepted: bool,
}

impl Report {
    pub fn completed(task: &Task, files: Vec<PathBuf>) -> Self {
        Self {
            id: task.id,
            kind: task.kind,
            state: TaskState::Completed,
            files,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Map => write!(f, "map"),
            TaskKind::Reduce => write!(f, "reduce"),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} task {} ({} files)", self.kind, self.id, self.files.len())
    }
}

impl fmt::Display for RequestReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.assignment {
            Assignment::Task(t) => write!(f, "{}, nmap: {}, nreduce: {}", t, self.nmap, self.nreduce),
            Assignment::Wait => write!(f, "wait"),
            Assignment::Exit => write!(f, "exit"),
        }
    }
}

/// Connect to the coordinator listening on `addr`.
pub async fn connect<A: ToSocketAddrs>(addr: A) -> io::Result<TaskServiceClient> {
    let transport = tarpc::serde_transport::tcp::connect(addr, Json::default).await?;
    Ok(TaskServiceClient::new(client::Config::default(), transport).spawn())
}
