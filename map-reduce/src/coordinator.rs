use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{ensure, Context, Result};
use futures::{future, prelude::*};
use log::{debug, info, warn};
use tarpc::{
    context,
    server::{self, Channel},
    tokio_serde::formats::Json,
};

use crate::registry::Registry;
use crate::rpc::{
    Assignment, Phase, Report, ReportReply, RequestReply, TaskKind, TaskService, TaskState,
};

const DONE_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct Config {
    /// Loopback port to serve workers on.
    pub port: u16,
    /// Input documents, one map task each.
    pub files: Vec<PathBuf>,
    pub nreduce: usize,
    /// Staleness threshold after which an unreported task is handed out again.
    pub timeout: Duration,
    /// How long to keep answering `Exit` once the job is done.
    pub grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 1234,
            files: Vec::new(),
            nreduce: 10,
            timeout: Duration::from_secs(10),
            grace: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
struct State {
    registry: Registry,
    phase: Phase,
}

impl State {
    fn new(registry: Registry) -> Self {
        let mut state = Self {
            registry,
            phase: Phase::Mapping,
        };
        state.advance();
        state
    }

    fn request_task(&mut self, now: Instant) -> RequestReply {
        self.registry.reclaim_stale(now);
        let assignment = match self.phase {
            Phase::Mapping => self.next(TaskKind::Map, now),
            Phase::Reducing => self.next(TaskKind::Reduce, now),
            Phase::Done => Assignment::Exit,
        };
        RequestReply {
            assignment,
            nmap: self.registry.nmap(),
            nreduce: self.registry.nreduce(),
        }
    }

    fn next(&mut self, kind: TaskKind, now: Instant) -> Assignment {
        self.registry
            .next_idle(kind, now)
            .map_or(Assignment::Wait, Assignment::Task)
    }

    fn report(&mut self, report: Report) -> ReportReply {
        if report.state != TaskState::Completed {
            warn!(
                "ignoring {:?} report for {} task {}",
                report.state, report.kind, report.id
            );
            return ReportReply { accepted: false };
        }
        if report.kind == TaskKind::Reduce && self.phase == Phase::Mapping {
            warn!("reduce task {} reported before reduce phase", report.id);
            return ReportReply { accepted: false };
        }
        let accepted = self
            .registry
            .mark_completed(report.id, report.kind, report.files);
        if accepted {
            info!("{} task {} completed", report.kind, report.id);
            self.advance();
        }
        ReportReply { accepted }
    }

    fn advance(&mut self) {
        if self.phase == Phase::Mapping && self.registry.map_phase_done() {
            self.registry.attach_partition_inputs();
            self.phase = Phase::Reducing;
            info!(
                "all {} map tasks completed, reduce phase begins",
                self.registry.nmap()
            );
        }
        if self.phase == Phase::Reducing && self.registry.all_completed(TaskKind::Reduce) {
            self.phase = Phase::Done;
            info!(
                "all {} reduce tasks completed, job done",
                self.registry.nreduce()
            );
        }
    }
}

// Handler cloned into every connection; all of them share one state.
#[derive(Debug, Clone)]
struct TaskServer {
    state: Arc<Mutex<State>>,
}

impl TaskService for TaskServer {
    async fn request_task(self, _: context::Context) -> RequestReply {
        let reply = self.state.lock().unwrap().request_task(Instant::now());
        debug!("request_task: {}", reply);
        reply
    }

    async fn report_task_done(self, _: context::Context, report: Report) -> ReportReply {
        debug!("report_task_done: {:?}", report);
        self.state.lock().unwrap().report(report)
    }
}

/// The central authority of a job: hands out tasks, reclaims stale ones and
/// sequences the map and reduce phases.
pub struct Coordinator {
    addr: SocketAddr,
    grace: Duration,
    state: Arc<Mutex<State>>,
}

impl Coordinator {
    pub fn new(config: Config) -> Result<Self> {
        ensure!(config.nreduce > 0, "nreduce should be non-zero");
        info!(
            "{} map tasks, {} reduce tasks, timeout {:?}",
            config.files.len(),
            config.nreduce,
            config.timeout
        );
        let registry = Registry::new(config.files, config.nreduce, config.timeout);
        Ok(Self {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, config.port)),
            grace: config.grace,
            state: Arc::new(Mutex::new(State::new(registry))),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// True once every reduce task has completed.
    pub fn done(&self) -> bool {
        self.phase() == Phase::Done
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().unwrap().phase
    }

    /// Same as the `request_task` RPC, without the transport.
    pub fn request_task(&self) -> RequestReply {
        self.state.lock().unwrap().request_task(Instant::now())
    }

    /// Same as the `report_task_done` RPC, without the transport.
    pub fn report_task_done(&self, report: Report) -> ReportReply {
        self.state.lock().unwrap().report(report)
    }

    /// Serve workers until the job is done, then keep answering for the grace
    /// period so that polling workers learn to exit.
    pub async fn launch(&self) -> Result<()> {
        let mut listener = tarpc::serde_transport::tcp::listen(&self.addr, Json::default)
            .await
            .with_context(|| format!("unable to listen on {}", self.addr))?;
        listener.config_mut().max_frame_length(usize::MAX);
        info!("coordinator listening on {}", listener.local_addr());

        let handler = TaskServer {
            state: self.state.clone(),
        };
        let incoming = listener
            // Ignore accept errors.
            .filter_map(|r| future::ready(r.map_err(|e| warn!("accept failed: {}", e)).ok()))
            .map(server::BaseChannel::with_defaults)
            .for_each(move |channel| {
                let handler = handler.clone();
                async move {
                    tokio::spawn(channel.execute(handler.serve()).for_each(spawn));
                }
            });

        tokio::select! {
            _ = incoming => warn!("listener closed"),
            _ = self.wait_done() => {}
        }
        Ok(())
    }

    async fn wait_done(&self) {
        while !self.done() {
            tokio::time::sleep(DONE_POLL).await;
        }
        info!("job finished, exiting in {:?}", self.grace);
        tokio::time::sleep(self.grace).await;
    }
}

async fn spawn(fut: impl Future<Output = ()> + Send + 'static) {
    tokio::spawn(fut);
}
