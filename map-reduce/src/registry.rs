use std::path::PathBuf;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};

use crate::rpc::{Task, TaskKind, TaskState};

#[derive(Debug, Clone)]
struct Record {
    id: usize,
    kind: TaskKind,
    state: TaskState,
    files: Vec<PathBuf>,
    // Intermediate files reported by a completed map task, indexed by partition.
    outputs: Vec<PathBuf>,
    assigned_at: Option<Instant>,
}

impl Record {
    fn new(id: usize, kind: TaskKind, files: Vec<PathBuf>) -> Self {
        Self {
            id,
            kind,
            state: TaskState::Idle,
            files,
            outputs: Vec::new(),
            assigned_at: None,
        }
    }

    fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        self.state == TaskState::InProgress
            && self
                .assigned_at
                .and_then(|at| now.checked_duration_since(at))
                .map_or(false, |dt| dt > timeout)
    }

    fn to_task(&self) -> Task {
        Task {
            kind: self.kind,
            id: self.id,
            files: self.files.clone(),
            state: self.state,
        }
    }
}

/// The canonical set of map and reduce tasks.
///
/// Task numbers are positions in the per-kind vectors, so every mutation goes
/// through the stored record itself.
#[derive(Debug)]
pub struct Registry {
    maps: Vec<Record>,
    reduces: Vec<Record>,
    timeout: Duration,
}

impl Registry {
    /// One map task per input file and one reduce task per partition.
    pub fn new(files: Vec<PathBuf>, nreduce: usize, timeout: Duration) -> Self {
        let maps = files
            .into_iter()
            .enumerate()
            .map(|(id, f)| Record::new(id, TaskKind::Map, vec![f]))
            .collect();
        let reduces = (0..nreduce)
            .map(|id| Record::new(id, TaskKind::Reduce, Vec::new()))
            .collect();
        Self {
            maps,
            reduces,
            timeout,
        }
    }

    pub fn nmap(&self) -> usize {
        self.maps.len()
    }

    pub fn nreduce(&self) -> usize {
        self.reduces.len()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn tasks(&self, kind: TaskKind) -> &[Record] {
        match kind {
            TaskKind::Map => &self.maps[..],
            TaskKind::Reduce => &self.reduces[..],
        }
    }

    fn tasks_mut(&mut self, kind: TaskKind) -> &mut [Record] {
        match kind {
            TaskKind::Map => &mut self.maps[..],
            TaskKind::Reduce => &mut self.reduces[..],
        }
    }

    /// First task of `kind`, in creation order, that is idle or whose
    /// assignment went stale. The task is marked in progress as of `now`.
    pub fn next_idle(&mut self, kind: TaskKind, now: Instant) -> Option<Task> {
        let timeout = self.timeout;
        let record = self
            .tasks_mut(kind)
            .iter_mut()
            .find(|t| t.state == TaskState::Idle || t.is_stale(now, timeout))?;
        if record.state == TaskState::InProgress {
            warn!("{} task {} timed out, reassigning", record.kind, record.id);
        }
        record.state = TaskState::InProgress;
        record.assigned_at = Some(now);
        trace!("assigned {:?}", record);
        Some(record.to_task())
    }

    /// Return every stale in-progress task to idle. Completed tasks are never touched.
    pub fn reclaim_stale(&mut self, now: Instant) -> usize {
        let timeout = self.timeout;
        let mut reclaimed = 0;
        for record in self.maps.iter_mut().chain(self.reduces.iter_mut()) {
            if record.is_stale(now, timeout) {
                warn!(
                    "{} task {} not reported within {:?}, back to idle",
                    record.kind, record.id, timeout
                );
                record.state = TaskState::Idle;
                record.assigned_at = None;
                reclaimed += 1;
            }
        }
        reclaimed
    }

    /// Mark a task completed. Returns false for unknown or already completed
    /// tasks, which leaves the registry untouched.
    pub fn mark_completed(&mut self, id: usize, kind: TaskKind, outputs: Vec<PathBuf>) -> bool {
        match self.tasks_mut(kind).get_mut(id) {
            None => {
                debug!("report for unknown {} task {}", kind, id);
                false
            }
            Some(record) if record.state == TaskState::Completed => {
                debug!("duplicate report for {} task {}", kind, id);
                false
            }
            Some(record) => {
                record.state = TaskState::Completed;
                record.assigned_at = None;
                if kind == TaskKind::Map {
                    record.outputs = outputs;
                }
                true
            }
        }
    }

    pub fn state(&self, kind: TaskKind, id: usize) -> Option<TaskState> {
        self.tasks(kind).get(id).map(|t| t.state)
    }

    pub fn all_completed(&self, kind: TaskKind) -> bool {
        self.tasks(kind)
            .iter()
            .all(|t| t.state == TaskState::Completed)
    }

    pub fn map_phase_done(&self) -> bool {
        self.all_completed(TaskKind::Map)
    }

    /// Give each reduce task the intermediate files the map reports named for
    /// its partition, ordered by map task number.
    pub fn attach_partition_inputs(&mut self) {
        let maps = &self.maps;
        for reduce in self.reduces.iter_mut() {
            reduce.files = maps
                .iter()
                .filter_map(|m| m.outputs.get(reduce.id).cloned())
                .collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn registry(nmap: usize, nreduce: usize) -> Registry {
        let files = (0..nmap).map(|i| PathBuf::from(format!("in-{}.txt", i))).collect();
        Registry::new(files, nreduce, TIMEOUT)
    }

    #[test]
    fn test_new() {
        let r = registry(3, 2);
        assert_eq!(r.nmap(), 3);
        assert_eq!(r.nreduce(), 2);
        assert_eq!(r.state(TaskKind::Map, 2), Some(TaskState::Idle));
        assert_eq!(r.state(TaskKind::Reduce, 1), Some(TaskState::Idle));
        assert_eq!(r.state(TaskKind::Reduce, 2), None);
        assert!(!r.map_phase_done());
    }

    #[test]
    fn test_next_idle_persists_assignment() {
        let mut r = registry(2, 1);
        let now = Instant::now();
        let a = r.next_idle(TaskKind::Map, now).unwrap();
        let b = r.next_idle(TaskKind::Map, now).unwrap();
        assert_eq!(a.id, 0);
        assert_eq!(a.files, vec![PathBuf::from("in-0.txt")]);
        assert_eq!(a.state, TaskState::InProgress);
        assert_eq!(b.id, 1);
        assert!(r.next_idle(TaskKind::Map, now).is_none());
        assert_eq!(r.state(TaskKind::Map, 0), Some(TaskState::InProgress));
    }

    #[test]
    fn test_stale_task_is_handed_out_again() {
        let mut r = registry(1, 1);
        let start = Instant::now();
        assert_eq!(r.next_idle(TaskKind::Map, start).unwrap().id, 0);
        assert!(r.next_idle(TaskKind::Map, start + Duration::from_secs(5)).is_none());
        let again = r.next_idle(TaskKind::Map, start + Duration::from_secs(11)).unwrap();
        assert_eq!(again.id, 0);
        // The new assignment carries a fresh timestamp.
        assert!(r.next_idle(TaskKind::Map, start + Duration::from_secs(12)).is_none());
    }

    #[test]
    fn test_reclaim_stale() {
        let mut r = registry(3, 1);
        let start = Instant::now();
        r.next_idle(TaskKind::Map, start).unwrap();
        r.next_idle(TaskKind::Map, start + Duration::from_secs(8)).unwrap();
        r.next_idle(TaskKind::Map, start).unwrap();
        assert!(r.mark_completed(2, TaskKind::Map, Vec::new()));

        assert_eq!(r.reclaim_stale(start + Duration::from_secs(11)), 1);
        assert_eq!(r.state(TaskKind::Map, 0), Some(TaskState::Idle));
        assert_eq!(r.state(TaskKind::Map, 1), Some(TaskState::InProgress));
        assert_eq!(r.state(TaskKind::Map, 2), Some(TaskState::Completed));

        assert_eq!(r.reclaim_stale(start + Duration::from_secs(60)), 1);
        assert_eq!(r.state(TaskKind::Map, 2), Some(TaskState::Completed));
    }

    #[test]
    fn test_mark_completed() {
        let mut r = registry(2, 1);
        let now = Instant::now();
        r.next_idle(TaskKind::Map, now).unwrap();
        assert!(!r.mark_completed(7, TaskKind::Map, Vec::new()));
        assert!(r.mark_completed(0, TaskKind::Map, Vec::new()));
        assert!(!r.mark_completed(0, TaskKind::Map, Vec::new()));
        assert_eq!(r.state(TaskKind::Map, 0), Some(TaskState::Completed));
        assert!(!r.all_completed(TaskKind::Map));

        // A late report for a task that went back to idle still completes it.
        assert!(r.mark_completed(1, TaskKind::Map, Vec::new()));
        assert!(r.map_phase_done());
        assert!(r.next_idle(TaskKind::Map, now).is_none());
    }

    #[test]
    fn test_attach_partition_inputs() {
        let mut r = registry(2, 2);
        let outputs = |m: usize| {
            (0..2)
                .map(|p| PathBuf::from(format!("mr-{}-{}", m, p)))
                .collect::<Vec<_>>()
        };
        // Completion order does not affect the file order.
        assert!(r.mark_completed(1, TaskKind::Map, outputs(1)));
        assert!(r.mark_completed(0, TaskKind::Map, outputs(0)));
        assert!(!r.mark_completed(0, TaskKind::Map, vec!["other".into()]));
        r.attach_partition_inputs();

        let t = r.next_idle(TaskKind::Reduce, Instant::now()).unwrap();
        assert_eq!(t.id, 0);
        assert_eq!(
            t.files,
            vec![PathBuf::from("mr-0-0"), PathBuf::from("mr-1-0")]
        );
    }

    #[test]
    fn test_empty_input() {
        let r = registry(0, 3);
        assert!(r.map_phase_done());
        assert!(!r.all_completed(TaskKind::Reduce));
    }
}
