//! Background job table for `&`, `jobs`, `wait`, and `kill`.
//!
//! Background statements run as spawned tasks over a cloned shell state;
//! the table records the task handle, a job id, and the pid observable as
//! `$!`. Handles are shared behind `Arc` so cloned states (subshells) can
//! still list jobs without owning them.

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use crate::interpreter::state::ExecResult;

#[derive(Debug, Clone)]
pub struct Job {
    pub id: usize,
    pub pid: u32,
    pub command: String,
    handle: Arc<Mutex<Option<JoinHandle<ExecResult>>>>,
}

impl Job {
    /// Await completion, returning the captured result. Returns None when
    /// another waiter already consumed the handle.
    pub async fn join(&self) -> Option<ExecResult> {
        let handle = self.handle.lock().ok()?.take()?;
        match handle.await {
            Ok(result) => Some(result),
            Err(_) => Some(ExecResult::new(String::new(), String::new(), 143)),
        }
    }

    pub fn abort(&self) {
        if let Ok(guard) = self.handle.lock() {
            if let Some(handle) = guard.as_ref() {
                handle.abort();
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        match self.handle.lock() {
            Ok(guard) => guard.as_ref().map(|h| h.is_finished()).unwrap_or(true),
            Err(_) => true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobTable {
    jobs: Vec<Job>,
    next_id: usize,
}

impl JobTable {
    /// Register a background task; returns the job. Tasks have no real
    /// process id, so one is synthesized for `$!` and `wait`/`kill`.
    pub fn add(&mut self, handle: JoinHandle<ExecResult>, command: String) -> Job {
        self.next_id += 1;
        let job = Job {
            id: self.next_id,
            pid: 90000 + self.next_id as u32,
            command,
            handle: Arc::new(Mutex::new(Some(handle))),
        };
        self.jobs.push(job.clone());
        job
    }

    pub fn list(&self) -> &[Job] {
        &self.jobs
    }

    pub fn get(&self, id: usize) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn by_pid(&self, pid: u32) -> Option<&Job> {
        self.jobs.iter().find(|j| j.pid == pid)
    }

    pub fn remove(&mut self, id: usize) {
        self.jobs.retain(|j| j.id != id);
    }

    /// Drop entries whose task has completed and been reaped.
    pub fn prune_finished(&mut self) {
        self.jobs.retain(|j| !j.is_finished());
    }

    pub fn take_all(&mut self) -> Vec<Job> {
        std::mem::take(&mut self.jobs)
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
