//! One-shot background jobs
//!
//! Long blocking work (loading a native library, a download) runs on its own
//! thread and reports back with exactly one [`Event::JobResult`]. At most one
//! job per identity is in flight.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use weblobby_core::prelude::*;
use weblobby_core::{Event, EventPoster, JobOutcome};

/// Cooperative cancellation flag handed to every job
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Caller's view of a started job
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: String,
    cancel: CancelToken,
}

impl JobHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Ask the job to stop. The job still posts its result.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

struct JobSlot {
    kind: String,
    cancel: CancelToken,
    /// Set by the job thread just before it posts the result
    done: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl JobSlot {
    fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

/// Starts jobs and tracks their threads.
///
/// Dropping the runner cancels every job and joins its thread.
pub struct JobRunner {
    events: EventPoster,
    jobs: HashMap<String, JobSlot>,
}

impl std::fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRunner")
            .field("jobs", &self.jobs.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl JobRunner {
    pub fn new(events: EventPoster) -> Self {
        Self {
            events,
            jobs: HashMap::new(),
        }
    }

    /// Run `work` on a new thread; its return value becomes the outcome of
    /// the `JobResult{id, kind, outcome}` event. A panic becomes an `Err`
    /// outcome.
    ///
    /// # Errors
    ///
    /// [`Error::NotReady`] if a job with this `id` is still running.
    /// [`Error::Io`] if the thread cannot be created.
    pub fn start<F>(&mut self, id: &str, kind: &str, work: F) -> Result<JobHandle>
    where
        F: FnOnce(&CancelToken) -> JobOutcome + Send + 'static,
    {
        if self.is_running(id) {
            return Err(Error::not_ready(id));
        }
        // A finished job whose result was not handled yet
        self.reap(id);

        let cancel = CancelToken::new();
        let done = Arc::new(AtomicBool::new(false));
        let thread = {
            let events = self.events.clone();
            let cancel = cancel.clone();
            let done = Arc::clone(&done);
            let job_id = id.to_string();
            let job_kind = kind.to_string();
            thread::Builder::new()
                .name(format!("weblobby-job-{id}"))
                .spawn(move || {
                    debug!("job {} ({}) started", job_id, job_kind);
                    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| work(&cancel))) {
                        Ok(outcome) => outcome,
                        Err(payload) => Err(panic_message(payload.as_ref())),
                    };
                    if let Err(reason) = &outcome {
                        info!("job {} failed: {}", job_id, reason);
                    }
                    done.store(true, Ordering::Release);
                    events.post(Event::JobResult {
                        job_id,
                        kind: job_kind,
                        outcome,
                    });
                })?
        };

        self.jobs.insert(
            id.to_string(),
            JobSlot {
                kind: kind.to_string(),
                cancel: cancel.clone(),
                done,
                thread,
            },
        );

        Ok(JobHandle {
            id: id.to_string(),
            cancel,
        })
    }

    /// A job is running until it has produced its outcome.
    pub fn is_running(&self, id: &str) -> bool {
        self.jobs.get(id).is_some_and(|slot| !slot.is_done())
    }

    /// Request cancellation. Returns `false` for an unknown id.
    pub fn cancel(&self, id: &str) -> bool {
        match self.jobs.get(id) {
            Some(slot) => {
                debug!("cancelling job {} ({})", id, slot.kind);
                slot.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Consumer-side bookkeeping for a `JobResult` event: join the finished
    /// thread and free the identity.
    pub fn handle_result(&mut self, id: &str) -> bool {
        self.reap(id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn reap(&mut self, id: &str) -> bool {
        if !self.jobs.get(id).is_some_and(JobSlot::is_done) {
            return false;
        }
        // Only the event post remains on that thread
        if let Some(slot) = self.jobs.remove(id) {
            if slot.thread.join().is_err() {
                error!("job thread {} panicked outside the job", id);
            }
        }
        true
    }
}

impl Drop for JobRunner {
    fn drop(&mut self) {
        for slot in self.jobs.values() {
            slot.cancel.cancel();
        }
        for (id, slot) in self.jobs.drain() {
            if slot.thread.join().is_err() {
                error!("job thread {} panicked outside the job", id);
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("job panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("job panicked: {s}")
    } else {
        "job panicked".to_string()
    }
}
