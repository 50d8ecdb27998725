//! Single-writer job coordination over a bounded thread pool.
//!
//! The engines are synchronous and assume nothing else mutates the
//! repository while they run. The coordinator enforces that: at most one
//! repository-mutating job exists at a time, and a second submission is
//! rejected immediately instead of queued. Queueing would let a host that
//! snapshots on a timer build an unbounded backlog of identical work.
//! Read and config-write jobs share the bounded pool without mutual
//! exclusion, against each other or against the active write.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use worldkeeper_core::hooks::{MessageSink, Severity};

use crate::error::RuntimeError;

/// What a job is allowed to touch. Only `Write` locks anything; the other
/// classes are admission metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockClass {
    /// Read-only work; runs without coordination.
    None,
    /// Mutates configuration files only; not serialized.
    ConfigWrite,
    /// Mutates the repository or the working tree.
    Write,
}

impl fmt::Display for LockClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockClass::None => write!(f, "read"),
            LockClass::ConfigWrite => write!(f, "configuration"),
            LockClass::Write => write!(f, "backup"),
        }
    }
}

/// Pool sizing. Backup jobs are I/O-bound and serialized anyway, so the
/// defaults stay small.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub worker_threads: usize,
    pub max_blocking_threads: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            max_blocking_threads: 4,
        }
    }
}

/// Handle to a submitted job.
pub struct TaskHandle<T> {
    inner: JoinHandle<T>,
    handle: Handle,
}

impl<T> TaskHandle<T> {
    /// Await the job from async context.
    pub async fn join(self) -> Result<T, RuntimeError> {
        self.inner.await.map_err(|e| RuntimeError::Join(e.to_string()))
    }

    /// Block the calling (non-runtime) thread until the job finishes.
    pub fn join_blocking(self) -> Result<T, RuntimeError> {
        let Self { inner, handle } = self;
        handle
            .block_on(inner)
            .map_err(|e| RuntimeError::Join(e.to_string()))
    }
}

pub struct Coordinator {
    runtime: Runtime,
    write_slot: Arc<Semaphore>,
}

impl Coordinator {
    pub fn new(settings: &RuntimeSettings) -> Result<Self, RuntimeError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(settings.worker_threads.max(1))
            .max_blocking_threads(settings.max_blocking_threads.max(1))
            .thread_name("worldkeeper")
            .enable_all()
            .build()
            .map_err(RuntimeError::Build)?;
        Ok(Self {
            runtime,
            write_slot: Arc::new(Semaphore::new(1)),
        })
    }

    /// Submit a blocking job under the given lock class.
    ///
    /// A `Write` job returns [`RuntimeError::Busy`] without queueing when the
    /// write slot is taken; the slot is released when the job finishes,
    /// success or not. Other classes are admitted unconditionally.
    pub fn submit<T, F>(&self, class: LockClass, job: F) -> Result<TaskHandle<T>, RuntimeError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let permit = match class {
            LockClass::None | LockClass::ConfigWrite => None,
            LockClass::Write => Some(
                self.write_slot
                    .clone()
                    .try_acquire_owned()
                    .map_err(|_| RuntimeError::Busy(class))?,
            ),
        };

        let inner = self.runtime.spawn_blocking(move || {
            let _permit = permit;
            job()
        });
        Ok(TaskHandle {
            inner,
            handle: self.runtime.handle().clone(),
        })
    }

    /// Like [`submit`](Self::submit), but a busy slot becomes a sink notice
    /// instead of an error. `what` names the rejected operation.
    pub fn submit_or_notify<T, F>(
        &self,
        class: LockClass,
        sink: &dyn MessageSink,
        what: &str,
        job: F,
    ) -> Option<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        match self.submit(class, job) {
            Ok(handle) => Some(handle),
            Err(RuntimeError::Busy(class)) => {
                tracing::info!(operation = what, %class, "rejected submission, slot busy");
                sink.styled(
                    Severity::Warning,
                    &format!("{what} skipped: a {class} operation is already running"),
                );
                None
            }
            Err(other) => {
                tracing::error!(operation = what, error = %other, "submission failed");
                sink.styled(Severity::Error, &format!("{what} could not be started"));
                None
            }
        }
    }

    /// Wait up to `timeout` for in-flight mutating jobs, then stop the pool.
    ///
    /// Jobs still running after the timeout are abandoned; the engines leave
    /// the repository consistent at every step, so the worst case is a stale
    /// lock the next maintenance pass clears.
    pub fn shutdown(self, timeout: Duration) {
        let Self { runtime, write_slot } = self;

        let drained = runtime.block_on(async {
            tokio::time::timeout(timeout, async {
                let _write = write_slot.acquire().await;
            })
            .await
            .is_ok()
        });
        if !drained {
            tracing::warn!("shutdown timeout elapsed with jobs still running");
        }
        runtime.shutdown_timeout(timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn coordinator() -> Coordinator {
        Coordinator::new(&RuntimeSettings::default()).expect("runtime")
    }

    #[test]
    fn write_jobs_are_mutually_exclusive() {
        let coordinator = coordinator();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel::<()>();

        let first = coordinator
            .submit(LockClass::Write, move || {
                started_tx.send(()).expect("signal start");
                release_rx.recv().expect("hold until released");
                1
            })
            .expect("first submission");
        started_rx.recv().expect("first job running");

        let second = coordinator.submit(LockClass::Write, || 2);
        assert!(matches!(second, Err(RuntimeError::Busy(LockClass::Write))));

        release_tx.send(()).expect("release");
        assert_eq!(first.join_blocking().expect("join"), 1);

        // The slot frees once the first job completes.
        let third = coordinator.submit(LockClass::Write, || 3).expect("resubmit");
        assert_eq!(third.join_blocking().expect("join"), 3);
    }

    #[test]
    fn lock_classes_do_not_contend_with_each_other() {
        let coordinator = coordinator();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel::<()>();

        let write = coordinator
            .submit(LockClass::Write, move || {
                started_tx.send(()).expect("signal start");
                release_rx.recv().expect("hold");
            })
            .expect("write job");
        started_rx.recv().expect("write running");

        let read = coordinator.submit(LockClass::None, || "read").expect("read job");
        let config = coordinator
            .submit(LockClass::ConfigWrite, || "config")
            .expect("config job");

        assert_eq!(read.join_blocking().expect("join"), "read");
        assert_eq!(config.join_blocking().expect("join"), "config");

        release_tx.send(()).expect("release");
        write.join_blocking().expect("join");
    }

    #[test]
    fn concurrent_config_writes_both_run() {
        let coordinator = coordinator();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel::<()>();

        let first = coordinator
            .submit(LockClass::ConfigWrite, move || {
                started_tx.send(()).expect("signal start");
                release_rx.recv().expect("hold");
                "first"
            })
            .expect("first config job");
        started_rx.recv().expect("first running");

        // Config writes are not serialized against each other.
        let second = coordinator
            .submit(LockClass::ConfigWrite, || "second")
            .expect("second config job admitted while the first still runs");
        assert_eq!(second.join_blocking().expect("join"), "second");

        release_tx.send(()).expect("release");
        assert_eq!(first.join_blocking().expect("join"), "first");
    }

    #[test]
    fn busy_rejection_is_immediate_not_queued() {
        let coordinator = coordinator();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel::<()>();

        let first = coordinator
            .submit(LockClass::Write, move || {
                started_tx.send(()).expect("signal start");
                release_rx.recv().expect("hold");
            })
            .expect("first");
        started_rx.recv().expect("running");

        let before = std::time::Instant::now();
        let rejected = coordinator.submit(LockClass::Write, || ());
        assert!(rejected.is_err());
        assert!(
            before.elapsed() < Duration::from_millis(100),
            "rejection must not wait for the running job"
        );

        release_tx.send(()).expect("release");
        first.join_blocking().expect("join");
    }

    #[test]
    fn panicking_job_frees_the_slot() {
        let coordinator = coordinator();
        let handle = coordinator
            .submit(LockClass::Write, || panic!("job panic"))
            .expect("submit");
        assert!(matches!(handle.join_blocking(), Err(RuntimeError::Join(_))));

        let next = coordinator.submit(LockClass::Write, || 7).expect("slot free");
        assert_eq!(next.join_blocking().expect("join"), 7);
    }

    #[test]
    fn shutdown_waits_for_running_write() {
        let coordinator = coordinator();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        coordinator
            .submit(LockClass::Write, move || {
                std::thread::sleep(Duration::from_millis(100));
                done_tx.send(()).expect("report done");
            })
            .expect("submit");

        coordinator.shutdown(Duration::from_secs(5));
        done_rx
            .try_recv()
            .expect("job must have finished before shutdown returned");
    }
}
