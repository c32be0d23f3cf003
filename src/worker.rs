//! Background thread that owns the store and the capture surface.
//!
//! The UI submits one job at a time and keeps its controls disabled until
//! the matching event has been received.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::capture::{self, CaptureSurface, RetryPolicy, Sleeper};
use crate::error::{CaptureError, StoreError};
use crate::model::Collection;
use crate::session::{Capture, PersistRequest};
use crate::store::PersistenceGateway;

#[derive(Debug)]
pub enum Job {
    Load,
    Capture,
    Persist(PersistRequest),
}

impl Job {
    fn name(&self) -> &'static str {
        match self {
            Job::Load => "load",
            Job::Capture => "capture",
            Job::Persist(_) => "persist",
        }
    }
}

#[derive(Debug)]
pub enum Event {
    Loaded(Result<Collection, StoreError>),
    Captured(Result<Capture, CaptureError>),
    Persisted(Result<Collection, StoreError>),
}

pub struct Worker {
    jobs: Sender<Job>,
    events: Receiver<Event>,
    busy: bool,
}

impl Worker {
    /// `notify` runs after every event is sent, e.g. to wake the UI. Dropping
    /// the worker closes the job channel, which ends the thread once the
    /// current job is done.
    pub fn spawn<G, S>(
        gateway: G,
        mut surface: S,
        sleeper: Box<dyn Sleeper + Send>,
        policy: RetryPolicy,
        notify: impl Fn() + Send + 'static,
    ) -> std::io::Result<Self>
    where
        G: PersistenceGateway + Send + 'static,
        S: CaptureSurface + Send + 'static,
    {
        let (jobs, job_rx) = mpsc::channel::<Job>();
        let (event_tx, events) = mpsc::channel();
        std::thread::Builder::new()
            .name("store-worker".into())
            .spawn(move || {
                for job in job_rx {
                    debug!(job = job.name(), "job received");
                    let event = match job {
                        Job::Load => Event::Loaded(gateway.load_collection()),
                        Job::Capture => Event::Captured(capture::capture(
                            &mut surface,
                            policy,
                            sleeper.as_ref(),
                        )),
                        Job::Persist(request) => Event::Persisted(
                            gateway.persist(&request.snapshot, request.fetch_image),
                        ),
                    };
                    if event_tx.send(event).is_err() {
                        break;
                    }
                    notify();
                }
                debug!("worker stopped");
            })?;
        Ok(Self {
            jobs,
            events,
            busy: false,
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Returns false if a job is already outstanding or the worker is gone.
    pub fn submit(&mut self, job: Job) -> bool {
        if self.busy {
            warn!(job = job.name(), "worker busy, job dropped");
            return false;
        }
        if self.jobs.send(job).is_err() {
            error!("worker thread has stopped");
            return false;
        }
        self.busy = true;
        true
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        match self.events.try_recv() {
            Ok(event) => {
                self.busy = false;
                Some(event)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.busy = false;
                None
            }
        }
    }

    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<Event> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => {
                self.busy = false;
                Some(event)
            }
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.busy = false;
                None
            }
        }
    }
}
