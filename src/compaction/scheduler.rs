//! Compaction scheduling
//!
//! One background thread per scheduled database, ticking at the interval of
//! its `Schedule`. Every finished run (scheduled or manual) is published on
//! the database's bounded report channel; when nobody drains it, reports are
//! dropped rather than blocking compaction.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use crate::database::Database;
use crate::error::{BlobError, Result};

use super::CompactionReport;

/// Reports buffered per database before new ones are dropped
const EVENT_CAPACITY: usize = 16;

/// When compaction runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Only on demand
    Never,
    /// At a fixed interval
    Every(Duration),
}

impl Schedule {
    /// Parse a schedule expression
    ///
    /// Accepted forms: `@every <n>s|m|h|d`, `@hourly`, `@daily`, `@weekly`,
    /// `@never` or an empty string.
    pub fn parse(expr: &str) -> Result<Self> {
        let expr = expr.trim();
        match expr {
            "" | "@never" => return Ok(Schedule::Never),
            "@hourly" => return Ok(Schedule::Every(Duration::from_secs(3600))),
            "@daily" => return Ok(Schedule::Every(Duration::from_secs(24 * 3600))),
            "@weekly" => return Ok(Schedule::Every(Duration::from_secs(7 * 24 * 3600))),
            _ => {}
        }

        let every = expr
            .strip_prefix("@every")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| BlobError::Config(format!("unknown schedule '{}'", expr)))?;

        let unit_at = every.char_indices().last().map_or(0, |(i, _)| i);
        let (count, unit) = every.split_at(unit_at);
        let count: u64 = count
            .trim()
            .parse()
            .map_err(|_| BlobError::Config(format!("invalid interval in schedule '{}'", expr)))?;
        let seconds = match unit {
            "s" => 1,
            "m" => 60,
            "h" => 3600,
            "d" => 24 * 3600,
            _ => {
                return Err(BlobError::Config(format!(
                    "invalid unit in schedule '{}'",
                    expr
                )))
            }
        };
        if count == 0 {
            return Err(BlobError::Config(format!(
                "schedule '{}' has a zero interval",
                expr
            )));
        }

        let interval = count.checked_mul(seconds).ok_or_else(|| {
            BlobError::Config(format!("interval of schedule '{}' is too long", expr))
        })?;

        Ok(Schedule::Every(Duration::from_secs(interval)))
    }

    pub fn interval(&self) -> Option<Duration> {
        match self {
            Schedule::Never => None,
            Schedule::Every(interval) => Some(*interval),
        }
    }
}

struct Job {
    events_tx: Sender<CompactionReport>,
    events_rx: Receiver<CompactionReport>,
    worker: Option<Worker>,
}

struct Worker {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

/// Background compaction for every open database
#[derive(Default)]
pub struct CompactionScheduler {
    jobs: Mutex<HashMap<String, Job>>,
}

impl CompactionScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start compacting `db` on its configured schedule
    ///
    /// Registering a database twice replaces its previous worker.
    pub fn register(&self, db: Arc<Database>) -> Result<()> {
        let schedule = Schedule::parse(&db.config().compaction)?;
        self.register_with(db, schedule)
    }

    pub fn register_with(&self, db: Arc<Database>, schedule: Schedule) -> Result<()> {
        let name = db.name().to_string();
        self.remove(&name);

        let (events_tx, events_rx) = channel::bounded(EVENT_CAPACITY);
        let worker = match schedule.interval() {
            Some(interval) => Some(spawn_worker(db, interval, events_tx.clone())?),
            None => None,
        };

        tracing::info!(db = %name, schedule = ?schedule, "compaction registered");
        self.jobs.lock().insert(
            name,
            Job {
                events_tx,
                events_rx,
                worker,
            },
        );
        Ok(())
    }

    /// Stop the worker of `name`, waiting for a running compaction to finish
    pub fn remove(&self, name: &str) {
        let job = self.jobs.lock().remove(name);
        if let Some(worker) = job.and_then(|j| j.worker) {
            stop(name, worker);
        }
    }

    /// Receiver of the reports of `name`
    pub fn events(&self, name: &str) -> Option<Receiver<CompactionReport>> {
        self.jobs.lock().get(name).map(|j| j.events_rx.clone())
    }

    /// Publish a report of a compaction run outside the schedule
    pub fn publish(&self, report: CompactionReport) {
        if let Some(job) = self.jobs.lock().get(&report.database) {
            send_report(&job.events_tx, report);
        }
    }

    /// Stop every worker
    pub fn shutdown(&self) {
        let jobs: Vec<_> = self.jobs.lock().drain().collect();
        for (name, job) in jobs {
            if let Some(worker) = job.worker {
                stop(&name, worker);
            }
        }
    }
}

impl Drop for CompactionScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_worker(
    db: Arc<Database>,
    interval: Duration,
    events: Sender<CompactionReport>,
) -> Result<Worker> {
    let (shutdown, shutdown_rx) = channel::bounded::<()>(1);
    let name = db.name().to_string();

    let handle = thread::Builder::new()
        .name(format!("compaction-{}", name))
        .spawn(move || {
            let ticker = channel::tick(interval);
            loop {
                crossbeam::select! {
                    recv(ticker) -> _ => {
                        match db.compact() {
                            Ok(report) => send_report(&events, report),
                            Err(e) => {
                                tracing::error!(db = %db.name(), error = %e, "scheduled compaction failed");
                            }
                        }
                    }
                    recv(shutdown_rx) -> _ => {
                        tracing::info!(db = %db.name(), "compaction worker shutting down");
                        break;
                    }
                }
            }
        })?;

    Ok(Worker { shutdown, handle })
}

fn send_report(events: &Sender<CompactionReport>, report: CompactionReport) {
    match events.try_send(report) {
        Ok(()) => {}
        Err(TrySendError::Full(report)) => {
            tracing::debug!(db = %report.database, "compaction report dropped, channel full");
        }
        Err(TrySendError::Disconnected(_)) => {}
    }
}

fn stop(name: &str, worker: Worker) {
    let _ = worker.shutdown.send(());
    if worker.handle.join().is_err() {
        tracing::error!(db = %name, "compaction worker panicked");
    }
}
