//! C5 — Scheduler: cron-evaluated job launcher with a concurrency cap,
//! bounded execution history and best-effort heartbeats (spec §4.5).
//!
//! No teacher file does anything like this; the `cron`/`chrono`/`chrono-tz`
//! dependency trio is grounded in
//! `other_examples/manifests/ra0x3-systemg/Cargo.toml`, a real on-host
//! process manager in the retrieval pack that schedules jobs the same way.
//! Each job runs its one-shot invocations through the same
//! [`crate::runner::process::ProcessRunner`] the Supervisor uses for
//! steady-state instances, rather than through a full Supervisor actor,
//! since a scheduled run has no restart policy or steady-state scale of its
//! own (it either finishes or times out, once).

use crate::runner::process::{ExitRecord, ProcessRunner};
use crate::runner::shutdown::terminate;
use crate::runner::{InstanceIdentity, OwnedPids};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use nix::sys::signal::Signal;
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("invalid cron expression `{0}`")]
    InvalidCron(String),
    #[error("invalid timezone `{0}`")]
    InvalidTimezone(String),
    #[error("job `{0}` not found")]
    JobNotFound(String),
    #[error("deadline exceeded before the run completed")]
    DeadlineExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Failure,
    Timeout,
    Cancelled,
    SkippedOverlap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggeredBy {
    Cron,
    ManualAsync,
    ManualSync,
}

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub start: SystemTime,
    pub end: SystemTime,
    pub exit_code: Option<i32>,
    pub status: RunStatus,
    pub triggered_by: TriggeredBy,
}

/// Immutable once written (spec §4.5 "History"): no setters, only
/// construction and `Clone` for snapshotting out of the mutex.

/// Bounded ring, evicted whenever *either* `max_entries` or `max_age` binds
/// first (spec §9 Open Question resolution).
pub struct ScheduleHistory {
    entries: VecDeque<HistoryEntry>,
    max_entries: usize,
    max_age: Option<Duration>,
}

impl ScheduleHistory {
    pub fn new(max_entries: usize, max_age: Option<Duration>) -> Self {
        ScheduleHistory {
            entries: VecDeque::new(),
            max_entries: max_entries.max(1),
            max_age,
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_back(entry);
        self.evict();
    }

    fn evict(&mut self) {
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
        if let Some(max_age) = self.max_age {
            let now = SystemTime::now();
            while let Some(front) = self.entries.front() {
                match now.duration_since(front.end) {
                    Ok(age) if age > max_age => {
                        self.entries.pop_front();
                    }
                    _ => break,
                }
            }
        }
    }

    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    pub url: String,
    pub timeout: Duration,
}

fn ping(base_url: &str, suffix: &str, timeout: Duration) {
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .build();
    let url = if suffix.is_empty() {
        base_url.to_string()
    } else {
        format!("{base_url}/{suffix}")
    };
    // Best-effort: heartbeat failures never fail the job (spec §4.5).
    let _ = agent.get(&url).call();
}

/// One cron-scheduled job. Construction validates the cron expression and
/// timezone eagerly so config-time errors surface before the job thread
/// starts.
pub struct ScheduleJob {
    name: String,
    schedule: Schedule,
    timezone: Tz,
    timeout: Option<Duration>,
    max_concurrent: u32,
    heartbeat: Option<HeartbeatConfig>,
    paused: Arc<AtomicBool>,
    active_runs: Arc<AtomicU32>,
    history: Arc<Mutex<ScheduleHistory>>,
    run_seq: Arc<AtomicU32>,
    owned_pids: OwnedPids,
}

impl ScheduleJob {
    pub fn new(
        name: impl Into<String>,
        cron_expr: &str,
        timezone: &str,
        timeout: Option<Duration>,
        max_concurrent: u32,
        heartbeat: Option<HeartbeatConfig>,
        history_size: usize,
        history_max_age: Option<Duration>,
    ) -> Result<Self, SchedulerError> {
        let schedule = Schedule::from_str(cron_expr)
            .map_err(|_| SchedulerError::InvalidCron(cron_expr.to_string()))?;
        let timezone: Tz = timezone
            .parse()
            .map_err(|_| SchedulerError::InvalidTimezone(timezone.to_string()))?;

        Ok(ScheduleJob {
            name: name.into(),
            schedule,
            timezone,
            timeout,
            max_concurrent,
            heartbeat,
            paused: Arc::new(AtomicBool::new(false)),
            active_runs: Arc::new(AtomicU32::new(0)),
            history: Arc::new(Mutex::new(ScheduleHistory::new(history_size, history_max_age))),
            run_seq: Arc::new(AtomicU32::new(0)),
            owned_pids: OwnedPids::new(),
        })
    }

    /// Share the reaper's PID registry (spec §4.6, §9) instead of this job's
    /// private, empty default.
    pub fn with_owned_pids(mut self, owned_pids: OwnedPids) -> Self {
        self.owned_pids = owned_pids;
        self
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn history_snapshot(&self) -> Vec<HistoryEntry> {
        self.history.lock().expect("history mutex poisoned").snapshot()
    }

    fn next_fire(&self, after: DateTime<Utc>) -> Option<DateTime<Tz>> {
        self.schedule
            .after(&after.with_timezone(&self.timezone))
            .next()
    }

    /// Start the background thread that evaluates cron fire times and
    /// launches runs. `command`/`env`/`working_dir` describe the process to
    /// launch each time, matching the owning `ProcessSpec`.
    pub fn spawn_driver(
        self: &Arc<Self>,
        command: Vec<String>,
        env: std::collections::HashMap<String, String>,
        working_dir: Option<String>,
    ) -> thread::JoinHandle<()> {
        let job = Arc::clone(self);
        thread::spawn(move || loop {
            let mut now = Utc::now();
            let Some(next) = job.next_fire(now) else {
                break;
            };
            let wait = (next.with_timezone(&Utc) - now)
                .to_std()
                .unwrap_or(Duration::ZERO);
            thread::sleep(wait);
            now = Utc::now();

            if job.is_paused() {
                continue;
            }

            if job.max_concurrent > 0 && job.active_runs.load(Ordering::SeqCst) >= job.max_concurrent {
                job.record_history(HistoryEntry {
                    start: SystemTime::now(),
                    end: SystemTime::now(),
                    exit_code: None,
                    status: RunStatus::SkippedOverlap,
                    triggered_by: TriggeredBy::Cron,
                });
                continue;
            }

            // Launch on its own thread, same as the async `trigger` path:
            // the driver loop must keep evaluating fire times while a run
            // is in flight, or overlapping fires are silently dropped
            // instead of recorded as `skipped_overlap` (spec §4.5, S4).
            let run_job = Arc::clone(&job);
            let run_command = command.clone();
            let run_env = env.clone();
            let run_working_dir = working_dir.clone();
            thread::spawn(move || {
                run_job.launch_run(
                    &run_command,
                    &run_env,
                    run_working_dir.as_deref(),
                    TriggeredBy::Cron,
                );
            });
        })
    }

    fn record_history(&self, entry: HistoryEntry) {
        self.history.lock().expect("history mutex poisoned").push(entry);
    }

    fn launch_run(
        &self,
        command: &[String],
        env: &std::collections::HashMap<String, String>,
        working_dir: Option<&str>,
        triggered_by: TriggeredBy,
    ) {
        self.active_runs.fetch_add(1, Ordering::SeqCst);
        let run_number = self.run_seq.fetch_add(1, Ordering::SeqCst) as u64;

        if let Some(hb) = &self.heartbeat {
            ping(&hb.url, "start", hb.timeout);
        }

        let Some((program, args)) = command.split_first() else {
            self.active_runs.fetch_sub(1, Ordering::SeqCst);
            return;
        };

        let identity = InstanceIdentity {
            process_name: self.name.clone(),
            ordinal: 0,
            scheduled_run: Some(run_number),
            schedule: Some(self.name.clone()),
        };

        let start = SystemTime::now();
        let mut runner = ProcessRunner::new(program.clone(), args.to_vec())
            .env(env.clone())
            .owned_pids(self.owned_pids.clone());
        if let Some(dir) = working_dir {
            runner = runner.working_dir(dir.to_string());
        }

        let (status, exit_code) = match runner.start(&identity, 200) {
            Ok(started) => match self.timeout {
                Some(timeout) => self.run_with_timeout(started, timeout),
                None => {
                    let record = started.wait().ok();
                    status_from_record(record)
                }
            },
            Err(_) => (RunStatus::Failure, None),
        };

        let end = SystemTime::now();
        self.record_history(HistoryEntry {
            start,
            end,
            exit_code,
            status,
            triggered_by,
        });

        if let Some(hb) = &self.heartbeat {
            match status {
                RunStatus::Success => ping(&hb.url, "", hb.timeout),
                _ => ping(&hb.url, &format!("fail?code={}", exit_code.unwrap_or(-1)), hb.timeout),
            }
        }

        self.active_runs.fetch_sub(1, Ordering::SeqCst);
    }

    fn run_with_timeout(
        &self,
        started: ProcessRunner<crate::runner::process::Started>,
        timeout: Duration,
    ) -> (RunStatus, Option<i32>) {
        let mut started = started;
        let deadline = Instant::now() + timeout;
        loop {
            match started.try_wait() {
                Ok(Some(record)) => return status_from_record(Some(record)),
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let outcome = terminate(
                            started,
                            Signal::SIGTERM,
                            Duration::from_secs(5),
                            Signal::SIGKILL,
                        );
                        return match outcome {
                            Ok(o) => (RunStatus::Timeout, o.record.code),
                            Err(_) => (RunStatus::Timeout, None),
                        };
                    }
                    thread::sleep(Duration::from_millis(20));
                }
                Err(_) => return (RunStatus::Failure, None),
            }
        }
    }

    /// `trigger(name, sync)`. Sync blocks until the run ends; async returns
    /// immediately after acceptance.
    pub fn trigger(
        self: &Arc<Self>,
        command: Vec<String>,
        env: std::collections::HashMap<String, String>,
        working_dir: Option<String>,
        sync: bool,
    ) {
        let triggered_by = if sync {
            TriggeredBy::ManualSync
        } else {
            TriggeredBy::ManualAsync
        };

        if job_capacity_available(self) {
            if sync {
                self.launch_run(&command, &env, working_dir.as_deref(), triggered_by);
            } else {
                let job = Arc::clone(self);
                thread::spawn(move || {
                    job.launch_run(&command, &env, working_dir.as_deref(), triggered_by);
                });
            }
        } else {
            self.record_history(HistoryEntry {
                start: SystemTime::now(),
                end: SystemTime::now(),
                exit_code: None,
                status: RunStatus::SkippedOverlap,
                triggered_by,
            });
        }
    }
}

fn job_capacity_available(job: &Arc<ScheduleJob>) -> bool {
    job.max_concurrent == 0 || job.active_runs.load(Ordering::SeqCst) < job.max_concurrent
}

fn status_from_record(record: Option<ExitRecord>) -> (RunStatus, Option<i32>) {
    match record {
        Some(r) if r.is_success() => (RunStatus::Success, r.code),
        Some(r) => (RunStatus::Failure, r.code),
        None => (RunStatus::Failure, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_concurrent_zero_means_unbounded() {
        let job = Arc::new(
            ScheduleJob::new("job", "* * * * * *", "UTC", None, 0, None, 100, None).unwrap(),
        );
        assert!(job_capacity_available(&job));
        job.active_runs.store(1000, Ordering::SeqCst);
        assert!(job_capacity_available(&job));
    }

    #[test]
    fn history_evicts_on_max_entries() {
        let mut history = ScheduleHistory::new(2, None);
        for i in 0..5 {
            history.push(HistoryEntry {
                start: SystemTime::now(),
                end: SystemTime::now(),
                exit_code: Some(i),
                status: RunStatus::Success,
                triggered_by: TriggeredBy::Cron,
            });
        }
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn history_evicts_on_max_age() {
        let mut history = ScheduleHistory::new(100, Some(Duration::from_millis(10)));
        history.push(HistoryEntry {
            start: SystemTime::now() - Duration::from_secs(1),
            end: SystemTime::now() - Duration::from_secs(1),
            exit_code: Some(0),
            status: RunStatus::Success,
            triggered_by: TriggeredBy::Cron,
        });
        thread::sleep(Duration::from_millis(30));
        history.push(HistoryEntry {
            start: SystemTime::now(),
            end: SystemTime::now(),
            exit_code: Some(0),
            status: RunStatus::Success,
            triggered_by: TriggeredBy::Cron,
        });
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn pause_resume_is_idempotent() {
        let job = Arc::new(
            ScheduleJob::new("job", "* * * * * *", "UTC", None, 1, None, 100, None).unwrap(),
        );
        job.pause();
        job.pause();
        assert!(job.is_paused());
        job.resume();
        job.resume();
        assert!(!job.is_paused());
    }

    #[test]
    fn invalid_cron_is_rejected_at_construction() {
        let result = ScheduleJob::new("job", "not a cron", "UTC", None, 1, None, 100, None);
        assert!(matches!(result, Err(SchedulerError::InvalidCron(_))));
    }

    #[test]
    fn invalid_timezone_is_rejected_at_construction() {
        let result = ScheduleJob::new("job", "* * * * * *", "Mars/Noctis", None, 1, None, 100, None);
        assert!(matches!(result, Err(SchedulerError::InvalidTimezone(_))));
    }

    #[test]
    fn manual_sync_trigger_runs_and_records_history() {
        let job = Arc::new(
            ScheduleJob::new("job", "0 0 0 1 1 *", "UTC", None, 1, None, 100, None).unwrap(),
        );
        job.trigger(
            vec!["true".to_string()],
            std::collections::HashMap::new(),
            None,
            true,
        );
        let history = job.history_snapshot();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, RunStatus::Success);
        assert_eq!(history[0].triggered_by, TriggeredBy::ManualSync);
    }

    #[test]
    fn timeout_terminates_and_records_timeout_status() {
        let job = Arc::new(
            ScheduleJob::new(
                "job",
                "0 0 0 1 1 *",
                "UTC",
                Some(Duration::from_millis(200)),
                1,
                None,
                100,
                None,
            )
            .unwrap(),
        );
        job.trigger(
            vec!["sleep".to_string(), "5".to_string()],
            std::collections::HashMap::new(),
            None,
            true,
        );
        let history = job.history_snapshot();
        assert_eq!(history[0].status, RunStatus::Timeout);
    }
}
