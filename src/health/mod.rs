//! C2 — Health Checker: stateless, synchronous-within-timeout probe
//! evaluation (spec §4.2).
//!
//! Trait shape and error taxonomy grounded on
//! `super-agent/src/sub_agent/health/health_checker.rs`; the probe
//! implementations that file stubbed out (`http.rs`/`exec.rs` both returned
//! `Ok(())` unconditionally) are fully implemented here. The tagged `Probe`
//! enum replaces the teacher's type-string dispatch per spec §9's redesign
//! flag.

use std::io;
use std::net::{SocketAddr, TcpStream};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Outcome of one probe evaluation. Threshold accumulation across calls is
/// the Supervisor's responsibility (spec §4.2), not this module's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Passing,
    Failing,
    /// The probe has not yet been evaluated (still within `initial_delay`).
    Pending,
}

/// A health probe target. Replaces type-string dispatch with an exhaustively
/// matched tagged variant (spec §9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Tcp { address: String },
    Http { url: String, expected_status: u16 },
    Exec { command: Vec<String> },
}

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("probe target address `{0}` is not a valid socket address")]
    InvalidAddress(String),
    #[error("exec probe command is empty")]
    EmptyCommand,
    #[error("failed to spawn exec probe: {0}")]
    Spawn(#[source] io::Error),
}

/// Evaluate `probe` synchronously, bounded by `timeout`. Never blocks past
/// `timeout` by more than the unavoidable syscall overhead.
pub fn evaluate(probe: &Probe, timeout: Duration) -> Result<Outcome, HealthError> {
    match probe {
        Probe::Tcp { address } => Ok(evaluate_tcp(address, timeout)?),
        Probe::Http {
            url,
            expected_status,
        } => Ok(evaluate_http(url, *expected_status, timeout)),
        Probe::Exec { command } => evaluate_exec(command, timeout),
    }
}

fn evaluate_tcp(address: &str, timeout: Duration) -> Result<Outcome, HealthError> {
    let addr: SocketAddr = address
        .parse()
        .map_err(|_| HealthError::InvalidAddress(address.to_string()))?;
    match TcpStream::connect_timeout(&addr, timeout) {
        Ok(_) => Ok(Outcome::Passing),
        Err(_) => Ok(Outcome::Failing),
    }
}

fn evaluate_http(url: &str, expected_status: u16, timeout: Duration) -> Outcome {
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .build();

    match agent.get(url).call() {
        Ok(response) => {
            if response.status() == expected_status {
                Outcome::Passing
            } else {
                Outcome::Failing
            }
        }
        Err(ureq::Error::Status(code, _)) if code == expected_status => Outcome::Passing,
        Err(_) => Outcome::Failing,
    }
}

fn evaluate_exec(command: &[String], timeout: Duration) -> Result<Outcome, HealthError> {
    let (bin, args) = command.split_first().ok_or(HealthError::EmptyCommand)?;

    let mut child = Command::new(bin)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(HealthError::Spawn)?;

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(exit_outcome(status.success())),
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Ok(Outcome::Failing);
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(_) => return Ok(Outcome::Failing),
        }
    }
}

fn exit_outcome(success: bool) -> Outcome {
    if success {
        Outcome::Passing
    } else {
        Outcome::Failing
    }
}

/// Tracks consecutive pass/fail streaks for one supervised instance and
/// derives the threshold-gated healthy/unhealthy state (spec §4.2 "Threshold
/// semantics", deliberately kept out of C2 itself).
#[derive(Debug, Clone)]
pub struct ThresholdTracker {
    failure_threshold: u32,
    success_threshold: u32,
    consecutive_failures: u32,
    consecutive_successes: u32,
    healthy: bool,
    ready: bool,
}

impl ThresholdTracker {
    pub fn new(failure_threshold: u32, success_threshold: u32) -> Self {
        ThresholdTracker {
            failure_threshold: failure_threshold.max(1),
            success_threshold: success_threshold.max(1),
            consecutive_failures: 0,
            consecutive_successes: 0,
            // Optimistic until proven otherwise, matching "Pending" treated
            // as not-yet-failing during initial_delay. This is the liveness
            // posture: an instance that hasn't failed `failure_threshold`
            // times yet is assumed healthy so it isn't restarted on a
            // single blip. `ready` below is the separate, pessimistic
            // posture a readiness gate needs.
            healthy: true,
            ready: false,
        }
    }

    /// Feed one evaluation outcome; returns the possibly-updated healthy
    /// state. `Pending` does not affect either streak.
    pub fn record(&mut self, outcome: Outcome) -> bool {
        match outcome {
            Outcome::Passing => {
                self.consecutive_successes += 1;
                self.consecutive_failures = 0;
                if self.consecutive_successes >= self.success_threshold {
                    self.healthy = true;
                    self.ready = true;
                }
            }
            Outcome::Failing => {
                self.consecutive_failures += 1;
                self.consecutive_successes = 0;
                if self.consecutive_failures >= self.failure_threshold {
                    self.healthy = false;
                }
            }
            Outcome::Pending => {}
        }
        self.healthy
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    /// True only once an actual `success_threshold`-long streak of
    /// `Passing` has been observed. Unlike [`ThresholdTracker::is_healthy`]
    /// (optimistic until proven otherwise, for liveness/restart decisions),
    /// this starts `false` and is meant for startup readiness gates that
    /// must not let a dependent start on the strength of "hasn't failed
    /// enough times yet" alone.
    pub fn is_ready(&self) -> bool {
        self.ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn tcp_probe_passes_against_a_listening_port() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let probe = Probe::Tcp {
            address: addr.to_string(),
        };
        assert_eq!(
            evaluate(&probe, Duration::from_millis(200)).unwrap(),
            Outcome::Passing
        );
    }

    #[test]
    fn tcp_probe_fails_against_a_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let probe = Probe::Tcp {
            address: addr.to_string(),
        };
        assert_eq!(
            evaluate(&probe, Duration::from_millis(200)).unwrap(),
            Outcome::Failing
        );
    }

    #[test]
    fn exec_probe_reflects_exit_code() {
        let ok = Probe::Exec {
            command: vec!["true".to_string()],
        };
        assert_eq!(
            evaluate(&ok, Duration::from_secs(1)).unwrap(),
            Outcome::Passing
        );

        let bad = Probe::Exec {
            command: vec!["false".to_string()],
        };
        assert_eq!(
            evaluate(&bad, Duration::from_secs(1)).unwrap(),
            Outcome::Failing
        );
    }

    #[test]
    fn exec_probe_times_out_long_running_commands() {
        let slow = Probe::Exec {
            command: vec!["sleep".to_string(), "5".to_string()],
        };
        let started = Instant::now();
        assert_eq!(
            evaluate(&slow, Duration::from_millis(100)).unwrap(),
            Outcome::Failing
        );
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn threshold_tracker_requires_consecutive_failures() {
        let mut t = ThresholdTracker::new(3, 1);
        assert!(t.record(Outcome::Failing));
        assert!(t.record(Outcome::Failing));
        assert!(!t.record(Outcome::Failing));
    }

    #[test]
    fn threshold_tracker_resets_on_success() {
        let mut t = ThresholdTracker::new(2, 2);
        t.record(Outcome::Failing);
        assert!(t.record(Outcome::Passing));
        assert!(t.is_healthy());
    }

    #[test]
    fn threshold_tracker_requires_consecutive_successes_to_recover() {
        let mut t = ThresholdTracker::new(1, 2);
        t.record(Outcome::Failing);
        assert!(!t.is_healthy());
        assert!(!t.record(Outcome::Passing));
        assert!(t.record(Outcome::Passing));
    }

    #[test]
    fn readiness_is_not_ready_until_a_real_pass_streak_is_observed() {
        let mut t = ThresholdTracker::new(3, 1);
        // is_healthy() stays optimistic (liveness posture), but is_ready()
        // must not claim readiness on a single failure with a threshold of
        // 3 — this is the bug a startup gate must not fall into.
        assert!(t.record(Outcome::Failing));
        assert!(!t.is_ready());
        assert!(t.record(Outcome::Passing));
        assert!(t.is_ready());
    }

    #[test]
    fn readiness_requires_the_full_success_streak() {
        let mut t = ThresholdTracker::new(1, 3);
        t.record(Outcome::Passing);
        assert!(!t.is_ready());
        t.record(Outcome::Passing);
        assert!(!t.is_ready());
        t.record(Outcome::Passing);
        assert!(t.is_ready());
    }
}
