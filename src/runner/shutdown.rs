//! Graceful-then-escalated termination, grounded on
//! `src/command/shutdown.rs`'s SIGTERM→wait→SIGKILL escalation, generalized
//! to accept any configured graceful/escalation signal pair
//! ([`crate::config::ShutdownConfig`]).

use super::process::{ExitRecord, ProcessRunner, Started};
use nix::sys::signal::Signal;
use std::io::Error as IoError;
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
pub enum TerminateError {
    #[error("signal delivery failed: {0}")]
    Signal(#[from] nix::Error),
    #[error("wait failed: {0}")]
    Wait(#[from] IoError),
}

/// Result of a stop attempt: whether escalation was needed.
#[derive(Debug)]
pub struct TerminationOutcome {
    pub record: ExitRecord,
    pub escalated: bool,
}

/// Send `graceful`, poll up to `grace_timeout`, then send `escalation` and
/// wait unconditionally (spec §4.4 "Stopping protocol" steps 2-3).
pub fn terminate(
    mut runner: ProcessRunner<Started>,
    graceful: Signal,
    grace_timeout: Duration,
    escalation: Signal,
) -> Result<TerminationOutcome, TerminateError> {
    runner.signal(graceful)?;

    let deadline = Instant::now() + grace_timeout;
    loop {
        if let Some(record) = runner.try_wait()? {
            return Ok(TerminationOutcome {
                record,
                escalated: false,
            });
        }
        if Instant::now() >= deadline {
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    runner.signal(escalation)?;
    let record = runner.wait()?;
    Ok(TerminationOutcome {
        record,
        escalated: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::env::InstanceIdentity;
    use crate::runner::process::ProcessRunner;

    fn identity() -> InstanceIdentity {
        InstanceIdentity {
            process_name: "p".to_string(),
            ordinal: 0,
            scheduled_run: None,
            schedule: None,
        }
    }

    #[test]
    fn graceful_signal_is_enough_for_a_cooperative_child() {
        let runner = ProcessRunner::new("sleep", vec!["5".to_string()]);
        let started = runner.start(&identity(), 10).unwrap();
        let outcome = terminate(
            started,
            Signal::SIGTERM,
            Duration::from_secs(2),
            Signal::SIGKILL,
        )
        .unwrap();
        assert!(!outcome.escalated);
        assert_eq!(outcome.record.signal, Some(Signal::SIGTERM as i32));
    }

    #[test]
    fn s3_ignoring_sigterm_forces_escalation() {
        let runner = ProcessRunner::new(
            "sh",
            vec![
                "-c".to_string(),
                "trap '' TERM; sleep 30".to_string(),
            ],
        );
        let started = runner.start(&identity(), 10).unwrap();

        let before = Instant::now();
        let outcome = terminate(
            started,
            Signal::SIGTERM,
            Duration::from_millis(500),
            Signal::SIGKILL,
        )
        .unwrap();
        let elapsed = before.elapsed();

        assert!(outcome.escalated);
        assert_eq!(outcome.record.signal, Some(Signal::SIGKILL as i32));
        assert!(elapsed < Duration::from_secs(2));
    }
}
