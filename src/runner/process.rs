//! C3 — Instance Runner: owns one OS child, typestate-guarded so `signal`
//! and `wait` are only callable once spawned.
//!
//! Grounded on `src/command/processrunner.rs`'s `ProcessRunner<Unstarted|
//! Started>` pattern, extended with: its own process group (spec §4.3 "so
//! signals can be delivered to the entire tree"), `PM_*` env injection
//! (`runner::env`), and bounded log capture (`runner::logring`) in place of
//! the teacher's unbounded `mpsc` relay.

use super::env::{supervisor_env, InstanceIdentity};
use super::logring::{LogRing, Stream as LogStream};
use super::OwnedPids;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::io::Error as IoError;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("exec failed for `{program}`: {source}")]
    Exec {
        program: String,
        #[source]
        source: IoError,
    },
}

#[derive(Debug, Clone)]
pub struct ExitRecord {
    pub code: Option<i32>,
    pub signal: Option<i32>,
    pub duration: Duration,
}

impl ExitRecord {
    /// Spec §6 rollup: 0 clean, non-zero failure, 137/143 derived from
    /// SIGKILL/SIGTERM, purely informational.
    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

pub struct Unstarted {
    program: String,
    args: Vec<String>,
    working_dir: Option<String>,
    env: HashMap<String, String>,
    owned_pids: OwnedPids,
}

pub struct Started {
    child: Child,
    pid: Pid,
    started_at: Instant,
    log_ring: Arc<Mutex<LogRing>>,
    stdout_thread: Option<JoinHandle<()>>,
    stderr_thread: Option<JoinHandle<()>>,
    owned_pids: OwnedPids,
}

pub struct ProcessRunner<S> {
    state: S,
}

impl ProcessRunner<Unstarted> {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        ProcessRunner {
            state: Unstarted {
                program: program.into(),
                args,
                working_dir: None,
                env: HashMap::new(),
                owned_pids: OwnedPids::new(),
            },
        }
    }

    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.state.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, env: HashMap<String, String>) -> Self {
        self.state.env = env;
        self
    }

    /// Share the reaper's PID registry so this instance's pid is claimed for
    /// the runner the moment it is spawned (spec §4.6, §9). Defaults to a
    /// private, empty registry when not called.
    pub fn owned_pids(mut self, owned_pids: OwnedPids) -> Self {
        self.state.owned_pids = owned_pids;
        self
    }

    /// `start(spec, identity, env) -> Running | SpawnError`. Places the
    /// child in its own process group and injects the `PM_*` variables on
    /// top of the declared env.
    pub fn start(
        self,
        identity: &InstanceIdentity,
        log_capacity: usize,
    ) -> Result<ProcessRunner<Started>, SpawnError> {
        let Unstarted {
            program,
            args,
            working_dir,
            mut env,
            owned_pids,
        } = self.state;

        let start_time = SystemTime::now();
        for (k, v) in supervisor_env(identity, start_time) {
            env.insert(k, v);
        }

        let mut command = Command::new(&program);
        command
            .args(&args)
            .envs(&env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &working_dir {
            command.current_dir(dir);
        }

        // Own process group so a single signal reaches the whole subtree.
        unsafe {
            command.pre_exec(|| {
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(|e| IoError::from_raw_os_error(e as i32))?;
                Ok(())
            });
        }

        let mut child = command.spawn().map_err(|source| SpawnError::Exec {
            program: program.clone(),
            source,
        })?;

        let pid = Pid::from_raw(child.id() as i32);
        owned_pids.claim(pid.as_raw());
        let log_ring = Arc::new(Mutex::new(LogRing::new(log_capacity)));

        let stdout_thread = child.stdout.take().map(|out| {
            spawn_capture_thread(out, LogStream::Stdout, Arc::clone(&log_ring))
        });
        let stderr_thread = child.stderr.take().map(|err| {
            spawn_capture_thread(err, LogStream::Stderr, Arc::clone(&log_ring))
        });

        Ok(ProcessRunner {
            state: Started {
                child,
                pid,
                started_at: Instant::now(),
                log_ring,
                stdout_thread,
                stderr_thread,
                owned_pids,
            },
        })
    }
}

fn spawn_capture_thread<R>(
    reader: R,
    stream: LogStream,
    log_ring: Arc<Mutex<LogRing>>,
) -> JoinHandle<()>
where
    R: std::io::Read + Send + 'static,
{
    thread::spawn(move || {
        let buffered = BufReader::new(reader);
        for line in buffered.lines().map_while(Result::ok) {
            if let Ok(mut ring) = log_ring.lock() {
                ring.push(stream, line, SystemTime::now());
            }
        }
    })
}

impl ProcessRunner<Started> {
    pub fn pid(&self) -> Pid {
        self.state.pid
    }

    /// `signal(sig)`: delivered to the whole process group.
    pub fn signal(&self, sig: Signal) -> Result<(), nix::Error> {
        // Negative pid targets the process group.
        signal::kill(Pid::from_raw(-self.state.pid.as_raw()), sig)
    }

    /// A cloneable handle onto this instance's log ring, usable after the
    /// runner itself has been moved (e.g. into a dedicated wait thread).
    pub fn log_handle(&self) -> Arc<Mutex<LogRing>> {
        Arc::clone(&self.state.log_ring)
    }

    /// `logsSnapshot(limit) -> [line]`.
    pub fn logs_snapshot(&self, limit: usize) -> Vec<super::logring::LogLine> {
        self.state
            .log_ring
            .lock()
            .map(|ring| ring.snapshot(limit))
            .unwrap_or_default()
    }

    /// Non-blocking poll; `None` while still running.
    pub fn try_wait(&mut self) -> Result<Option<ExitRecord>, IoError> {
        match self.state.child.try_wait()? {
            Some(status) => Ok(Some(self.finish(status.code(), status.signal()))),
            None => Ok(None),
        }
    }

    /// `wait() -> ExitRecord`: blocking wait for this child specifically.
    pub fn wait(mut self) -> Result<ExitRecord, IoError> {
        let status = self.state.child.wait()?;
        Ok(self.finish(status.code(), status.signal()))
    }

    fn finish(&mut self, code: Option<i32>, signal: Option<i32>) -> ExitRecord {
        self.state.owned_pids.release(self.state.pid.as_raw());
        if let Some(t) = self.state.stdout_thread.take() {
            let _ = t.join();
        }
        if let Some(t) = self.state.stderr_thread.take() {
            let _ = t.join();
        }
        ExitRecord {
            code,
            signal,
            duration: self.state.started_at.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str) -> InstanceIdentity {
        InstanceIdentity {
            process_name: name.to_string(),
            ordinal: 0,
            scheduled_run: None,
            schedule: None,
        }
    }

    #[test]
    fn spawns_and_waits_for_a_clean_exit() {
        let runner = ProcessRunner::new("true", vec![]);
        let started = runner.start(&identity("p"), 10).unwrap();
        let record = started.wait().unwrap();
        assert_eq!(record.code, Some(0));
        assert!(record.is_success());
    }

    #[test]
    fn nonzero_exit_is_recorded() {
        let runner = ProcessRunner::new("false", vec![]);
        let started = runner.start(&identity("p"), 10).unwrap();
        let record = started.wait().unwrap();
        assert_eq!(record.code, Some(1));
        assert!(!record.is_success());
    }

    #[test]
    fn spawn_failure_surfaces_as_spawn_error() {
        let runner = ProcessRunner::new("/no/such/binary-xyz", vec![]);
        let result = runner.start(&identity("p"), 10);
        assert!(matches!(result, Err(SpawnError::Exec { .. })));
    }

    #[test]
    fn captures_stdout_into_the_log_ring() {
        let runner = ProcessRunner::new("sh", vec!["-c".to_string(), "echo hello".to_string()]);
        let mut started = runner.start(&identity("p"), 10).unwrap();
        // Give the capture thread a moment before the process exits.
        let record = loop {
            if let Some(r) = started.try_wait().unwrap() {
                break r;
            }
            thread::sleep(Duration::from_millis(10));
        };
        assert!(record.is_success());
    }

    #[test]
    fn signal_reaches_the_process_group() {
        let runner = ProcessRunner::new("sleep", vec!["5".to_string()]);
        let started = runner.start(&identity("p"), 10).unwrap();
        started.signal(Signal::SIGTERM).unwrap();
        let record = started.wait().unwrap();
        assert_eq!(record.signal, Some(Signal::SIGTERM as i32));
    }
}
