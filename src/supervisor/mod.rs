//! C4 — Supervisor: the per-process state machine (spec §4.4).
//!
//! Generalizes the teacher's single-purpose `SupervisorRunner<Stopped|
//! Running>` typestate (`src/supervisor/runner.rs`) into a long-lived actor
//! that can scale, restart and update in place. Externally, a
//! [`SupervisorHandle`] is the only way to reach a supervisor: every public
//! operation sends a [`Command`] over a bounded `crossbeam_channel` and
//! blocks on a one-shot reply, matching spec §5 ("Each Supervisor is an
//! independent actor processing commands from a bounded FIFO queue").

pub mod error;
pub mod restart;
pub mod state;

use crate::config::{HealthMode, ProcessConfig, ProbeConfig};
use crate::health::{self, Outcome, Probe, ThresholdTracker};
use crate::runner::logring::LogRing;
use crate::runner::process::{ExitRecord, ProcessRunner};
use crate::runner::{InstanceIdentity, OwnedPids};
use crate::sinks::{Event, EventKind, EventStatus, Sinks};
use crossbeam_channel::{bounded, Receiver, Sender};
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub use error::SupervisorError;
pub use state::ProcessState;

/// Global, cross-process defaults (spec §6 global options) a Supervisor
/// falls back to when its own spec doesn't override them.
#[derive(Debug, Clone)]
pub struct SupervisorDefaults {
    pub shutdown_timeout: Duration,
    pub restart_backoff_initial: Duration,
    pub restart_backoff_max: Duration,
    pub max_restart_attempts: u32,
    pub success_window: Duration,
    pub log_capacity: usize,
    /// Shared with the PID-1 reaper so it never double-waits a PID an
    /// Instance Runner already owns (spec §4.6, §9).
    pub owned_pids: OwnedPids,
}

impl Default for SupervisorDefaults {
    fn default() -> Self {
        SupervisorDefaults {
            shutdown_timeout: Duration::from_secs(10),
            restart_backoff_initial: Duration::from_secs(1),
            restart_backoff_max: Duration::from_secs(60),
            max_restart_attempts: 5,
            success_window: Duration::from_secs(60),
            log_capacity: 200,
            owned_pids: OwnedPids::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorSnapshot {
    pub name: String,
    pub state: ProcessState,
    pub desired_scale: u32,
    pub live_instances: u32,
    pub generation: u64,
    pub restart_attempts: u32,
}

type Reply<T> = Sender<T>;

enum Command {
    Start(Reply<Result<(), SupervisorError>>),
    Stop(Reply<Result<(), SupervisorError>>),
    Restart(Reply<Result<(), SupervisorError>>),
    ScaleTo(u32, Reply<Result<(), SupervisorError>>),
    Adjust(i32, Reply<Result<(), SupervisorError>>),
    UpdateSpec(Box<ProcessConfig>, Reply<Result<(), SupervisorError>>),
    Snapshot(Reply<SupervisorSnapshot>),
    InstanceExited(u32, ExitRecord),
    RestartInstance(u32),
    Shutdown,
}

/// External handle to a running Supervisor actor. Cloneable; all clones
/// share the same bounded queue, so the actor still serializes every
/// operation regardless of how many handles exist.
#[derive(Clone)]
pub struct SupervisorHandle {
    tx: Sender<Command>,
}

impl SupervisorHandle {
    fn call<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T, SupervisorError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.tx
            .send(build(reply_tx))
            .map_err(|_| SupervisorError::ActorGone)?;
        reply_rx.recv().map_err(|_| SupervisorError::ActorGone)
    }

    pub fn start(&self) -> Result<(), SupervisorError> {
        self.call(Command::Start)?
    }

    pub fn stop(&self) -> Result<(), SupervisorError> {
        self.call(Command::Stop)?
    }

    pub fn restart(&self) -> Result<(), SupervisorError> {
        self.call(Command::Restart)?
    }

    pub fn scale_to(&self, desired: u32) -> Result<(), SupervisorError> {
        self.call(|reply| Command::ScaleTo(desired, reply))?
    }

    pub fn adjust(&self, delta: i32) -> Result<(), SupervisorError> {
        self.call(|reply| Command::Adjust(delta, reply))?
    }

    pub fn update_spec(&self, spec: ProcessConfig) -> Result<(), SupervisorError> {
        self.call(|reply| Command::UpdateSpec(Box::new(spec), reply))?
    }

    pub fn snapshot(&self) -> Result<SupervisorSnapshot, SupervisorError> {
        self.call(Command::Snapshot)
    }

    /// Tell the actor thread to exit. Does not wait for in-flight instances;
    /// callers should `stop()` first.
    pub fn shutdown_actor(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }
}

struct Instance {
    ordinal: u32,
    pid: Option<Pid>,
    log_ring: Option<Arc<Mutex<LogRing>>>,
    started_at: Option<Instant>,
    last_exit: Option<ExitRecord>,
    health: Option<ThresholdTracker>,
    alive: bool,
}

impl Instance {
    fn new(ordinal: u32) -> Self {
        Instance {
            ordinal,
            pid: None,
            log_ring: None,
            started_at: None,
            last_exit: None,
            health: None,
            alive: false,
        }
    }

    fn send_signal(&self, sig: Signal) {
        if let Some(pid) = self.pid {
            let _ = nix::sys::signal::kill(Pid::from_raw(-pid.as_raw()), sig);
        }
    }

    fn logs_snapshot(&self, limit: usize) -> Vec<crate::runner::logring::LogLine> {
        self.log_ring
            .as_ref()
            .and_then(|ring| ring.lock().ok().map(|r| r.snapshot(limit)))
            .unwrap_or_default()
    }
}

fn to_probe(cfg: &ProbeConfig) -> Probe {
    match cfg {
        ProbeConfig::Tcp { address } => Probe::Tcp {
            address: address.clone(),
        },
        ProbeConfig::Http {
            url,
            expected_status,
        } => Probe::Http {
            url: url.clone(),
            expected_status: expected_status.unwrap_or(200),
        },
        ProbeConfig::Exec { command } => Probe::Exec {
            command: command.clone(),
        },
    }
}

fn parse_signal(name: &str) -> Signal {
    match name.to_ascii_uppercase().as_str() {
        "SIGTERM" | "TERM" => Signal::SIGTERM,
        "SIGKILL" | "KILL" => Signal::SIGKILL,
        "SIGINT" | "INT" => Signal::SIGINT,
        "SIGHUP" | "HUP" => Signal::SIGHUP,
        "SIGQUIT" | "QUIT" => Signal::SIGQUIT,
        "SIGUSR1" | "USR1" => Signal::SIGUSR1,
        "SIGUSR2" | "USR2" => Signal::SIGUSR2,
        _ => Signal::SIGTERM,
    }
}

struct Actor {
    name: String,
    spec: ProcessConfig,
    defaults: SupervisorDefaults,
    generation: u64,
    state: ProcessState,
    instances: Vec<Instance>,
    restart_ledger: restart::RestartLedger,
    sinks: Sinks,
    self_tx: Sender<Command>,
}

impl Actor {
    fn new(
        name: String,
        spec: ProcessConfig,
        defaults: SupervisorDefaults,
        sinks: Sinks,
        self_tx: Sender<Command>,
    ) -> Self {
        let restart_ledger = restart::RestartLedger::new(
            defaults.restart_backoff_initial,
            defaults.restart_backoff_max,
            defaults.max_restart_attempts,
            defaults.success_window,
        );
        Actor {
            name,
            spec,
            defaults,
            generation: 0,
            state: ProcessState::Idle,
            instances: Vec::new(),
            restart_ledger,
            sinks,
            self_tx,
        }
    }

    fn effective_shutdown_timeout(&self) -> Duration {
        self.spec
            .shutdown
            .as_ref()
            .and_then(|s| s.timeout)
            .unwrap_or(self.defaults.shutdown_timeout)
    }

    fn graceful_signal(&self) -> Signal {
        self.spec
            .shutdown
            .as_ref()
            .and_then(|s| s.signal.as_deref())
            .map(parse_signal)
            .unwrap_or(Signal::SIGTERM)
    }

    fn escalation_signal(&self) -> Signal {
        self.spec
            .shutdown
            .as_ref()
            .and_then(|s| s.kill_signal.as_deref())
            .map(parse_signal)
            .unwrap_or(Signal::SIGKILL)
    }

    fn emit(&self, kind: EventKind, status: EventStatus, ordinal: Option<u32>) {
        let mut event = Event::new(kind, self.name.clone(), status);
        if let Some(ordinal) = ordinal {
            event = event.with_ordinal(ordinal);
        }
        self.sinks.emit(event);
    }

    fn spawn_instance(&mut self, ordinal: u32) -> Result<(), SupervisorError> {
        let (program, args) = self
            .spec
            .command
            .split_first()
            .map(|(p, a)| (p.clone(), a.to_vec()))
            .expect("command validated non-empty");

        let identity = InstanceIdentity {
            process_name: self.name.clone(),
            ordinal,
            scheduled_run: None,
            schedule: self.spec.schedule.clone(),
        };

        let mut runner = ProcessRunner::new(program, args)
            .env(self.spec.env.clone())
            .owned_pids(self.defaults.owned_pids.clone());
        if let Some(dir) = &self.spec.working_dir {
            runner = runner.working_dir(dir.clone());
        }
        let started = runner.start(&identity, self.defaults.log_capacity)?;

        let pid = started.pid();
        let log_ring = started.log_handle();

        let self_tx = self.self_tx.clone();
        thread::spawn(move || {
            let record = started
                .wait()
                .unwrap_or_else(|_| ExitRecord {
                    code: None,
                    signal: None,
                    duration: Duration::ZERO,
                });
            let _ = self_tx.send(Command::InstanceExited(ordinal, record));
        });

        let health_tracker = self.spec.health_check.as_ref().map(|h| {
            ThresholdTracker::new(h.failure_threshold, h.success_threshold)
        });

        let instance = self
            .instances
            .iter_mut()
            .find(|i| i.ordinal == ordinal);
        let slot = match instance {
            Some(i) => i,
            None => {
                self.instances.push(Instance::new(ordinal));
                self.instances.last_mut().unwrap()
            }
        };
        slot.pid = Some(pid);
        slot.log_ring = Some(log_ring);
        slot.started_at = Some(Instant::now());
        slot.last_exit = None;
        slot.health = health_tracker;
        slot.alive = true;

        self.emit(EventKind::ProcessStart, EventStatus::Success, Some(ordinal));
        Ok(())
    }

    fn wait_for_health_gate(&mut self) -> Result<(), SupervisorError> {
        let Some(health_cfg) = self.spec.health_check.clone() else {
            return Ok(());
        };
        if matches!(health_cfg.mode, HealthMode::Liveness) {
            // Liveness-only probes gate restarts, not readiness; Starting
            // can proceed to Running immediately.
            return Ok(());
        }

        let probe = to_probe(&health_cfg.probe);
        let timeout = health_cfg.timeout.unwrap_or(Duration::from_secs(5));
        let period = health_cfg.period.unwrap_or(Duration::from_secs(5));
        if let Some(delay) = health_cfg.initial_delay {
            thread::sleep(delay);
        }

        // Heuristic startup budget: generous enough for typical readiness
        // windows (spec §8 scenario S5 uses ~5s) without hanging forever.
        let budget = Duration::from_secs(120);
        let deadline = Instant::now() + budget;

        loop {
            let mut all_ready = true;
            for ordinal in 0..self.spec.scale {
                let outcome = health::evaluate(&probe, timeout).unwrap_or(Outcome::Failing);
                // Gate on `is_ready()`, not the `record()` return: the
                // latter is optimistic until `failure_threshold` failures
                // accumulate (correct for liveness), but a startup gate
                // must wait for an actual `success_threshold`-long pass
                // streak before letting dependents start (spec §4.4 health
                // gate).
                let ready = self
                    .instances
                    .iter_mut()
                    .find(|i| i.ordinal == ordinal)
                    .and_then(|i| i.health.as_mut())
                    .map(|tracker| {
                        tracker.record(outcome);
                        tracker.is_ready()
                    })
                    .unwrap_or(true);
                if !ready {
                    all_ready = false;
                }
            }
            if all_ready {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SupervisorError::StartupBudgetExhausted);
            }
            thread::sleep(period);
        }
    }

    fn handle_start(&mut self) -> Result<(), SupervisorError> {
        if matches!(self.state, ProcessState::Running) {
            return Ok(());
        }
        self.state = ProcessState::Starting;

        for ordinal in 0..self.spec.scale {
            if let Err(err) = self.spawn_instance(ordinal) {
                self.emit(EventKind::ProcessCrash, EventStatus::Error, Some(ordinal));
                self.state = ProcessState::BackingOff;
                return Err(err);
            }
        }

        match self.wait_for_health_gate() {
            Ok(()) => {
                self.state = ProcessState::Running;
                self.emit(EventKind::ProcessStart, EventStatus::Success, None);
                Ok(())
            }
            Err(err) => {
                self.state = ProcessState::Failed;
                self.emit(EventKind::ProcessCrash, EventStatus::Error, None);
                Err(err)
            }
        }
    }

    fn handle_stop(&mut self, rx: &Receiver<Command>) -> Result<(), SupervisorError> {
        if matches!(self.state, ProcessState::Stopped) || self.instances.is_empty() {
            self.state = ProcessState::Stopped;
            return Ok(());
        }
        self.state = ProcessState::Stopping;

        if let Some(hook) = self
            .spec
            .shutdown
            .as_ref()
            .and_then(|s| s.pre_stop_hook.as_ref())
        {
            run_pre_stop_hook(hook);
        }

        let graceful = self.graceful_signal();
        let escalation = self.escalation_signal();
        let timeout = self.effective_shutdown_timeout();

        for instance in &self.instances {
            if instance.alive {
                instance.send_signal(graceful);
            }
        }

        let mut pending: HashSet<u32> = self
            .instances
            .iter()
            .filter(|i| i.alive)
            .map(|i| i.ordinal)
            .collect();
        let mut deferred = Vec::new();
        let deadline = Instant::now() + timeout;

        while !pending.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match rx.recv_deadline(deadline) {
                Ok(Command::InstanceExited(ordinal, record)) => {
                    self.record_exit(ordinal, record);
                    pending.remove(&ordinal);
                }
                Ok(other) => deferred.push(other),
                Err(_) => break,
            }
        }

        let mut escalated = false;
        if !pending.is_empty() {
            escalated = true;
            for instance in &self.instances {
                if pending.contains(&instance.ordinal) {
                    instance.send_signal(escalation);
                }
            }
            while !pending.is_empty() {
                match rx.recv() {
                    Ok(Command::InstanceExited(ordinal, record)) => {
                        self.record_exit(ordinal, record);
                        pending.remove(&ordinal);
                    }
                    Ok(other) => deferred.push(other),
                    Err(_) => break,
                }
            }
        }

        for cmd in deferred {
            self.dispatch_deferred(cmd);
        }

        self.state = ProcessState::Stopped;
        self.emit(EventKind::ProcessStop, EventStatus::Success, None);

        if escalated {
            Err(SupervisorError::ShutdownTimeout)
        } else {
            Ok(())
        }
    }

    /// Commands that arrived while stop/restart had the queue open for
    /// instance-exit draining are replayed here, fire-and-forget (their
    /// reply channels, if any, are honored so callers don't hang).
    fn dispatch_deferred(&mut self, cmd: Command) {
        match cmd {
            Command::Start(reply) => {
                let _ = reply.send(self.handle_start());
            }
            Command::ScaleTo(n, reply) => {
                let _ = reply.send(self.handle_scale_to(n));
            }
            Command::Adjust(d, reply) => {
                let _ = reply.send(self.handle_adjust(d));
            }
            Command::UpdateSpec(spec, reply) => {
                let _ = reply.send(self.handle_update_spec(*spec));
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.build_snapshot());
            }
            Command::Restart(reply) => {
                let _ = reply.send(Ok(()));
            }
            Command::Stop(reply) => {
                let _ = reply.send(Ok(()));
            }
            Command::RestartInstance(ordinal) => {
                let _ = self.spawn_instance(ordinal);
            }
            Command::InstanceExited(ordinal, record) => {
                self.record_exit(ordinal, record);
            }
            Command::Shutdown => {}
        }
    }

    fn record_exit(&mut self, ordinal: u32, record: ExitRecord) {
        if let Some(instance) = self.instances.iter_mut().find(|i| i.ordinal == ordinal) {
            instance.alive = false;
            instance.pid = None;
            instance.last_exit = Some(record);
        }
    }

    fn handle_restart(&mut self, rx: &Receiver<Command>) -> Result<(), SupervisorError> {
        self.handle_stop(rx).ok();
        self.handle_start()
    }

    fn handle_scale_to(&mut self, desired: u32) -> Result<(), SupervisorError> {
        let max = self.spec.max_scale.filter(|m| *m > 0).unwrap_or(u32::MAX);
        if desired < 1 || desired > max {
            return Err(SupervisorError::InvalidScale(desired, max));
        }
        let current = self.spec.scale;
        self.spec.scale = desired;
        if desired > current {
            for ordinal in current..desired {
                self.spawn_instance(ordinal)?;
            }
        } else if desired < current {
            // Removal selects highest ordinals first (spec §4.4 scaleTo).
            let graceful = self.graceful_signal();
            self.instances
                .retain(|i| {
                    if i.ordinal >= desired {
                        if i.alive {
                            i.send_signal(graceful);
                        }
                        false
                    } else {
                        true
                    }
                });
        }
        self.emit(EventKind::ProcessScale, EventStatus::Success, None);
        Ok(())
    }

    fn handle_adjust(&mut self, delta: i32) -> Result<(), SupervisorError> {
        let current = self.spec.scale as i64;
        let desired = (current + delta as i64).clamp(0, u32::MAX as i64) as u32;
        self.handle_scale_to(desired)
    }

    fn handle_update_spec(&mut self, new_spec: ProcessConfig) -> Result<(), SupervisorError> {
        if new_spec == self.spec {
            return Ok(());
        }
        // stop+start with the new spec; generation increments (spec §4.4
        // `updateSpec`).
        let (tx, rx) = bounded(0);
        drop(tx);
        let _ = self.handle_stop(&rx);
        self.spec = new_spec;
        self.generation += 1;
        self.handle_start()
    }

    fn build_snapshot(&self) -> SupervisorSnapshot {
        SupervisorSnapshot {
            name: self.name.clone(),
            state: self.state,
            desired_scale: self.spec.scale,
            live_instances: self.instances.iter().filter(|i| i.alive).count() as u32,
            generation: self.generation,
            restart_attempts: self.restart_ledger.attempts(),
        }
    }

    /// Decide what to do when an instance exits outside of a Stop/Restart
    /// flow (spec §4.4 "Running -- exit -->").
    fn handle_spontaneous_exit(&mut self, ordinal: u32, record: ExitRecord) {
        // Real elapsed uptime since this instance last (re)started, not a
        // constant — only resets the attempt counter once the instance has
        // actually stayed up for a full success window (spec §4.4 "Restart
        // backoff").
        let uptime = self
            .instances
            .iter()
            .find(|i| i.ordinal == ordinal)
            .and_then(|i| i.started_at)
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO);
        self.restart_ledger.record_uptime(uptime);

        self.record_exit(ordinal, record.clone());

        if matches!(self.state, ProcessState::Stopping | ProcessState::Stopped) {
            return;
        }

        use crate::config::RestartPolicy;
        let should_stop = match self.spec.restart_policy {
            RestartPolicy::Never => true,
            RestartPolicy::OnFailure => record.is_success(),
            RestartPolicy::Always => false,
        };

        if should_stop {
            if self.instances.iter().all(|i| !i.alive) {
                self.state = ProcessState::Stopped;
                self.emit(EventKind::ProcessStop, EventStatus::Success, Some(ordinal));
            }
            return;
        }

        self.state = ProcessState::BackingOff;
        self.emit(EventKind::ProcessCrash, EventStatus::Failure, Some(ordinal));

        match self.restart_ledger.next_backoff() {
            Some(delay) => {
                let self_tx = self.self_tx.clone();
                thread::spawn(move || {
                    thread::sleep(delay);
                    let _ = self_tx.send(Command::RestartInstance(ordinal));
                });
            }
            None => {
                self.state = ProcessState::Failed;
                self.emit(EventKind::ProcessCrash, EventStatus::Error, Some(ordinal));
            }
        }
    }

    fn run(mut self, rx: Receiver<Command>) {
        while let Ok(cmd) = rx.recv() {
            match cmd {
                Command::Start(reply) => {
                    let _ = reply.send(self.handle_start());
                }
                Command::Stop(reply) => {
                    let _ = reply.send(self.handle_stop(&rx));
                }
                Command::Restart(reply) => {
                    let _ = reply.send(self.handle_restart(&rx));
                }
                Command::ScaleTo(n, reply) => {
                    let _ = reply.send(self.handle_scale_to(n));
                }
                Command::Adjust(d, reply) => {
                    let _ = reply.send(self.handle_adjust(d));
                }
                Command::UpdateSpec(spec, reply) => {
                    let _ = reply.send(self.handle_update_spec(*spec));
                }
                Command::Snapshot(reply) => {
                    let _ = reply.send(self.build_snapshot());
                }
                Command::InstanceExited(ordinal, record) => {
                    if matches!(self.state, ProcessState::Starting | ProcessState::Running | ProcessState::Degraded) {
                        self.handle_spontaneous_exit(ordinal, record);
                    } else {
                        self.record_exit(ordinal, record);
                    }
                }
                Command::RestartInstance(ordinal) => {
                    if self.spawn_instance(ordinal).is_ok() {
                        self.state = ProcessState::Starting;
                        if self.wait_for_health_gate().is_ok() {
                            self.state = ProcessState::Running;
                        } else {
                            self.state = ProcessState::Failed;
                        }
                    }
                }
                Command::Shutdown => break,
            }
        }
    }
}

fn run_pre_stop_hook(hook: &crate::config::PreStopHookConfig) {
    let Some((program, args)) = hook.command.split_first() else {
        return;
    };
    let mut command = std::process::Command::new(program);
    command.args(args).envs(&hook.env);
    if let Some(dir) = &hook.working_dir {
        command.current_dir(dir);
    }
    if let Ok(mut child) = command.spawn() {
        let deadline = Instant::now() + hook.timeout.unwrap_or(Duration::from_secs(10));
        loop {
            match child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        break;
                    }
                    thread::sleep(Duration::from_millis(20));
                }
                Err(_) => break,
            }
        }
    }
}

/// Spawn a Supervisor actor thread for `name`/`spec`; returns a handle
/// external callers use to drive it.
pub fn spawn(
    name: impl Into<String>,
    spec: ProcessConfig,
    defaults: SupervisorDefaults,
    sinks: Sinks,
) -> SupervisorHandle {
    let (tx, rx) = bounded(64);
    let self_tx = tx.clone();
    let name = name.into();
    thread::Builder::new()
        .name(format!("supervisor-{name}"))
        .spawn(move || {
            let actor = Actor::new(name, spec, defaults, sinks, self_tx);
            actor.run(rx);
        })
        .expect("failed to spawn supervisor thread");
    SupervisorHandle { tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InitialState, ProcessKind, RestartPolicy};
    use std::collections::HashMap;
    use std::thread;
    use std::time::Duration;

    fn spec(command: Vec<&str>, restart: RestartPolicy) -> ProcessConfig {
        ProcessConfig {
            enabled: true,
            command: command.into_iter().map(String::from).collect(),
            working_dir: None,
            env: HashMap::new(),
            kind: ProcessKind::LongRunning,
            initial_state: InitialState::Running,
            restart_policy: restart,
            scale: 1,
            max_scale: None,
            depends_on: vec![],
            health_check: None,
            shutdown: None,
            schedule: None,
            schedule_timezone: None,
            schedule_timeout: None,
            schedule_max_concurrent: None,
            heartbeat: None,
        }
    }

    #[test]
    fn start_reaches_running_without_health_check() {
        let handle = spawn(
            "sleeper",
            spec(vec!["sleep", "2"], RestartPolicy::Never),
            SupervisorDefaults::default(),
            Sinks::null(),
        );
        handle.start().unwrap();
        let snap = handle.snapshot().unwrap();
        assert_eq!(snap.state as u8, ProcessState::Running as u8);
        handle.stop().unwrap();
    }

    #[test]
    fn s3_stop_escalates_when_child_ignores_sigterm() {
        let handle = spawn(
            "stubborn",
            spec(
                vec!["sh", "-c", "trap '' TERM; sleep 30"],
                RestartPolicy::Never,
            ),
            SupervisorDefaults {
                shutdown_timeout: Duration::from_millis(300),
                ..SupervisorDefaults::default()
            },
            Sinks::null(),
        );
        handle.start().unwrap();
        let before = Instant::now();
        let result = handle.stop();
        let elapsed = before.elapsed();
        assert!(result.is_err());
        assert!(elapsed < Duration::from_secs(2));
    }

    #[test]
    fn scale_to_rejects_out_of_range() {
        let mut s = spec(vec!["sleep", "2"], RestartPolicy::Never);
        s.max_scale = Some(2);
        let handle = spawn("web", s, SupervisorDefaults::default(), Sinks::null());
        assert!(matches!(
            handle.scale_to(5),
            Err(SupervisorError::InvalidScale(5, 2))
        ));
        handle.shutdown_actor();
    }

    #[test]
    fn update_spec_is_a_noop_when_structurally_equal() {
        let s = spec(vec!["sleep", "2"], RestartPolicy::Never);
        let handle = spawn("web", s.clone(), SupervisorDefaults::default(), Sinks::null());
        handle.start().unwrap();
        let before = handle.snapshot().unwrap().generation;
        handle.update_spec(s).unwrap();
        let after = handle.snapshot().unwrap().generation;
        assert_eq!(before, after);
        handle.stop().unwrap();
    }

    #[test]
    fn double_stop_is_idempotent() {
        let handle = spawn(
            "web",
            spec(vec!["sleep", "1"], RestartPolicy::Never),
            SupervisorDefaults::default(),
            Sinks::null(),
        );
        handle.start().unwrap();
        handle.stop().unwrap();
        handle.stop().unwrap();
    }

    #[test]
    fn restart_always_eventually_reaches_failed_after_budget_exhausted() {
        let handle = spawn(
            "crash",
            spec(vec!["false"], RestartPolicy::Always),
            SupervisorDefaults {
                restart_backoff_initial: Duration::from_millis(5),
                restart_backoff_max: Duration::from_millis(20),
                max_restart_attempts: 2,
                success_window: Duration::from_secs(60),
                ..SupervisorDefaults::default()
            },
            Sinks::null(),
        );
        handle.start().unwrap();
        // Allow exits + backoff + re-spawns to play out.
        thread::sleep(Duration::from_millis(500));
        let snap = handle.snapshot().unwrap();
        assert_eq!(snap.state as u8, ProcessState::Failed as u8);
    }
}
