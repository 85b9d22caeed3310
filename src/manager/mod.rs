//! C7 — Manager: orchestrates the whole fleet (spec §4.7).
//!
//! Generalizes `src/agent/supervisor_group.rs`'s `SupervisorGroupWithoutOpAMP
//! <HashMap<AgentID, Vec<SupervisorRunner<S>>>>` from a map of static runner
//! vectors to a map of live [`crate::supervisor::SupervisorHandle`]s, adding
//! dependency-ordered startup/shutdown, dynamic add/update/remove, and the
//! error isolation the teacher's fixed-at-boot fleet never needed.

use crate::config::{ConfigError, ConfigSnapshot, ProcessConfig};
use crate::graph::{DependencyGraph, GraphError};
use crate::runner::OwnedPids;
use crate::scheduler::{HeartbeatConfig as SchedHeartbeat, ScheduleJob, SchedulerError};
use crate::sinks::{Event, EventKind, EventStatus, Sinks};
use crate::supervisor::{self, SupervisorDefaults, SupervisorError, SupervisorHandle, SupervisorSnapshot};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("process `{0}` already exists")]
    AlreadyExists(String),
    #[error("process `{0}` not found")]
    NotFound(String),
    #[error("process `{name}` still has dependents: {dependents:?}")]
    HasDependents { name: String, dependents: Vec<String> },
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A started process: its Supervisor handle plus, when scheduled, its
/// driver job and background thread.
struct ManagedProcess {
    spec: ProcessConfig,
    handle: SupervisorHandle,
    schedule_job: Option<Arc<ScheduleJob>>,
    /// Whether this process should be Running once its prerequisites are;
    /// distinct from whether it is Running *right now* (spec §4.7
    /// `addProcess`: "remain Idle until prerequisites become Running").
    want_running: bool,
}

/// Orchestrates C1-C6 (spec §4.7): owns the dependency graph and the map of
/// live Supervisors exclusively; everything else reaches a process only
/// through this type.
pub struct Manager {
    defaults: SupervisorDefaults,
    sinks: Sinks,
    graph: DependencyGraph,
    processes: HashMap<String, ManagedProcess>,
    oneshot_history_max_entries: usize,
    oneshot_history_max_age: Option<Duration>,
    startup_order: Vec<String>,
    owned_pids: OwnedPids,
}

/// What happened when a single process's startup step ran, for the
/// caller-visible per-process outcome report (spec §4.7 step 2: "record
/// failure and continue with independent branches").
#[derive(Debug, Clone)]
pub struct StartupOutcome {
    pub name: String,
    pub ok: bool,
}

impl Manager {
    pub fn new(snapshot: &ConfigSnapshot, sinks: Sinks) -> Result<Self, ManagerError> {
        snapshot.validate()?;

        let defaults = SupervisorDefaults {
            shutdown_timeout: snapshot.global.shutdown_timeout,
            restart_backoff_initial: snapshot.global.restart_backoff_initial,
            restart_backoff_max: snapshot.global.restart_backoff_max,
            max_restart_attempts: snapshot.global.max_restart_attempts,
            success_window: Duration::from_secs(60),
            log_capacity: 200,
            ..SupervisorDefaults::default()
        };

        let edges: Vec<(String, Vec<String>)> = snapshot
            .enabled_processes()
            .map(|(name, spec)| (name.clone(), spec.depends_on.clone()))
            .collect();
        let graph = DependencyGraph::build(edges)?;
        graph.validate()?;

        Ok(Manager {
            defaults,
            sinks,
            graph,
            processes: HashMap::new(),
            oneshot_history_max_entries: snapshot.global.oneshot_history_max_entries,
            oneshot_history_max_age: snapshot.global.oneshot_history_max_age,
            startup_order: Vec::new(),
            owned_pids: OwnedPids::new(),
        })
    }

    /// Share the reaper's PID registry (spec §4.6, §9) across every
    /// Supervisor and ScheduleJob this manager creates, instead of each
    /// defaulting to its own empty registry. Call before [`Manager::startup`].
    pub fn with_owned_pids(mut self, owned_pids: OwnedPids) -> Self {
        self.defaults.owned_pids = owned_pids.clone();
        self.owned_pids = owned_pids;
        self
    }

    /// Topologically orders enabled specs, creates and starts each
    /// Supervisor in turn; a failed start is recorded and does not halt
    /// independent branches (spec §4.7 "Startup").
    pub fn startup(&mut self, snapshot: &ConfigSnapshot) -> Result<Vec<StartupOutcome>, ManagerError> {
        let order = self.graph.topological_order()?;
        self.startup_order = order.clone();

        self.sinks.emit(Event::new(
            EventKind::SystemStart,
            "manager",
            EventStatus::Success,
        ));

        let mut outcomes = Vec::with_capacity(order.len());
        for name in &order {
            let Some(spec) = snapshot.processes.get(name) else {
                continue;
            };
            if !spec.enabled {
                continue;
            }

            let failed_dep = spec.depends_on.iter().find(|dep| {
                self.processes
                    .get(dep.as_str())
                    .map(|p| !matches!(p.handle.snapshot().map(|s| s.state), Ok(crate::supervisor::ProcessState::Running) | Ok(crate::supervisor::ProcessState::Stopped)))
                    .unwrap_or(true)
            });
            if let Some(dep) = failed_dep {
                outcomes.push(StartupOutcome {
                    name: name.clone(),
                    ok: false,
                });
                tracing::warn!(process = %name, dependency = %dep, "skipping start: dependency did not reach a runnable state");
                continue;
            }

            let start_now = matches!(spec.initial_state, crate::config::InitialState::Running);
            let ok = self.create_and_start(name, spec.clone(), start_now).is_ok();
            outcomes.push(StartupOutcome {
                name: name.clone(),
                ok,
            });
        }

        Ok(outcomes)
    }

    fn create_and_start(&mut self, name: &str, spec: ProcessConfig, start_now: bool) -> Result<(), ManagerError> {
        let want_running = matches!(spec.initial_state, crate::config::InitialState::Running);
        let handle = supervisor::spawn(name, spec.clone(), self.defaults.clone(), self.sinks.clone());

        let schedule_job = match &spec.schedule {
            Some(cron_expr) => {
                let job = Arc::new(
                    ScheduleJob::new(
                        name,
                        cron_expr,
                        spec.schedule_timezone.as_deref().unwrap_or("UTC"),
                        spec.schedule_timeout,
                        spec.schedule_max_concurrent.unwrap_or(1),
                        spec.heartbeat.as_ref().map(|h| SchedHeartbeat {
                            url: h.url.clone(),
                            timeout: h.timeout.unwrap_or(Duration::from_secs(5)),
                        }),
                        self.oneshot_history_max_entries,
                        self.oneshot_history_max_age,
                    )?
                    .with_owned_pids(self.owned_pids.clone()),
                );
                job.spawn_driver(spec.command.clone(), spec.env.clone(), spec.working_dir.clone());
                Some(job)
            }
            None => None,
        };

        if spec.schedule.is_none() && start_now {
            handle.start()?;
        }

        self.processes.insert(
            name.to_string(),
            ManagedProcess {
                spec,
                handle,
                schedule_job,
                want_running,
            },
        );
        Ok(())
    }

    fn is_running(&self, name: &str) -> bool {
        self.processes
            .get(name)
            .map(|p| matches!(p.handle.snapshot().map(|s| s.state), Ok(crate::supervisor::ProcessState::Running)))
            .unwrap_or(false)
    }

    /// `addProcess(spec)` (spec §4.7 "Dynamic mutation").
    pub fn add_process(&mut self, name: &str, spec: ProcessConfig) -> Result<(), ManagerError> {
        if self.processes.contains_key(name) {
            return Err(ManagerError::AlreadyExists(name.to_string()));
        }
        self.graph.insert(name, spec.depends_on.clone())?;
        self.graph.validate()?;

        let deps_running = spec.depends_on.iter().all(|dep| self.is_running(dep));
        let want_running = matches!(spec.initial_state, crate::config::InitialState::Running);
        let start_now = deps_running && want_running;
        self.create_and_start(name, spec, start_now)?;
        self.cascade_start_dependents();
        Ok(())
    }

    /// Starts `name` directly (e.g. an operator-driven start of a
    /// previously Idle process), then starts any dependents whose
    /// prerequisites are now all satisfied, transitively (spec §9 scenario
    /// S6: "starting `a` then causes `c` to start").
    pub fn start_process(&mut self, name: &str) -> Result<(), ManagerError> {
        let proc = self
            .processes
            .get(name)
            .ok_or_else(|| ManagerError::NotFound(name.to_string()))?;
        proc.handle.start()?;
        self.cascade_start_dependents();
        Ok(())
    }

    /// Stops `name` directly (e.g. an operator-driven stop), mirroring
    /// [`Manager::start_process`]. Dependents are left running; callers that
    /// want a cascaded stop should walk dependents themselves via
    /// [`Manager::remove_process`]'s dependents check or their own ordering.
    pub fn stop_process(&mut self, name: &str) -> Result<(), ManagerError> {
        let proc = self
            .processes
            .get(name)
            .ok_or_else(|| ManagerError::NotFound(name.to_string()))?;
        proc.handle.stop()?;
        Ok(())
    }

    fn cascade_start_dependents(&mut self) {
        loop {
            let startable: Vec<String> = self
                .processes
                .iter()
                .filter(|(_, p)| {
                    p.want_running
                        && p.schedule_job.is_none()
                        && !matches!(
                            p.handle.snapshot().map(|s| s.state),
                            Ok(crate::supervisor::ProcessState::Running)
                                | Ok(crate::supervisor::ProcessState::Starting)
                        )
                })
                .filter(|(_, p)| p.spec.depends_on.iter().all(|dep| self.is_running(dep)))
                .map(|(name, _)| name.clone())
                .collect();

            if startable.is_empty() {
                break;
            }
            for name in &startable {
                if let Some(proc) = self.processes.get(name) {
                    let _ = proc.handle.start();
                }
            }
        }
    }

    /// `updateProcess(name, spec)`: structural diff; no-op if unchanged,
    /// otherwise stop+start with the new spec/edges (spec §4.7).
    pub fn update_process(&mut self, name: &str, spec: ProcessConfig) -> Result<(), ManagerError> {
        let proc = self
            .processes
            .get(name)
            .ok_or_else(|| ManagerError::NotFound(name.to_string()))?;
        if proc.spec == spec {
            return Ok(());
        }

        self.graph.remove(name);
        self.graph.insert(name, spec.depends_on.clone())?;
        self.graph.validate()?;

        let proc = self.processes.get_mut(name).expect("checked above");
        proc.handle.update_spec(spec.clone())?;
        proc.spec = spec;
        Ok(())
    }

    /// `removeProcess(name)`: reject if still depended upon; stop and drop.
    pub fn remove_process(&mut self, name: &str) -> Result<(), ManagerError> {
        if !self.processes.contains_key(name) {
            return Err(ManagerError::NotFound(name.to_string()));
        }
        let dependents: Vec<String> = self
            .processes
            .iter()
            .filter(|(other, p)| *other != name && p.spec.depends_on.iter().any(|d| d == name))
            .map(|(other, _)| other.clone())
            .collect();
        if !dependents.is_empty() {
            return Err(ManagerError::HasDependents {
                name: name.to_string(),
                dependents,
            });
        }

        if let Some(proc) = self.processes.remove(name) {
            let _ = proc.handle.stop();
            proc.handle.shutdown_actor();
        }
        self.graph.remove(name);
        Ok(())
    }

    pub fn snapshot(&self, name: &str) -> Result<SupervisorSnapshot, ManagerError> {
        self.processes
            .get(name)
            .ok_or_else(|| ManagerError::NotFound(name.to_string()))?
            .handle
            .snapshot()
            .map_err(ManagerError::from)
    }

    pub fn snapshots(&self) -> Vec<SupervisorSnapshot> {
        self.processes
            .values()
            .filter_map(|p| p.handle.snapshot().ok())
            .collect()
    }

    /// Reverse topological order, each supervisor stopped in sequence,
    /// bounded by `deadline`; a supervisor exceeding its own timeout is
    /// forcibly moved past so shutdown keeps progressing (spec §4.7
    /// "Shutdown").
    pub fn shutdown(&mut self, deadline: Duration) {
        let order = self
            .graph
            .reverse_topological_order()
            .unwrap_or_else(|_| self.startup_order.iter().rev().cloned().collect());

        let global_deadline = Instant::now() + deadline;
        for name in &order {
            if Instant::now() >= global_deadline {
                tracing::warn!("global shutdown deadline exceeded; remaining supervisors forced past");
            }
            if let Some(proc) = self.processes.get(name) {
                if let Err(err) = proc.handle.stop() {
                    tracing::warn!(process = %name, %err, "supervisor exceeded its own shutdown timeout; continuing");
                }
                if let Some(job) = &proc.schedule_job {
                    job.pause();
                }
                proc.handle.shutdown_actor();
            }
        }

        self.sinks.emit(Event::new(
            EventKind::SystemShutdown,
            "manager",
            EventStatus::Success,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GlobalOptions, InitialState, ProcessKind, RestartPolicy};

    fn proc(command: Vec<&str>, depends_on: Vec<&str>) -> ProcessConfig {
        ProcessConfig {
            enabled: true,
            command: command.into_iter().map(String::from).collect(),
            working_dir: None,
            env: HashMap::new(),
            kind: ProcessKind::LongRunning,
            initial_state: InitialState::Running,
            restart_policy: RestartPolicy::Never,
            scale: 1,
            max_scale: None,
            depends_on: depends_on.into_iter().map(String::from).collect(),
            health_check: None,
            shutdown: None,
            schedule: None,
            schedule_timezone: None,
            schedule_timeout: None,
            schedule_max_concurrent: None,
            heartbeat: None,
        }
    }

    fn snapshot(processes: Vec<(&str, ProcessConfig)>) -> ConfigSnapshot {
        ConfigSnapshot {
            global: GlobalOptions::default(),
            processes: processes
                .into_iter()
                .map(|(n, p)| (n.to_string(), p))
                .collect(),
        }
    }

    #[test]
    fn s1_startup_follows_topological_order() {
        let snap = snapshot(vec![
            ("a", proc(vec!["sleep", "2"], vec![])),
            ("b", proc(vec!["sleep", "2"], vec!["a"])),
        ]);
        let mut mgr = Manager::new(&snap, Sinks::null()).unwrap();
        let outcomes = mgr.startup(&snap).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].name, "a");
        assert_eq!(outcomes[1].name, "b");
        assert!(outcomes.iter().all(|o| o.ok));
        mgr.shutdown(Duration::from_secs(5));
    }

    #[test]
    fn remove_process_rejected_while_dependents_remain() {
        let snap = snapshot(vec![
            ("a", proc(vec!["sleep", "2"], vec![])),
            ("b", proc(vec!["sleep", "2"], vec!["a"])),
        ]);
        let mut mgr = Manager::new(&snap, Sinks::null()).unwrap();
        mgr.startup(&snap).unwrap();
        assert!(matches!(
            mgr.remove_process("a"),
            Err(ManagerError::HasDependents { .. })
        ));
        mgr.shutdown(Duration::from_secs(5));
    }

    #[test]
    fn add_process_rejects_duplicate_name() {
        let snap = snapshot(vec![("a", proc(vec!["sleep", "2"], vec![]))]);
        let mut mgr = Manager::new(&snap, Sinks::null()).unwrap();
        mgr.startup(&snap).unwrap();
        assert!(matches!(
            mgr.add_process("a", proc(vec!["sleep", "2"], vec![])),
            Err(ManagerError::AlreadyExists(_))
        ));
        mgr.shutdown(Duration::from_secs(5));
    }

    #[test]
    fn update_process_is_a_noop_for_an_identical_spec() {
        let p = proc(vec!["sleep", "2"], vec![]);
        let snap = snapshot(vec![("a", p.clone())]);
        let mut mgr = Manager::new(&snap, Sinks::null()).unwrap();
        mgr.startup(&snap).unwrap();
        let before = mgr.snapshot("a").unwrap().generation;
        mgr.update_process("a", p).unwrap();
        let after = mgr.snapshot("a").unwrap().generation;
        assert_eq!(before, after);
        mgr.shutdown(Duration::from_secs(5));
    }
}
