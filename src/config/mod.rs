//! Configuration data model: the validated `ConfigSnapshot` the Manager
//! consumes (spec §3, §6). YAML/env loading and validation are otherwise out
//! of scope for the core per spec §1, but the core owns the recognized-
//! options table and the invariants over it, so the snapshot type and its
//! validation live here.
//!
//! Grounded on `src/config/store.rs` (`SuperAgentConfigStoreFile`) for the
//! loader shape; field names follow spec §6 directly since the teacher has
//! no equivalent schema.

pub mod loader;

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

fn default_scale() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessKind {
    LongRunning,
    OneShot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InitialState {
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    Always,
    OnFailure,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthMode {
    Liveness,
    Readiness,
    Both,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProbeConfig {
    Tcp {
        address: String,
    },
    Http {
        url: String,
        #[serde(default)]
        expected_status: Option<u16>,
    },
    Exec {
        command: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(flatten)]
    pub probe: ProbeConfig,
    #[serde(
        default,
        with = "humantime_serde_opt",
        rename = "initial_delay"
    )]
    pub initial_delay: Option<Duration>,
    #[serde(default, with = "humantime_serde_opt")]
    pub period: Option<Duration>,
    #[serde(default, with = "humantime_serde_opt")]
    pub timeout: Option<Duration>,
    #[serde(default = "default_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_threshold")]
    pub success_threshold: u32,
    #[serde(default = "default_health_mode")]
    pub mode: HealthMode,
}

fn default_threshold() -> u32 {
    3
}

fn default_health_mode() -> HealthMode {
    HealthMode::Both
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PreStopHookConfig {
    pub command: Vec<String>,
    #[serde(default, with = "humantime_serde_opt")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ShutdownConfig {
    #[serde(default)]
    pub signal: Option<String>,
    #[serde(default, with = "humantime_serde_opt")]
    pub timeout: Option<Duration>,
    #[serde(default, rename = "kill_signal")]
    pub kill_signal: Option<String>,
    #[serde(default)]
    pub pre_stop_hook: Option<PreStopHookConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HeartbeatConfig {
    pub url: String,
    #[serde(default, with = "humantime_serde_opt")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub command: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default = "default_kind")]
    pub kind: ProcessKind,
    #[serde(default = "default_initial_state")]
    pub initial_state: InitialState,
    #[serde(default = "default_restart_policy")]
    pub restart_policy: RestartPolicy,
    #[serde(default = "default_scale")]
    pub scale: u32,
    #[serde(default)]
    pub max_scale: Option<u32>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub health_check: Option<HealthCheckConfig>,
    #[serde(default)]
    pub shutdown: Option<ShutdownConfig>,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub schedule_timezone: Option<String>,
    #[serde(default, with = "humantime_serde_opt")]
    pub schedule_timeout: Option<Duration>,
    #[serde(default)]
    pub schedule_max_concurrent: Option<u32>,
    #[serde(default)]
    pub heartbeat: Option<HeartbeatConfig>,
}

fn default_kind() -> ProcessKind {
    ProcessKind::LongRunning
}

fn default_initial_state() -> InitialState {
    InitialState::Running
}

fn default_restart_policy() -> RestartPolicy {
    RestartPolicy::OnFailure
}

/// Structural equality per spec §4.4 `updateSpec`: two specs with the same
/// observable fields are equal regardless of provenance.
impl PartialEq for ProcessConfig {
    fn eq(&self, other: &Self) -> bool {
        self.enabled == other.enabled
            && self.command == other.command
            && self.working_dir == other.working_dir
            && self.env == other.env
            && self.kind == other.kind
            && self.initial_state == other.initial_state
            && self.restart_policy == other.restart_policy
            && self.scale == other.scale
            && self.max_scale == other.max_scale
            && self.depends_on == other.depends_on
            && self.health_check == other.health_check
            && self.shutdown == other.shutdown
            && self.schedule == other.schedule
            && self.schedule_timezone == other.schedule_timezone
            && self.schedule_timeout == other.schedule_timeout
            && self.schedule_max_concurrent == other.schedule_max_concurrent
            && self.heartbeat == other.heartbeat
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlobalOptions {
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    #[serde(default = "default_backoff_initial", with = "humantime_serde")]
    pub restart_backoff_initial: Duration,
    #[serde(default = "default_backoff_max", with = "humantime_serde")]
    pub restart_backoff_max: Duration,
    #[serde(default = "default_max_restart_attempts")]
    pub max_restart_attempts: u32,
    #[serde(default = "default_schedule_history_size")]
    pub schedule_history_size: usize,
    #[serde(default = "default_oneshot_max_entries")]
    pub oneshot_history_max_entries: usize,
    #[serde(default, with = "humantime_serde_opt")]
    pub oneshot_history_max_age: Option<Duration>,
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_backoff_initial() -> Duration {
    Duration::from_secs(1)
}
fn default_backoff_max() -> Duration {
    Duration::from_secs(60)
}
fn default_max_restart_attempts() -> u32 {
    5
}
fn default_schedule_history_size() -> usize {
    100
}
fn default_oneshot_max_entries() -> usize {
    100
}

impl Default for GlobalOptions {
    fn default() -> Self {
        GlobalOptions {
            shutdown_timeout: default_shutdown_timeout(),
            restart_backoff_initial: default_backoff_initial(),
            restart_backoff_max: default_backoff_max(),
            max_restart_attempts: default_max_restart_attempts(),
            schedule_history_size: default_schedule_history_size(),
            oneshot_history_max_entries: default_oneshot_max_entries(),
            oneshot_history_max_age: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSnapshot {
    #[serde(default)]
    pub global: GlobalOptions,
    pub processes: HashMap<String, ProcessConfig>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("process `{0}` has an empty command")]
    EmptyCommand(String),
    #[error("one-shot process `{0}` must have scale == 1")]
    OneShotScale(String),
    #[error("one-shot process `{0}` cannot have restart_policy: always")]
    OneShotAlwaysRestart(String),
    #[error("process `{name}` scale {scale} exceeds max_scale {max_scale}")]
    ScaleExceedsMax {
        name: String,
        scale: u32,
        max_scale: u32,
    },
    #[error("process `{0}` declares a dependency on itself")]
    SelfDep(String),
    #[error("process `{name}` depends on unknown process `{dep}`")]
    DepMissing { name: String, dep: String },
    #[error("process `{0}` has scale == 0")]
    ZeroScale(String),
}

impl ConfigSnapshot {
    /// Runs the structural invariants from spec §3 before a
    /// [`crate::graph::DependencyGraph`] is ever built. Cycle detection is
    /// the graph's job, not this validator's.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, proc) in &self.processes {
            if !proc.enabled {
                continue;
            }
            if proc.command.is_empty() {
                return Err(ConfigError::EmptyCommand(name.clone()));
            }
            if proc.scale == 0 {
                return Err(ConfigError::ZeroScale(name.clone()));
            }
            if matches!(proc.kind, ProcessKind::OneShot) {
                if proc.scale != 1 {
                    return Err(ConfigError::OneShotScale(name.clone()));
                }
                if matches!(proc.restart_policy, RestartPolicy::Always) {
                    return Err(ConfigError::OneShotAlwaysRestart(name.clone()));
                }
            }
            if let Some(max_scale) = proc.max_scale {
                if max_scale > 0 && proc.scale > max_scale {
                    return Err(ConfigError::ScaleExceedsMax {
                        name: name.clone(),
                        scale: proc.scale,
                        max_scale,
                    });
                }
            }
            for dep in &proc.depends_on {
                if dep == name {
                    return Err(ConfigError::SelfDep(name.clone()));
                }
                if !self.processes.contains_key(dep) {
                    return Err(ConfigError::DepMissing {
                        name: name.clone(),
                        dep: dep.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn enabled_processes(&self) -> impl Iterator<Item = (&String, &ProcessConfig)> {
        self.processes.iter().filter(|(_, p)| p.enabled)
    }
}

/// Small `humantime`-flavoured duration (de)serialization helpers so config
/// fields can be written as `"30s"`/`"500ms"` like the teacher's
/// `duration-str`-based fields, without taking on an extra crate beyond what
/// is already in the dependency set.
mod humantime_serde {
    use super::Duration;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        duration_str::parse(&raw).map_err(serde::de::Error::custom)
    }
}

mod humantime_serde_opt {
    use super::Duration;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(raw) => duration_str::parse(&raw)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_process() -> ProcessConfig {
        ProcessConfig {
            enabled: true,
            command: vec!["/bin/true".to_string()],
            working_dir: None,
            env: HashMap::new(),
            kind: ProcessKind::LongRunning,
            initial_state: InitialState::Running,
            restart_policy: RestartPolicy::OnFailure,
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
    fn one_shot_with_scale_gt_1_rejected() {
        let mut p = minimal_process();
        p.kind = ProcessKind::OneShot;
        p.scale = 2;
        let snap = ConfigSnapshot {
            global: GlobalOptions::default(),
            processes: HashMap::from([("job".to_string(), p)]),
        };
        assert_eq!(
            snap.validate(),
            Err(ConfigError::OneShotScale("job".to_string()))
        );
    }

    #[test]
    fn one_shot_with_always_restart_rejected() {
        let mut p = minimal_process();
        p.kind = ProcessKind::OneShot;
        p.restart_policy = RestartPolicy::Always;
        let snap = ConfigSnapshot {
            global: GlobalOptions::default(),
            processes: HashMap::from([("job".to_string(), p)]),
        };
        assert_eq!(
            snap.validate(),
            Err(ConfigError::OneShotAlwaysRestart("job".to_string()))
        );
    }

    #[test]
    fn scale_exceeding_max_scale_rejected() {
        let mut p = minimal_process();
        p.scale = 5;
        p.max_scale = Some(3);
        let snap = ConfigSnapshot {
            global: GlobalOptions::default(),
            processes: HashMap::from([("web".to_string(), p)]),
        };
        assert!(matches!(
            snap.validate(),
            Err(ConfigError::ScaleExceedsMax { .. })
        ));
    }

    #[test]
    fn disabled_process_is_not_validated() {
        let mut p = minimal_process();
        p.enabled = false;
        p.command = vec![];
        let snap = ConfigSnapshot {
            global: GlobalOptions::default(),
            processes: HashMap::from([("off".to_string(), p)]),
        };
        assert_eq!(snap.validate(), Ok(()));
    }

    #[test]
    fn structural_equality_ignores_nothing_but_itself() {
        let a = minimal_process();
        let mut b = minimal_process();
        assert_eq!(a, b);
        b.scale = 2;
        assert_ne!(a, b);
    }
}
