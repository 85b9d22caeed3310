//! Well-known environment variables injected into every supervised child
//! (spec §6 "Environment variables exported into every child").

use std::time::{SystemTime, UNIX_EPOCH};

/// Identity of the instance a child process is being spawned for.
#[derive(Debug, Clone)]
pub struct InstanceIdentity {
    pub process_name: String,
    pub ordinal: u32,
    /// `Some(run_number)` for scheduled (one-shot) runs, `None` for a
    /// steady-state supervised instance.
    pub scheduled_run: Option<u64>,
    pub schedule: Option<String>,
}

impl InstanceIdentity {
    pub fn instance_id(&self) -> String {
        match self.scheduled_run {
            Some(run) => format!("{}-run-{}", self.process_name, run),
            None => format!("{}-{}", self.process_name, self.ordinal),
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled_run.is_some()
    }
}

/// Build the `PM_*` environment variables for one instance, to be merged
/// over the process's declared `env{}` map. `start_time` is injected rather
/// than read from the OS clock here so callers can use an injected clock
/// (spec §9 "Scheduler clock").
pub fn supervisor_env(identity: &InstanceIdentity, start_time: SystemTime) -> Vec<(String, String)> {
    let start_unix = start_time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    vec![
        ("PM_PROCESS_NAME".to_string(), identity.process_name.clone()),
        (
            "PM_INSTANCE_ORDINAL".to_string(),
            identity.ordinal.to_string(),
        ),
        ("PM_INSTANCE_ID".to_string(), identity.instance_id()),
        (
            "PM_SCHEDULED".to_string(),
            identity.is_scheduled().to_string(),
        ),
        (
            "PM_SCHEDULE".to_string(),
            identity.schedule.clone().unwrap_or_default(),
        ),
        ("PM_START_TIME".to_string(), start_unix.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steady_state_instance_id_uses_ordinal() {
        let identity = InstanceIdentity {
            process_name: "web".to_string(),
            ordinal: 2,
            scheduled_run: None,
            schedule: None,
        };
        assert_eq!(identity.instance_id(), "web-2");
        assert!(!identity.is_scheduled());
    }

    #[test]
    fn scheduled_instance_id_uses_run_number() {
        let identity = InstanceIdentity {
            process_name: "backup".to_string(),
            ordinal: 0,
            scheduled_run: Some(42),
            schedule: Some("0 * * * *".to_string()),
        };
        assert_eq!(identity.instance_id(), "backup-run-42");
        assert!(identity.is_scheduled());
    }

    #[test]
    fn env_vars_carry_expected_keys() {
        let identity = InstanceIdentity {
            process_name: "web".to_string(),
            ordinal: 0,
            scheduled_run: None,
            schedule: None,
        };
        let env = supervisor_env(&identity, UNIX_EPOCH);
        let keys: Vec<&str> = env.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "PM_PROCESS_NAME",
                "PM_INSTANCE_ORDINAL",
                "PM_INSTANCE_ID",
                "PM_SCHEDULED",
                "PM_SCHEDULE",
                "PM_START_TIME",
            ]
        );
        assert_eq!(env[5].1, "0");
    }
}
