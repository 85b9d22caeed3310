//! Error taxonomy for C4, grounded on `src/supervisor/error.rs`'s
//! `ProcessError` shape.

use crate::runner::process::SpawnError;

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("spawn failed: {0}")]
    Spawn(#[from] SpawnError),
    #[error("startup budget exhausted before reaching Running")]
    StartupBudgetExhausted,
    #[error("restart budget exhausted; supervisor is Failed")]
    RestartBudgetExhausted,
    #[error("shutdown exceeded its timeout; escalation signal was used")]
    ShutdownTimeout,
    #[error("requested scale {0} is outside [1, {1}]")]
    InvalidScale(u32, u32),
    #[error("cannot mutate a supervisor that has already shut down")]
    ActorGone,
}
