//! C6 — Signal / PID-1 layer: host signal forwarding and zombie reaping
//! (spec §4.6).
//!
//! Generalizes `src/agent/signal.rs` (SIGTERM/SIGINT only, via a static
//! `AtomicBool` and `libc::signal`) to also register SIGHUP and SIGQUIT, and
//! adds the PID-1 reap loop the teacher has no equivalent of at all.

use crate::context::CancelContext;
pub use crate::runner::OwnedPids;
use libc::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::sync::atomic::{AtomicBool, Ordering::Relaxed};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);
static RELOAD_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Registers SIGTERM/SIGINT/SIGHUP/SIGQUIT handlers and starts the shutdown
/// watcher + (when `pid1` is true) the zombie reaper. Returns the join
/// handles for both background threads.
pub fn install(ctx: CancelContext, owned_pids: OwnedPids, pid1: bool) -> Vec<JoinHandle<()>> {
    register_handlers();

    let mut handles = vec![spawn_shutdown_watcher(ctx)];
    if pid1 {
        handles.push(spawn_reaper(owned_pids));
    }
    handles
}

fn register_handlers() {
    unsafe {
        libc::signal(SIGTERM, handle_shutdown_signal as usize);
        libc::signal(SIGINT, handle_shutdown_signal as usize);
        libc::signal(SIGQUIT, handle_shutdown_signal as usize);
        libc::signal(SIGHUP, handle_reload_signal as usize);
    }
}

extern "C" fn handle_shutdown_signal(_: i32) {
    // Re-register immediately to minimize the window in which a second
    // signal of the same kind could revert to the default disposition.
    register_handlers();
    SHUTDOWN_REQUESTED.store(true, Relaxed);
}

extern "C" fn handle_reload_signal(_: i32) {
    register_handlers();
    RELOAD_REQUESTED.store(true, Relaxed);
}

fn spawn_shutdown_watcher(ctx: CancelContext) -> JoinHandle<()> {
    thread::spawn(move || loop {
        if SHUTDOWN_REQUESTED.swap(false, Relaxed) {
            info!("shutdown signal received, initiating coordinated shutdown");
            ctx.set(true);
            break;
        }
        if RELOAD_REQUESTED.swap(false, Relaxed) {
            debug!("reload signal received; delegating to the config loader");
            // The core only consumes a validated new spec set; actually
            // re-reading the file is the Manager's job once notified.
        }
        thread::sleep(Duration::from_millis(200));
    })
}

/// Continuously reap zombies not claimed by any Instance Runner (spec §4.6:
/// "the reaper only handles PIDs that no runner claims").
fn spawn_reaper(owned_pids: OwnedPids) -> JoinHandle<()> {
    thread::spawn(move || loop {
        // Peek with WNOWAIT first: this reports a terminated child's status
        // without consuming it, so we can check ownership before deciding
        // whether to reap. A plain WNOHANG wait would already have consumed
        // the status, racing an Instance Runner's own `wait()` for the same
        // PID out of its exit code.
        match waitpid(
            Pid::from_raw(-1),
            Some(WaitPidFlag::WNOHANG | WaitPidFlag::WNOWAIT),
        ) {
            Ok(WaitStatus::StillAlive) | Ok(WaitStatus::Continued(_)) => {
                thread::sleep(Duration::from_millis(200));
            }
            Ok(WaitStatus::Exited(pid, _)) | Ok(WaitStatus::Signaled(pid, _, _)) => {
                if owned_pids.is_owned(pid.as_raw()) {
                    // A runner owns this PID and will collect it with its
                    // own targeted wait(); the peek above left it
                    // unconsumed, so just back off and check again later.
                    thread::sleep(Duration::from_millis(20));
                    continue;
                }
                // Nobody claims this one; actually reap it now. The child
                // stays a zombie between the peek and here, so this call
                // observes the same exit and consumes it.
                match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
                    Ok(_) => debug!(pid = pid.as_raw(), "reaped an unclaimed zombie"),
                    Err(err) => warn!(%err, pid = pid.as_raw(), "failed to reap peeked zombie"),
                }
            }
            Ok(_) => {}
            Err(nix::errno::Errno::ECHILD) => {
                thread::sleep(Duration::from_millis(500));
            }
            Err(err) => {
                warn!(%err, "reaper wait failed");
                thread::sleep(Duration::from_millis(500));
            }
        }
    })
}
