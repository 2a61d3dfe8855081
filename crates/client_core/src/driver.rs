use std::{sync::Arc, time::Duration};

use shared::domain::SubmissionState;
use tokio::{
    sync::{oneshot, Mutex},
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::controller::{SessionController, TickOutcome, AUTOSAVE_INTERVAL, TICK_INTERVAL};

#[derive(Debug, Clone, Copy)]
pub struct DriverConfig {
    pub tick_interval: Duration,
    pub autosave_interval: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick_interval: TICK_INTERVAL,
            autosave_interval: AUTOSAVE_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverExit {
    /// The candidate submitted before time ran out.
    Submitted,
    /// The countdown reached zero; the forced submission may or may not have
    /// gone through, see the controller state.
    Expired,
    Shutdown,
    /// The task was aborted or panicked.
    Aborted,
}

/// Runs the countdown and autosave timers for one controller.
pub struct SessionDriver;

impl SessionDriver {
    pub fn spawn(controller: Arc<Mutex<SessionController>>, config: DriverConfig) -> DriverHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run(controller, config, shutdown_rx));
        DriverHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

/// Dropping the handle stops the timers.
pub struct DriverHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<DriverExit>>,
}

impl DriverHandle {
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stops the timers and waits for the task to wind down.
    pub async fn shutdown(mut self) -> DriverExit {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.join().await
    }

    /// Waits for the driver to stop on its own.
    pub async fn finished(mut self) -> DriverExit {
        self.join().await
    }

    async fn join(&mut self) -> DriverExit {
        match self.task.take() {
            Some(task) => task.await.unwrap_or(DriverExit::Aborted),
            None => DriverExit::Aborted,
        }
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(
    controller: Arc<Mutex<SessionController>>,
    config: DriverConfig,
    mut shutdown: oneshot::Receiver<()>,
) -> DriverExit {
    let start = Instant::now();
    let mut countdown = interval_at(start + config.tick_interval, config.tick_interval);
    countdown.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut autosave = interval_at(start + config.autosave_interval, config.autosave_interval);
    autosave.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!("session driver shut down");
                return DriverExit::Shutdown;
            }
            _ = countdown.tick() => {
                let mut controller = controller.lock().await;
                match controller.tick().await {
                    TickOutcome::Expired { submitted } => {
                        info!(submitted, "session driver stopping: time expired");
                        return DriverExit::Expired;
                    }
                    TickOutcome::Inactive => {
                        if let Some(exit) = terminal_exit(&controller) {
                            return exit;
                        }
                    }
                    TickOutcome::Running { .. } | TickOutcome::Warning { .. } => {}
                }
            }
            _ = autosave.tick() => {
                let mut controller = controller.lock().await;
                if let Err(err) = controller.autosave_tick().await {
                    warn!("autosave failed: {err}");
                }
                if let Some(exit) = terminal_exit(&controller) {
                    return exit;
                }
            }
        }
    }
}

fn terminal_exit(controller: &SessionController) -> Option<DriverExit> {
    if controller.state() == SubmissionState::Submitted {
        return Some(DriverExit::Submitted);
    }
    if controller.is_started() && controller.remaining_secs() == 0 {
        return Some(DriverExit::Expired);
    }
    None
}

#[cfg(test)]
#[path = "tests/driver_tests.rs"]
mod tests;
