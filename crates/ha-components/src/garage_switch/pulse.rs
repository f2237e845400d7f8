//! Momentary relay pulses
//!
//! A pulse switches an output on, optionally holds it for a fixed time, then
//! switches it off again. This is how a wall-console style garage opener is
//! driven: the relay emulates a button press.
//!
//! [`PulseActuator::trigger_nonblocking`] runs the pulse on a background
//! task. Every in-flight task is tracked so [`PulseActuator::shutdown`] can
//! cancel them and wait for them to finish.

use super::driver::ActuatorDriver;
use ha_core::EntityId;
use ha_service_registry::ServiceError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Error)]
pub enum PulseError {
    #[error("trigger entity {0} does not exist")]
    UnknownTarget(EntityId),

    #[error("relay service call failed: {0}")]
    Driver(#[from] ServiceError),
}

/// How an output is pulsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseMode {
    /// On, hold, then off
    Momentary { hold: Duration },
    /// On only; the device releases by itself
    FireOnce,
}

impl PulseMode {
    pub fn hold(&self) -> Option<Duration> {
        match self {
            PulseMode::Momentary { hold } => Some(*hold),
            PulseMode::FireOnce => None,
        }
    }
}

/// What happens to the output when a pulse is cancelled mid-hold
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CancelPolicy {
    /// Stop immediately, no off-command is sent
    #[default]
    SkipRelease,
    /// Still send the off-command before finishing
    ForceRelease,
}

/// Final result of a background pulse
#[derive(Debug, Clone)]
pub enum PulseOutcome {
    Completed,
    Failed(PulseError),
    Cancelled,
}

impl PulseOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, PulseOutcome::Completed)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PulseOutcome::Cancelled)
    }
}

/// Handle to a background pulse
///
/// Dropping it does not affect the pulse.
#[derive(Debug)]
pub struct PulseHandle {
    rx: oneshot::Receiver<PulseOutcome>,
}

impl PulseHandle {
    /// Wait for the pulse to finish
    pub async fn outcome(self) -> PulseOutcome {
        // A task that went away without reporting was torn down
        self.rx.await.unwrap_or(PulseOutcome::Cancelled)
    }
}

struct PulseTask {
    target: EntityId,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

type TaskMap = Arc<Mutex<HashMap<u64, PulseTask>>>;

/// Drives pulses on an [`ActuatorDriver`]
pub struct PulseActuator {
    driver: Arc<dyn ActuatorDriver>,
    mode: PulseMode,
    policy: CancelPolicy,
    tasks: TaskMap,
    next_id: AtomicU64,
}

impl PulseActuator {
    pub fn new(driver: Arc<dyn ActuatorDriver>, mode: PulseMode) -> Self {
        Self {
            driver,
            mode,
            policy: CancelPolicy::default(),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn with_cancel_policy(mut self, policy: CancelPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn mode(&self) -> PulseMode {
        self.mode
    }

    /// Run one pulse to completion on the current task
    ///
    /// No off-command is sent when the on-command fails.
    pub async fn trigger(&self, target: &EntityId) -> Result<(), PulseError> {
        let outcome = run_pulse(
            self.driver.as_ref(),
            target,
            self.mode,
            self.policy,
            &CancellationToken::new(),
        )
        .await;

        match outcome {
            PulseOutcome::Failed(err) => {
                error!(target = %target, %err, "Pulse failed");
                Err(err)
            }
            _ => Ok(()),
        }
    }

    /// Start a pulse on a background task and return immediately
    pub fn trigger_nonblocking(&self, target: EntityId) -> PulseHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let (tx, rx) = oneshot::channel();

        // The map stays locked until the task is recorded, so the task's own
        // removal can't run before the insert
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);

        let handle = tokio::spawn({
            let driver = self.driver.clone();
            let tasks = self.tasks.clone();
            let target = target.clone();
            let cancel = cancel.clone();
            let (mode, policy) = (self.mode, self.policy);
            async move {
                let outcome = run_pulse(driver.as_ref(), &target, mode, policy, &cancel).await;
                match &outcome {
                    PulseOutcome::Completed => debug!(target = %target, "Pulse completed"),
                    PulseOutcome::Cancelled => debug!(target = %target, "Pulse cancelled"),
                    PulseOutcome::Failed(err) => error!(target = %target, %err, "Pulse failed"),
                }

                tasks
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&id);
                let _ = tx.send(outcome);
            }
        });

        tasks.insert(
            id,
            PulseTask {
                target,
                cancel,
                handle,
            },
        );

        PulseHandle { rx }
    }

    /// Number of pulses still running
    pub fn active_count(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Cancel every running pulse and wait until all of them have stopped
    pub async fn shutdown(&self) {
        let tasks: Vec<PulseTask> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, task)| task)
            .collect();

        if tasks.is_empty() {
            return;
        }

        info!(count = tasks.len(), "Cancelling active pulses");
        for task in &tasks {
            task.cancel.cancel();
        }

        for task in tasks {
            if let Err(err) = task.handle.await {
                debug!(target = %task.target, %err, "Pulse task ended abnormally");
            }
        }
    }
}

async fn run_pulse(
    driver: &dyn ActuatorDriver,
    target: &EntityId,
    mode: PulseMode,
    policy: CancelPolicy,
    cancel: &CancellationToken,
) -> PulseOutcome {
    if cancel.is_cancelled() {
        return PulseOutcome::Cancelled;
    }

    debug!(target = %target, ?mode, "Pulse on");
    if let Err(err) = driver.activate(target).await {
        return PulseOutcome::Failed(err);
    }

    let Some(hold) = mode.hold() else {
        return PulseOutcome::Completed;
    };

    let interrupted = tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(hold) => cancel.is_cancelled(),
    };

    if interrupted {
        if policy == CancelPolicy::ForceRelease {
            if let Err(err) = driver.deactivate(target).await {
                warn!(target = %target, %err, "Release after cancel failed");
            }
        }
        return PulseOutcome::Cancelled;
    }

    debug!(target = %target, "Pulse off");
    match driver.deactivate(target).await {
        Ok(()) => PulseOutcome::Completed,
        Err(err) => PulseOutcome::Failed(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Instant;

    #[derive(Debug, Clone, PartialEq)]
    enum Command {
        On(String),
        Off(String),
    }

    #[derive(Default)]
    struct RecordingDriver {
        commands: Mutex<Vec<(Command, Instant)>>,
        fail_on: bool,
    }

    impl RecordingDriver {
        fn commands(&self) -> Vec<Command> {
            self.commands
                .lock()
                .unwrap()
                .iter()
                .map(|(c, _)| c.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ActuatorDriver for RecordingDriver {
        async fn activate(&self, target: &EntityId) -> Result<(), PulseError> {
            if self.fail_on {
                return Err(PulseError::UnknownTarget(target.clone()));
            }
            self.commands
                .lock()
                .unwrap()
                .push((Command::On(target.to_string()), Instant::now()));
            Ok(())
        }

        async fn deactivate(&self, target: &EntityId) -> Result<(), PulseError> {
            self.commands
                .lock()
                .unwrap()
                .push((Command::Off(target.to_string()), Instant::now()));
            Ok(())
        }
    }

    fn relay() -> EntityId {
        "switch.relay1".parse().unwrap()
    }

    fn momentary(ms: u64) -> PulseMode {
        PulseMode::Momentary {
            hold: Duration::from_millis(ms),
        }
    }

    #[tokio::test]
    async fn test_trigger_holds_then_releases() {
        let driver = Arc::new(RecordingDriver::default());
        let actuator = PulseActuator::new(driver.clone(), momentary(50));

        actuator.trigger(&relay()).await.unwrap();

        let commands = driver.commands.lock().unwrap().clone();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].0, Command::On("switch.relay1".into()));
        assert_eq!(commands[1].0, Command::Off("switch.relay1".into()));
        assert!(commands[1].1 - commands[0].1 >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_fire_once_sends_only_on() {
        let driver = Arc::new(RecordingDriver::default());
        let actuator = PulseActuator::new(driver.clone(), PulseMode::FireOnce);

        actuator.trigger(&relay()).await.unwrap();

        assert_eq!(
            driver.commands(),
            vec![Command::On("switch.relay1".into())]
        );
    }

    #[tokio::test]
    async fn test_failed_on_sends_no_off() {
        let driver = Arc::new(RecordingDriver {
            fail_on: true,
            ..Default::default()
        });
        let actuator = PulseActuator::new(driver.clone(), momentary(10));

        let result = actuator.trigger(&relay()).await;
        assert!(matches!(result, Err(PulseError::UnknownTarget(_))));
        assert!(driver.commands().is_empty());

        let outcome = actuator.trigger_nonblocking(relay()).outcome().await;
        assert!(matches!(outcome, PulseOutcome::Failed(_)));
        assert!(driver.commands().is_empty());
        assert_eq!(actuator.active_count(), 0);
    }

    #[tokio::test]
    async fn test_nonblocking_completes_and_untracks() {
        let driver = Arc::new(RecordingDriver::default());
        let actuator = PulseActuator::new(driver.clone(), momentary(20));

        let handle = actuator.trigger_nonblocking(relay());
        assert_eq!(actuator.active_count(), 1);

        assert!(handle.outcome().await.is_completed());
        assert_eq!(actuator.active_count(), 0);
        assert_eq!(driver.commands().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_pulses_on_same_target() {
        let driver = Arc::new(RecordingDriver::default());
        let actuator = PulseActuator::new(driver.clone(), momentary(20));

        let first = actuator.trigger_nonblocking(relay());
        let second = actuator.trigger_nonblocking(relay());
        assert_eq!(actuator.active_count(), 2);

        assert!(first.outcome().await.is_completed());
        assert!(second.outcome().await.is_completed());
        assert_eq!(driver.commands().len(), 4);
    }

    #[tokio::test]
    async fn test_cancel_mid_hold_skips_release() {
        let driver = Arc::new(RecordingDriver::default());
        let actuator = PulseActuator::new(driver.clone(), momentary(5_000));

        let handle = actuator.trigger_nonblocking(relay());
        tokio::time::sleep(Duration::from_millis(30)).await;
        actuator.shutdown().await;

        assert!(handle.outcome().await.is_cancelled());
        assert_eq!(
            driver.commands(),
            vec![Command::On("switch.relay1".into())]
        );
    }

    #[tokio::test]
    async fn test_cancel_mid_hold_force_release() {
        let driver = Arc::new(RecordingDriver::default());
        let actuator = PulseActuator::new(driver.clone(), momentary(5_000))
            .with_cancel_policy(CancelPolicy::ForceRelease);

        let handle = actuator.trigger_nonblocking(relay());
        tokio::time::sleep(Duration::from_millis(30)).await;
        actuator.shutdown().await;

        assert!(handle.outcome().await.is_cancelled());
        assert_eq!(
            driver.commands(),
            vec![
                Command::On("switch.relay1".into()),
                Command::Off("switch.relay1".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_shutdown_empties_active_set() {
        let driver = Arc::new(RecordingDriver::default());
        let actuator = PulseActuator::new(driver.clone(), momentary(5_000));

        let handles: Vec<_> = (0..3).map(|_| actuator.trigger_nonblocking(relay())).collect();
        assert_eq!(actuator.active_count(), 3);

        let started = Instant::now();
        actuator.shutdown().await;
        assert_eq!(actuator.active_count(), 0);
        assert!(started.elapsed() < Duration::from_secs(1));

        for handle in handles {
            assert!(handle.outcome().await.is_cancelled());
        }

        // Nothing left to cancel
        actuator.shutdown().await;
    }
}
