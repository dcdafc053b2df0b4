//! Reconnect-with-backoff state machine used after frame read failures.
//!
//! There is no terminal failure state: every call to [`Reconnector::recover`]
//! ends either with a reopened camera or with a backoff pause, after which the
//! caller simply tries again.

use std::time::Duration;

use tracing::{info, warn};

use crate::source::CameraSource;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Pause between a read failure and the reopen attempt.
    pub retry_delay: Duration,
    /// Additional pause when the reopen attempt also fails.
    pub backoff_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(1),
            backoff_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryOutcome {
    Reopened,
    StillFailed,
    /// The pause callback asked us to stop (shutdown).
    Interrupted,
}

#[derive(Debug)]
pub struct Reconnector {
    policy: ReconnectPolicy,
    consecutive_failures: u32,
    total_attempts: u64,
}

impl Reconnector {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            consecutive_failures: 0,
            total_attempts: 0,
        }
    }

    /// Reopen attempts that failed since the camera was last healthy.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn total_attempts(&self) -> u64 {
        self.total_attempts
    }

    /// Reset the failure streak once frames flow again.
    pub fn mark_healthy(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Release the device, wait, and try to reopen it.
    ///
    /// `pause` performs the actual waiting and returns `false` when the caller
    /// is shutting down, which aborts the recovery.
    pub fn recover<P>(&mut self, camera: &mut CameraSource, mut pause: P) -> RecoveryOutcome
    where
        P: FnMut(Duration) -> bool,
    {
        camera.release();
        if !pause(self.policy.retry_delay) {
            return RecoveryOutcome::Interrupted;
        }

        self.total_attempts = self.total_attempts.saturating_add(1);
        match camera.open() {
            Ok(index) => {
                info!(
                    index,
                    failed_attempts = self.consecutive_failures,
                    "camera reconnected"
                );
                self.consecutive_failures = 0;
                RecoveryOutcome::Reopened
            }
            Err(err) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                warn!(
                    attempt = self.consecutive_failures,
                    backoff_ms = self.policy.backoff_delay.as_millis() as u64,
                    "camera reopen failed: {err}"
                );
                if !pause(self.policy.backoff_delay) {
                    return RecoveryOutcome::Interrupted;
                }
                RecoveryOutcome::StillFailed
            }
        }
    }
}
