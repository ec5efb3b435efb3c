//! Maintenance lock session
//!
//! A [`LockSession`] drives one lock lifecycle against a Bitbucket server:
//!
//! ```text
//! Unlocked -> Acquiring(stage) -> Locked -> Released
//!                    |
//!                    +-> Failed(stage)
//! ```
//!
//! Acquisition takes the maintenance lock, starts an external backup and
//! waits until the database and SCM subsystems report `DRAINED`. While locked
//! the caller reports backup progress; release reports completion and drops
//! the lock. Sessions are single-use: a released or failed session refuses
//! to acquire again.

use std::{fmt, future::Future};

use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::{
    config::{DrainPolicy, LockClientConfig},
    constants::{
        MAINTENANCE_TOKEN_HEADER, PROGRESS_COMPLETE, PROGRESS_MAX, PROGRESS_MIN, STATUS_ACCEPTED,
        STATUS_OK, maintenance_api_path,
    },
    error::{LockError, Result},
    http::{ApiRequest, ApiResponse, HttpTransport, Transport},
    model::{BackupResponse, LockResponse, MaintenanceStatus},
};

/// Step of acquisition in progress, or the step that failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireStage {
    RequestingLock,
    StartingBackup,
    Draining,
}

impl fmt::Display for AcquireStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquireStage::RequestingLock => f.write_str("requesting lock"),
            AcquireStage::StartingBackup => f.write_str("starting backup"),
            AcquireStage::Draining => f.write_str("waiting for drain"),
        }
    }
}

/// Lifecycle state of a [`LockSession`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Unlocked,
    Acquiring(AcquireStage),
    Locked,
    Released,
    Failed(AcquireStage),
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Unlocked => f.write_str("unlocked"),
            SessionState::Acquiring(stage) => write!(f, "acquiring ({})", stage),
            SessionState::Locked => f.write_str("locked"),
            SessionState::Released => f.write_str("released"),
            SessionState::Failed(stage) => write!(f, "failed ({})", stage),
        }
    }
}

/// Client side handle for one maintenance lock lifecycle
pub struct LockSession {
    transport: Box<dyn Transport>,
    drain: DrainPolicy,
    state: SessionState,
    unlock_token: Option<String>,
    cancel_token: Option<String>,
    current_percentage: u8,
}

impl LockSession {
    /// Create a session talking HTTP to the configured server
    pub fn new(config: LockClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(transport, config.drain))
    }

    /// Create a session on top of a custom transport
    pub fn with_transport(transport: impl Transport + 'static, drain: DrainPolicy) -> Self {
        Self {
            transport: Box::new(transport),
            drain,
            state: SessionState::Unlocked,
            unlock_token: None,
            cancel_token: None,
            current_percentage: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_locked(&self) -> bool {
        self.state == SessionState::Locked
    }

    /// Last progress accepted by the server
    pub fn current_percentage(&self) -> u8 {
        self.current_percentage
    }

    /// Unlock token captured so far, whatever the state.
    ///
    /// After a failed acquisition the server may still hold the lock; this
    /// token is what an operator needs to release it by hand.
    pub fn pending_unlock_token(&self) -> Option<&str> {
        self.unlock_token.as_deref()
    }

    /// Token required to modify or release the lock
    pub fn unlock_token(&self) -> Result<&str> {
        self.locked_token(self.unlock_token.as_deref(), "read unlock token")
    }

    /// Token permitting the running backup to be cancelled
    pub fn cancel_token(&self) -> Result<&str> {
        self.locked_token(self.cancel_token.as_deref(), "read cancel token")
    }

    /// Take the maintenance lock, start the backup and wait for drain
    pub async fn acquire(&mut self) -> Result<()> {
        self.acquire_with_cancel(std::future::pending()).await
    }

    /// Like [`acquire`](Self::acquire), aborting with [`LockError::Cancelled`]
    /// as soon as `cancel` completes.
    pub async fn acquire_with_cancel<C>(&mut self, cancel: C) -> Result<()>
    where
        C: Future<Output = ()>,
    {
        self.ensure_state(SessionState::Unlocked, "acquire lock")?;
        info!("Acquiring maintenance lock");

        let result = tokio::select! {
            result = self.run_acquire() => result,
            () = cancel => Err(LockError::Cancelled),
        };

        match result {
            Ok(()) => {
                self.state = SessionState::Locked;
                info!("Maintenance lock acquired, subsystems drained");
                Ok(())
            }
            Err(e) => {
                if let SessionState::Acquiring(stage) = self.state {
                    self.state = SessionState::Failed(stage);
                }
                warn!(state = %self.state, error = %e, "Maintenance lock acquisition failed");
                Err(e)
            }
        }
    }

    /// Report backup progress, visible to users in the web UI.
    ///
    /// 100 is reserved for [`release`](Self::release).
    pub async fn set_progress(&mut self, percentage: i32) -> Result<()> {
        self.ensure_state(SessionState::Locked, "set progress")?;

        let value = u8::try_from(percentage)
            .ok()
            .filter(|p| (PROGRESS_MIN..=PROGRESS_MAX).contains(&i32::from(*p)))
            .ok_or(LockError::OutOfRange { percentage })?;
        if value < self.current_percentage {
            return Err(LockError::Regression {
                percentage,
                current: self.current_percentage,
            });
        }

        self.report_progress(value).await?;
        self.current_percentage = value;
        Ok(())
    }

    /// Report completion and drop the maintenance lock.
    ///
    /// The session stays locked if either call fails, so release may be retried.
    pub async fn release(&mut self) -> Result<()> {
        self.ensure_state(SessionState::Locked, "release lock")?;
        info!("Releasing maintenance lock");

        self.report_progress(PROGRESS_COMPLETE).await?;
        self.current_percentage = PROGRESS_COMPLETE;

        self.delete_lock().await?;
        self.state = SessionState::Released;
        info!("Maintenance lock released");
        Ok(())
    }

    /// Drop a lock left behind by a failed or interrupted acquisition.
    ///
    /// Only the lock is deleted; no progress is reported. Runs when the lock
    /// was granted but acquisition did not complete.
    pub async fn abort(&mut self) -> Result<()> {
        let abortable = matches!(
            self.state,
            SessionState::Failed(AcquireStage::StartingBackup | AcquireStage::Draining)
                | SessionState::Acquiring(AcquireStage::StartingBackup | AcquireStage::Draining)
        );
        if !abortable || self.unlock_token.is_none() {
            return Err(LockError::State {
                operation: "abort lock",
                state: self.state,
            });
        }
        info!(state = %self.state, "Aborting maintenance lock");

        self.delete_lock().await?;
        self.state = SessionState::Released;
        info!("Maintenance lock aborted");
        Ok(())
    }

    /// Acquire, await `work`, then release whatever the work produced
    pub async fn locked<F>(&mut self, work: F) -> Result<F::Output>
    where
        F: Future,
    {
        self.acquire().await?;
        let output = work.await;
        self.release().await?;
        Ok(output)
    }

    /// Fetch the current database and SCM maintenance states
    pub async fn maintenance_status(&self) -> Result<MaintenanceStatus> {
        const ACTION: &str = "polling maintenance status";

        let request = ApiRequest::get(maintenance_api_path::STATUS)
            .with_maintenance_token(self.unlock_token.as_deref());
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            warn!(status = response.status, "Unexpected return code when {}", ACTION);
            return Err(LockError::Rest {
                action: ACTION,
                expected: STATUS_OK,
                status: response.status,
            });
        }
        response.json(ACTION)
    }

    async fn run_acquire(&mut self) -> Result<()> {
        self.state = SessionState::Acquiring(AcquireStage::RequestingLock);
        self.initiate_lock().await?;

        self.state = SessionState::Acquiring(AcquireStage::StartingBackup);
        self.initiate_backup().await?;

        self.state = SessionState::Acquiring(AcquireStage::Draining);
        self.wait_for_drain().await
    }

    async fn initiate_lock(&mut self) -> Result<()> {
        const ACTION: &str = "initiating lock";

        let response = self
            .transport
            .send(ApiRequest::post(maintenance_api_path::LOCK))
            .await?;
        check_status(&response, ACTION, STATUS_ACCEPTED)?;

        let body: LockResponse = response.json(ACTION)?;
        self.unlock_token = Some(body.unlock_token);
        debug!(
            header = MAINTENANCE_TOKEN_HEADER,
            "Lock granted, unlock token attached to subsequent requests"
        );
        Ok(())
    }

    async fn initiate_backup(&mut self) -> Result<()> {
        const ACTION: &str = "initiating backup process";

        let request = ApiRequest::post(maintenance_api_path::BACKUP)
            .with_query("external", "true")
            .with_maintenance_token(self.unlock_token.as_deref());
        let response = self.transport.send(request).await?;
        check_status(&response, ACTION, STATUS_ACCEPTED)?;

        let body: BackupResponse = response.json(ACTION)?;
        self.cancel_token = Some(body.cancel_token);
        debug!("External backup started");
        Ok(())
    }

    async fn wait_for_drain(&self) -> Result<()> {
        let started = Instant::now();
        let mut interval = self.drain.initial_interval;
        let mut polls: u32 = 0;

        loop {
            let wait = match self.drain.timeout {
                Some(timeout) => interval.min(timeout.saturating_sub(started.elapsed())),
                None => interval,
            };
            sleep(wait).await;

            let status = self.maintenance_status().await?;
            polls += 1;
            if status.is_drained() {
                debug!(polls, "Subsystems drained");
                return Ok(());
            }
            debug!(
                polls,
                db_state = %status.db_state,
                scm_state = %status.scm_state,
                "Waiting for subsystems to drain"
            );

            if let Some(timeout) = self.drain.timeout
                && started.elapsed() >= timeout
            {
                let elapsed = started.elapsed();
                warn!(polls, ?elapsed, "Drain wait timed out");
                return Err(LockError::DrainTimeout { elapsed, polls });
            }
            interval = self.drain.next_interval(interval);
        }
    }

    async fn delete_lock(&self) -> Result<()> {
        let request = ApiRequest::delete(maintenance_api_path::LOCK)
            .with_query("token", self.unlock_token.as_deref().unwrap_or_default())
            .with_maintenance_token(self.unlock_token.as_deref());
        let response = self.transport.send(request).await?;
        check_status(&response, "releasing lock", STATUS_OK)
    }

    async fn report_progress(&self, percentage: u8) -> Result<()> {
        let request = ApiRequest::post(maintenance_api_path::BACKUP_PROGRESS)
            .with_query("token", self.unlock_token.as_deref().unwrap_or_default())
            .with_query("percentage", percentage)
            .with_maintenance_token(self.unlock_token.as_deref());
        let response = self.transport.send(request).await?;
        check_status(&response, "setting progress", STATUS_ACCEPTED)?;
        debug!(percentage, "Backup progress reported");
        Ok(())
    }

    fn ensure_state(&self, expected: SessionState, operation: &'static str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(LockError::State {
                operation,
                state: self.state,
            })
        }
    }

    fn locked_token<'a>(&self, token: Option<&'a str>, operation: &'static str) -> Result<&'a str> {
        self.ensure_state(SessionState::Locked, operation)?;
        token.ok_or(LockError::State {
            operation,
            state: self.state,
        })
    }
}

fn check_status(response: &ApiResponse, action: &'static str, expected: u16) -> Result<()> {
    if response.status == expected {
        Ok(())
    } else {
        warn!(status = response.status, expected, "Unexpected return code when {}", action);
        Err(LockError::Rest {
            action,
            expected,
            status: response.status,
        })
    }
}
