//! Session guard: the lock/unlock state machine.
//!
//! The guard is the sole authority on whether decrypted data may be shown.
//! It starts locked, unlocks only on a successful authentication outcome,
//! and relocks on explicit request, on idle timeout, or when enough
//! wall-clock time passed while the app was backgrounded.
//!
//! There is deliberately no live countdown timer. Suspended processes
//! cannot be trusted to fire timers, so expiry is recomputed from
//! timestamps on every query (`is_unlocked`, `remaining`) and on
//! foreground resume. A timeout that "fired" while nobody was looking is
//! therefore indistinguishable from one observed immediately, which also
//! resolves the race between a firing timer and a foreground transition.
//!
//! Every transition to `Locked` clears the decrypted cache synchronously,
//! under the same state lock, so no reader can observe "locked but cache
//! still warm".

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::cache::DecryptedCache;
use crate::error::VaultError;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

// ── Authentication collaborator ─────────────────────────────────────────────

/// Error classes reported by the platform authenticator. The guard only
/// cares which of these leave a retry meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorCode {
    Cancelled,
    LockedOut,
    Other,
}

/// Three-way outcome of a platform authentication prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Success,
    Failed,
    Error { code: AuthErrorCode, message: String },
}

/// Opaque "authenticate me" capability (biometric prompt, PIN dialog,
/// test stub). How it authenticates is none of the core's business.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, prompt: &str) -> AuthOutcome;
}

// ── Guard ───────────────────────────────────────────────────────────────────

struct SessionState {
    locked: bool,
    /// Monotonically increasing; bumped on every successful unlock. Readers
    /// capture it before decrypting and re-verify after, so a lock that
    /// lands mid-read wins.
    epoch: u64,
    timeout: Duration,
    last_activity: Option<Instant>,
    background_entered: Option<Instant>,
}

pub struct SessionGuard {
    state: Mutex<SessionState>,
    cache: Arc<DecryptedCache>,
}

impl SessionGuard {
    /// A new guard is always locked, whatever any persisted state says.
    pub fn new(timeout: Duration, cache: Arc<DecryptedCache>) -> Self {
        Self {
            state: Mutex::new(SessionState {
                locked: true,
                epoch: 0,
                timeout,
                last_activity: None,
                background_entered: None,
            }),
            cache,
        }
    }

    /// Run the authenticator and apply its outcome. Success unlocks and
    /// starts the idle countdown; every other outcome leaves the guard
    /// locked and surfaces as a typed error. Retrying after a transient
    /// failure is the caller's decision, never automatic here.
    pub async fn authenticate(
        &self,
        authenticator: &dyn Authenticator,
        prompt: &str,
    ) -> Result<(), VaultError> {
        let outcome = authenticator.authenticate(prompt).await;
        match outcome {
            AuthOutcome::Success => {
                let mut state = self.state.lock();
                state.locked = false;
                state.epoch += 1;
                state.last_activity = Some(Instant::now());
                state.background_entered = None;
                info!("session unlocked");
                Ok(())
            }
            AuthOutcome::Failed => {
                self.lock();
                Err(VaultError::AuthenticationFailed)
            }
            AuthOutcome::Error { code, message } => {
                self.lock();
                match code {
                    AuthErrorCode::Cancelled => Err(VaultError::AuthenticationCancelled),
                    AuthErrorCode::LockedOut => Err(VaultError::AuthenticationLockedOut(message)),
                    AuthErrorCode::Other => Err(VaultError::AuthenticationError(message)),
                }
            }
        }
    }

    /// Any user interaction resets the idle countdown. No-op while locked.
    pub fn on_user_activity(&self) {
        let mut state = self.state.lock();
        if !state.locked {
            state.last_activity = Some(Instant::now());
        }
    }

    /// The app left the foreground. The countdown stops decrementing here;
    /// the elapsed background time is reconstructed on resume.
    pub fn on_background(&self) {
        let mut state = self.state.lock();
        if !state.locked && state.background_entered.is_none() {
            state.background_entered = Some(Instant::now());
        }
    }

    /// The app returned to the foreground. Foreground idle before
    /// backgrounding plus the full background duration count against the
    /// timeout; if the budget is spent the guard locks immediately,
    /// otherwise the countdown resumes with the remainder.
    pub fn on_foreground(&self) {
        let mut state = self.state.lock();
        if state.locked {
            state.background_entered = None;
            return;
        }
        let Some(background_entered) = state.background_entered.take() else {
            return;
        };
        let Some(last_activity) = state.last_activity else {
            return;
        };
        let now = Instant::now();
        let elapsed = background_entered.duration_since(last_activity)
            + now.duration_since(background_entered);
        if elapsed >= state.timeout {
            debug!(?elapsed, "idle budget spent while backgrounded");
            self.transition_to_locked(&mut state);
        }
    }

    /// Explicit lock. Idempotent; always leaves the cache cleared.
    pub fn lock(&self) {
        let mut state = self.state.lock();
        self.transition_to_locked(&mut state);
    }

    /// Whether decryption and display are currently permitted. Recomputes
    /// expiry from timestamps and performs the lock transition itself if
    /// the budget is spent.
    pub fn is_unlocked(&self) -> bool {
        let mut state = self.state.lock();
        !self.check_expired(&mut state)
    }

    /// Idle budget left before the guard locks, or `None` when locked.
    pub fn remaining(&self) -> Option<Duration> {
        let mut state = self.state.lock();
        if self.check_expired(&mut state) {
            return None;
        }
        let idle = state
            .last_activity
            .map(|last| Instant::now().duration_since(last))
            .unwrap_or(Duration::ZERO);
        Some(state.timeout.saturating_sub(idle))
    }

    /// Fail `Locked` unless unlocked; on success returns the epoch token
    /// to re-verify after decrypting.
    pub fn ensure_unlocked(&self) -> Result<u64, VaultError> {
        let mut state = self.state.lock();
        if self.check_expired(&mut state) {
            return Err(VaultError::Locked);
        }
        Ok(state.epoch)
    }

    /// Confirm the session that issued `epoch` is still the live unlocked
    /// session. Fails if the guard locked (or relocked) since.
    pub fn verify_epoch(&self, epoch: u64) -> Result<(), VaultError> {
        let mut state = self.state.lock();
        if self.check_expired(&mut state) || state.epoch != epoch {
            return Err(VaultError::Locked);
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        self.state.lock().timeout
    }

    pub fn set_lock_timeout(&self, timeout: Duration) {
        self.state.lock().timeout = timeout;
    }

    /// Recompute expiry; returns true when the guard is (now) locked.
    /// Background time needs no special case here: wall-clock since the
    /// last activity already includes it.
    fn check_expired(&self, state: &mut SessionState) -> bool {
        if state.locked {
            return true;
        }
        let Some(last_activity) = state.last_activity else {
            self.transition_to_locked(state);
            return true;
        };
        if Instant::now().duration_since(last_activity) >= state.timeout {
            debug!("idle timeout reached");
            self.transition_to_locked(state);
            return true;
        }
        false
    }

    fn transition_to_locked(&self, state: &mut SessionState) {
        if !state.locked {
            info!("session locked");
        }
        state.locked = true;
        state.last_activity = None;
        state.background_entered = None;
        // Under the state lock on purpose: no reader may see "locked" with
        // a warm cache, nor a cleared cache with "unlocked".
        self.cache.clear();
    }
}

// ── Persisted snapshot ──────────────────────────────────────────────────────

/// Minimal session state that survives a process kill. Restoring it never
/// unlocks anything; the lock flag and timestamp exist so the UI can tell
/// "locked by you" from "locked by relaunch".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub locked: bool,
    pub last_activity: Option<DateTime<Utc>>,
}

impl SessionGuard {
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock();
        let last_activity = state.last_activity.map(|last| {
            let idle = Instant::now().duration_since(last);
            Utc::now() - chrono::Duration::from_std(idle).unwrap_or_else(|_| chrono::Duration::zero())
        });
        SessionSnapshot {
            locked: state.locked,
            last_activity,
        }
    }

    pub fn save_snapshot(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load_snapshot(path: &Path) -> anyhow::Result<Option<SessionSnapshot>> {
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }
}
