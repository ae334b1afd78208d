//! Per-environment mutual exclusion.
//!
//! Lock state lives on the environment record itself, so it survives
//! process restarts and is visible to every engine instance sharing the
//! store. Expiry is advisory: nothing releases an expired lock on its
//! own, but a new acquisition may break one.

use crate::CoreError;
use chrono::{Duration, Utc};
use pressline_schema::LockState;
use pressline_store::EnvironmentStore;
use tracing::{debug, warn};

/// Default lock lifetime for engine workflows.
pub const WORKFLOW_LOCK_TTL_HOURS: i64 = 2;

#[derive(Clone)]
pub struct LockManager {
    environments: EnvironmentStore,
    actor: String,
}

impl LockManager {
    pub fn new(environments: EnvironmentStore, actor: impl Into<String>) -> Self {
        Self {
            environments,
            actor: actor.into(),
        }
    }

    /// Acquire the lock on one environment.
    ///
    /// Fails with the *existing* lock's reason if the environment is
    /// already locked. An expired lock is broken and taken over, so a
    /// crashed workflow does not force operators through a manual
    /// unlock.
    pub fn lock(&self, env_id: &str, reason: &str, ttl: Duration) -> Result<(), CoreError> {
        let env = self.environments.get(env_id)?;
        if let Some(held) = &env.lock {
            let now = Utc::now();
            if held.is_expired(&now) {
                warn!(
                    env = env_id,
                    "breaking lock held by {} that expired at {}",
                    held.locked_by,
                    held.expires_at
                );
            } else {
                return Err(CoreError::LockConflict {
                    env_id: env_id.to_owned(),
                    owner: held.locked_by.clone(),
                    reason: held.reason.clone(),
                });
            }
        }

        let now = Utc::now();
        let state = LockState {
            locked_by: self.actor.clone(),
            reason: reason.to_owned(),
            acquired_at: now.to_rfc3339(),
            expires_at: (now + ttl).to_rfc3339(),
        };
        self.environments.update(env_id, |e| e.lock = Some(state))?;
        debug!(env = env_id, reason, "lock acquired");
        Ok(())
    }

    /// Release the lock unconditionally. Unlocking an already-unlocked
    /// environment succeeds as a no-op.
    pub fn unlock(&self, env_id: &str) -> Result<(), CoreError> {
        let env = self.environments.get(env_id)?;
        if env.lock.is_some() {
            self.environments.update(env_id, |e| e.lock = None)?;
            debug!(env = env_id, "lock released");
        }
        Ok(())
    }

    pub fn holder(&self, env_id: &str) -> Result<Option<LockState>, CoreError> {
        Ok(self.environments.get(env_id)?.lock)
    }

    /// Run `work` while holding the locks on every id in `env_ids`.
    ///
    /// Locks are acquired in the given order; a conflict on any of them
    /// releases the ones already taken and surfaces the conflict. All
    /// held locks are released on every exit path.
    pub fn with_locks<T>(
        &self,
        env_ids: &[&str],
        reason: &str,
        work: impl FnOnce() -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        let ttl = Duration::hours(WORKFLOW_LOCK_TTL_HOURS);
        let mut held: Vec<&str> = Vec::with_capacity(env_ids.len());
        for id in env_ids {
            if let Err(e) = self.lock(id, reason, ttl) {
                self.release_all(&held);
                return Err(e);
            }
            held.push(id);
        }

        let result = work();
        self.release_all(&held);
        result
    }

    fn release_all(&self, held: &[&str]) {
        for id in held.iter().rev() {
            if let Err(e) = self.unlock(id) {
                warn!(env = *id, "failed to release lock: {e}");
            }
        }
    }
}
