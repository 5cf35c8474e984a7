//! Per-session user identity and the stores that keep it.
//!
//! A [`UserIdentity`] outlives any single room. Its `user_id` is generated once
//! and kept for the whole session; the display name and voting role persist
//! across reloads. The admin flag is never trusted from storage: every store
//! hands out `is_admin = false` until the authority confirms otherwise through
//! an `admin-status` event.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::protocol::{UserId, VotingRole};

/// The local user's identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub user_id: UserId,
    pub display_name: String,
    #[serde(default)]
    pub voting_role: VotingRole,
    /// Last admin status confirmed by the authority.
    #[serde(default)]
    pub is_admin: bool,
}

impl UserIdentity {
    /// Create an identity with a freshly generated user id.
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            user_id: Uuid::new_v4().to_string(),
            display_name: display_name.into(),
            voting_role: VotingRole::Voter,
            is_admin: false,
        }
    }

    /// Set the preferred voting role.
    #[must_use]
    pub fn with_role(mut self, voting_role: VotingRole) -> Self {
        self.voting_role = voting_role;
        self
    }

    /// Returns `true` if both the id and a non-blank display name are present.
    pub fn is_complete(&self) -> bool {
        !self.user_id.trim().is_empty() && !self.display_name.trim().is_empty()
    }
}

/// Read/write capability over the session identity.
///
/// The room client only ever goes through this trait, so the backing storage
/// (memory, a file, browser session storage) is the caller's choice.
pub trait IdentityStore: Send + Sync {
    /// Current identity.
    fn load(&self) -> UserIdentity;

    /// Replace the stored identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage could not be written.
    fn save(&self, identity: &UserIdentity) -> Result<()>;

    /// Overwrite the admin flag with the authority's latest confirmation.
    fn set_admin(&self, is_admin: bool) -> Result<UserIdentity> {
        self.update(&mut |identity| identity.is_admin = is_admin)
    }

    /// Change the preferred voting role.
    fn set_role(&self, voting_role: VotingRole) -> Result<UserIdentity> {
        self.update(&mut |identity| identity.voting_role = voting_role)
    }

    /// Change the display name.
    fn set_display_name(&self, display_name: &str) -> Result<UserIdentity> {
        self.update(&mut |identity| identity.display_name = display_name.to_string())
    }

    /// Load, modify and save in one step, returning the saved identity.
    fn update(&self, change: &mut dyn FnMut(&mut UserIdentity)) -> Result<UserIdentity> {
        let mut identity = self.load();
        change(&mut identity);
        self.save(&identity)?;
        Ok(identity)
    }
}

// ── In-memory store ─────────────────────────────────────────────────

/// Identity kept in memory for the lifetime of the process.
#[derive(Debug)]
pub struct MemoryIdentityStore {
    identity: RwLock<UserIdentity>,
}

impl MemoryIdentityStore {
    /// Wrap an identity. The admin flag is reset until the authority confirms it.
    pub fn new(mut identity: UserIdentity) -> Self {
        identity.is_admin = false;
        Self {
            identity: RwLock::new(identity),
        }
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self) -> UserIdentity {
        self.identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn save(&self, identity: &UserIdentity) -> Result<()> {
        *self
            .identity
            .write()
            .unwrap_or_else(PoisonError::into_inner) = identity.clone();
        Ok(())
    }
}

// ── File-backed store ───────────────────────────────────────────────

/// Identity persisted as JSON so it survives restarts of the same session.
#[derive(Debug)]
pub struct FileIdentityStore {
    path: PathBuf,
    identity: RwLock<UserIdentity>,
}

impl FileIdentityStore {
    /// Open the store at `path`, creating a new identity if none exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if a new identity cannot be written.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let identity = if path.exists() {
            let raw = std::fs::read(&path)?;
            let mut identity: UserIdentity = serde_json::from_slice(&raw)?;
            identity.is_admin = false;
            debug!(path = %path.display(), user_id = %identity.user_id, "loaded identity");
            identity
        } else {
            let identity = UserIdentity::new("");
            write_identity(&path, &identity)?;
            debug!(path = %path.display(), user_id = %identity.user_id, "created identity");
            identity
        };
        Ok(Self {
            path,
            identity: RwLock::new(identity),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IdentityStore for FileIdentityStore {
    fn load(&self) -> UserIdentity {
        self.identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn save(&self, identity: &UserIdentity) -> Result<()> {
        let mut current = self
            .identity
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        write_identity(&self.path, identity)?;
        *current = identity.clone();
        Ok(())
    }
}

fn write_identity(path: &Path, identity: &UserIdentity) -> Result<()> {
    let json = serde_json::to_vec_pretty(identity)?;
    std::fs::write(path, json)?;
    Ok(())
}
