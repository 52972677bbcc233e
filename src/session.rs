//! The terminal's view of who is signed in.
//!
//! A [`SessionContext`] is an explicit value handed to every operation that
//! needs an identity. It is persisted between process runs with
//! [`SessionContext::save`] / [`SessionContext::load`] and wiped with
//! [`SessionContext::clear`] on logout. The role it carries is only a hint for
//! the UI; privileged operations always re-resolve `session_id` against
//! storage.

use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PosError, PosResult};
use crate::models::{AuthOutcome, Redemption, Role};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub id: i64,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    pub session_id: Option<String>,
    pub role: Option<Role>,
    pub code: Option<String>,
    pub user: Option<SessionUser>,
}

impl SessionContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn from_redemption(redemption: &Redemption) -> Self {
        Self {
            session_id: Some(redemption.session.id.clone()),
            role: Some(redemption.role),
            code: Some(redemption.code.clone()),
            user: None,
        }
    }

    pub fn from_auth(outcome: &AuthOutcome) -> Self {
        Self {
            session_id: Some(outcome.session.id.clone()),
            role: Some(outcome.user.role),
            code: None,
            user: Some(SessionUser {
                id: outcome.user.id,
                email: outcome.user.email.clone(),
                name: outcome.user.name.clone(),
            }),
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.session_id.is_some()
    }

    /// Load a saved context. A missing file means nobody is signed in.
    pub fn load(path: &Path) -> PosResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::anonymous()),
            Err(e) => Err(PosError::SessionFile(e)),
        }
    }

    pub fn save(&self, path: &Path) -> PosResult<()> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(PosError::SessionFile)?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw).map_err(PosError::SessionFile)?;
        debug!("Saved session context to {}", path.display());
        Ok(())
    }

    pub fn clear(path: &Path) -> PosResult<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PosError::SessionFile(e)),
        }
    }
}
