//! Persistence adapters for throttle state
//!
//! The throttle does not talk to the filesystem directly; it goes through
//! the [`StateStore`] trait so hosts can supply whatever storage they have
//! (browser-profile storage, a config directory, memory under test).
//!
//! The file-backed store keeps the two records the original portal stored
//! under separate keys - `login_attempts` and `failed_password_attempts` -
//! as sibling objects in one JSON document, and merges them into a single
//! [`ThrottleState`] on load.

use std::fs;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::state::{ThrottleState, STATE_VERSION};

/// Storage adapter for the persisted throttle counters
pub trait StateStore {
    /// Load the persisted state, `None` if nothing was stored yet
    fn load(&self) -> Result<Option<ThrottleState>>;

    /// Persist the full state
    fn save(&mut self, state: &ThrottleState) -> Result<()>;

    /// Remove any persisted state
    fn clear(&mut self) -> Result<()>;
}

/// On-disk record of general attempt counters
#[derive(Serialize, Deserialize)]
struct LoginAttemptsRecord {
    attempt_count: u32,
    block_started_at: Option<NaiveDateTime>,
    block_escalation_level: u32,
    daily_attempts: u32,
    last_attempt_date: NaiveDate,
    version: u32,
}

/// On-disk record of failed-password counters, dated independently
#[derive(Serialize, Deserialize)]
struct FailedPasswordRecord {
    count: u32,
    date: NaiveDate,
}

/// Serialized state file layout
#[derive(Serialize, Deserialize)]
struct StateFile {
    login_attempts: LoginAttemptsRecord,
    failed_password_attempts: FailedPasswordRecord,
}

impl StateFile {
    fn from_state(state: &ThrottleState) -> Self {
        Self {
            login_attempts: LoginAttemptsRecord {
                attempt_count: state.attempt_count,
                block_started_at: state.block_started_at,
                block_escalation_level: state.block_escalation_level,
                daily_attempts: state.daily_attempts,
                last_attempt_date: state.last_attempt_date,
                version: state.version,
            },
            failed_password_attempts: FailedPasswordRecord {
                count: state.daily_failed_password_attempts,
                date: state.last_attempt_date,
            },
        }
    }

    fn into_state(self) -> ThrottleState {
        // The two records carry their own dates; a failed-password count
        // from a different day than the attempt record is already stale.
        let failed = if self.failed_password_attempts.date == self.login_attempts.last_attempt_date
        {
            self.failed_password_attempts.count
        } else {
            0
        };
        ThrottleState {
            attempt_count: self.login_attempts.attempt_count,
            block_started_at: self.login_attempts.block_started_at,
            block_escalation_level: self.login_attempts.block_escalation_level,
            daily_attempts: self.login_attempts.daily_attempts,
            daily_failed_password_attempts: failed,
            last_attempt_date: self.login_attempts.last_attempt_date,
            version: self.login_attempts.version.max(STATE_VERSION),
        }
    }
}

/// JSON-file-backed store
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Create a store backed by the given file path
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Get the default state-file path
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("portcullis")
            .join("throttle.json")
    }

    /// The file path this store reads and writes
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<Option<ThrottleState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        let file: StateFile = serde_json::from_str(&contents)?;
        Ok(Some(file.into_state()))
    }

    fn save(&mut self, state: &ThrottleState) -> Result<()> {
        let contents = serde_json::to_string_pretty(&StateFile::from_state(state))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &contents)?;
        fs::rename(&temp_path, &self.path)?;

        // Set restrictive permissions (Unix only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// In-memory store for tests and hosts without a filesystem
#[derive(Default)]
pub struct MemoryStore {
    state: Option<ThrottleState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<Option<ThrottleState>> {
        Ok(self.state.clone())
    }

    fn save(&mut self, state: &ThrottleState) -> Result<()> {
        self.state = Some(state.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.state = None;
        Ok(())
    }
}
