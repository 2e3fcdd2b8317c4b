//! Advisory run lock
//!
//! Existence checks and creation calls are not atomic across runs, so two runs
//! against the same project/zone must not overlap. The lock is a small JSON
//! file per environment under a caller-chosen directory.

use crate::error::{CloudError, Result};
use crate::resource::Environment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Locks older than this are considered abandoned
const STALE_AFTER_HOURS: i64 = 1;

/// Lock information
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    environment: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// Whatever currently occupies the lock file
enum Holder {
    Run(LockInfo),
    Unreadable(DateTime<Utc>),
    Gone,
}

impl Holder {
    fn is_stale(&self) -> bool {
        let since = match self {
            Holder::Run(info) => info.acquired_at,
            Holder::Unreadable(modified) => *modified,
            Holder::Gone => return true,
        };
        Utc::now().signed_duration_since(since).num_hours() >= STALE_AFTER_HOURS
    }

    fn describe(&self, environment: &str) -> String {
        match self {
            Holder::Run(info) => format!(
                "{} is locked by {} (pid {}) since {}",
                info.environment, info.holder, info.pid, info.acquired_at
            ),
            Holder::Unreadable(modified) => format!(
                "{} has an unreadable lock file written at {}",
                environment, modified
            ),
            Holder::Gone => format!("{} was locked by another run", environment),
        }
    }
}

/// RAII guard for the run lock
#[derive(Debug)]
pub struct RunLock {
    lock_path: PathBuf,
    released: bool,
}

impl RunLock {
    /// Lock file path for `env` inside `dir`
    pub fn path_for(dir: impl AsRef<Path>, env: &Environment) -> PathBuf {
        let file = format!(
            "{}.lock",
            env.key()
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
                .collect::<String>()
        );
        dir.as_ref().join(file)
    }

    /// Acquire the lock for `env`, failing if another run holds it
    ///
    /// The lock file is created with `create_new`, so only one of several
    /// concurrent callers succeeds. A stale lock is removed and creation is
    /// retried once.
    pub async fn acquire(dir: impl AsRef<Path>, env: &Environment) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.exists() {
            fs::create_dir_all(dir).await?;
            tracing::debug!("Created lock directory: {}", dir.display());
        }

        let lock_path = Self::path_for(dir, env);
        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            environment: env.key(),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&lock_info)?;

        for attempt in 0..2 {
            match Self::create_exclusive(&lock_path, &content).await {
                Ok(()) => {
                    tracing::debug!("Acquired run lock for {}", env.key());
                    return Ok(Self {
                        lock_path,
                        released: false,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }

            let holder = Self::current_holder(&lock_path).await?;
            if attempt > 0 || !holder.is_stale() {
                return Err(CloudError::LockError(holder.describe(&env.key())));
            }

            tracing::warn!("Removing stale lock: {}", holder.describe(&env.key()));
            match fs::remove_file(&lock_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Err(CloudError::LockError(format!(
            "{} is locked by another run",
            env.key()
        )))
    }

    async fn create_exclusive(path: &Path, content: &str) -> std::io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;

        let written = match file.write_all(content.as_bytes()).await {
            Ok(()) => file.sync_all().await,
            Err(e) => Err(e),
        };
        if written.is_err() {
            // Don't leave an empty file that looks like a live lock
            let _ = fs::remove_file(path).await;
        }
        written
    }

    /// Read the lock file left by another run
    ///
    /// A file that cannot be parsed is either being written right now or
    /// corrupt; its age decides which.
    async fn current_holder(path: &Path) -> Result<Holder> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            // Released between our create attempt and this read
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Holder::Gone),
            Err(e) => return Err(e.into()),
        };

        if let Ok(info) = serde_json::from_str::<LockInfo>(&content) {
            return Ok(Holder::Run(info));
        }

        let modified = fs::metadata(path).await?.modified()?;
        Ok(Holder::Unreadable(DateTime::<Utc>::from(modified)))
    }

    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released run lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
