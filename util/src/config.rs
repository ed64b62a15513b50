//! Global application configuration manager.
//!
//! `AppConfig` is a lazily initialized, globally accessible singleton containing
//! runtime configuration values loaded from environment variables. It provides
//! thread-safe access and mutation for testing or overrides in runtime environments.

use std::env;
use std::str::FromStr;
use std::sync::{OnceLock, RwLock, RwLockReadGuard};

/// Represents the complete application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: String,
    pub project_name: String,
    pub log_level: String,
    pub log_file: String,
    pub log_to_stdout: bool,
    pub database_path: String,
    /// Root under which every plagiarism run gets its own unique work folder.
    pub repo_download_clone_path: String,
    pub cleanup_delay_secs: u64,
    pub check_lock_ttl_secs: u64,
    pub acquire_concurrency: usize,
    pub max_comparisons: usize,
    pub git_timeout_secs: u64,
    pub moss_user_id: String,
    pub moss_server: String,
    pub moss_port: u16,
}

/// Lazily-initialized, thread-safe singleton instance of `AppConfig`.
static CONFIG_INSTANCE: OnceLock<RwLock<AppConfig>> = OnceLock::new();

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.into())
}

/// Parses `key` if present and valid, falling back to `default` otherwise.
fn parsed_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl AppConfig {
    /// Loads the configuration from `.env` and environment variables.
    ///
    /// Every key has a default, so a missing or malformed variable never panics.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            env: var_or("APP_ENV", "development"),
            project_name: var_or("PROJECT_NAME", "plagiarism-checker"),
            log_level: var_or("LOG_LEVEL", "plagiarism=info"),
            log_file: var_or("LOG_FILE", "plagiarism.log"),
            log_to_stdout: var_or("LOG_TO_STDOUT", "false") == "true",
            database_path: var_or("DATABASE_PATH", "data/plagiarism.db"),
            repo_download_clone_path: var_or("REPO_DOWNLOAD_CLONE_PATH", "tmp/repos-download"),
            cleanup_delay_secs: parsed_or("PLAGIARISM_CLEANUP_DELAY_SECS", 10),
            check_lock_ttl_secs: parsed_or("PLAGIARISM_CHECK_LOCK_TTL_SECS", 3600),
            acquire_concurrency: parsed_or("PLAGIARISM_ACQUIRE_CONCURRENCY", available_cpus()).max(1),
            max_comparisons: parsed_or("PLAGIARISM_MAX_COMPARISONS", 500),
            git_timeout_secs: parsed_or("GIT_TIMEOUT_SECS", 120),
            moss_user_id: var_or("MOSS_USER_ID", ""),
            moss_server: var_or("MOSS_SERVER", "moss.stanford.edu"),
            moss_port: parsed_or("MOSS_PORT", 7690),
        }
    }

    /// Returns a shared reference to the global configuration.
    ///
    /// # Panics
    /// Panics if the lock is poisoned.
    pub fn global() -> RwLockReadGuard<'static, AppConfig> {
        CONFIG_INSTANCE
            .get_or_init(|| RwLock::new(AppConfig::from_env()))
            .read()
            .expect("Failed to acquire AppConfig read lock")
    }

    /// Resets the configuration by reloading from environment variables.
    ///
    /// Useful in tests to clear overrides.
    pub fn reset() {
        if let Some(lock) = CONFIG_INSTANCE.get() {
            if let Ok(mut guard) = lock.write() {
                *guard = AppConfig::from_env();
            }
        }
    }

    /// Generic internal setter for any field in the config.
    fn set_field<F>(setter: F)
    where
        F: FnOnce(&mut AppConfig),
    {
        let lock = CONFIG_INSTANCE.get_or_init(|| RwLock::new(AppConfig::from_env()));
        let mut guard = lock
            .write()
            .expect("Failed to acquire AppConfig write lock");
        setter(&mut guard);
    }

    // --- Per-field setters below ---

    pub fn set_log_level(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.log_level = value.into());
    }

    pub fn set_log_file(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.log_file = value.into());
    }

    pub fn set_log_to_stdout(value: bool) {
        AppConfig::set_field(|cfg| cfg.log_to_stdout = value);
    }

    pub fn set_database_path(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.database_path = value.into());
    }

    pub fn set_repo_download_clone_path(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.repo_download_clone_path = value.into());
    }

    pub fn set_cleanup_delay_secs(value: u64) {
        AppConfig::set_field(|cfg| cfg.cleanup_delay_secs = value);
    }

    pub fn set_check_lock_ttl_secs(value: u64) {
        AppConfig::set_field(|cfg| cfg.check_lock_ttl_secs = value);
    }

    pub fn set_acquire_concurrency(value: usize) {
        AppConfig::set_field(|cfg| cfg.acquire_concurrency = value.max(1));
    }

    pub fn set_max_comparisons(value: usize) {
        AppConfig::set_field(|cfg| cfg.max_comparisons = value);
    }

    pub fn set_git_timeout_secs(value: u64) {
        AppConfig::set_field(|cfg| cfg.git_timeout_secs = value);
    }

    pub fn set_moss_user_id(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.moss_user_id = value.into());
    }
}

// --- Free accessors, read through the global instance ---

pub fn env() -> String {
    AppConfig::global().env.clone()
}

pub fn project_name() -> String {
    AppConfig::global().project_name.clone()
}

pub fn log_level() -> String {
    AppConfig::global().log_level.clone()
}

pub fn log_file() -> String {
    AppConfig::global().log_file.clone()
}

pub fn log_to_stdout() -> bool {
    AppConfig::global().log_to_stdout
}

pub fn database_path() -> String {
    AppConfig::global().database_path.clone()
}

pub fn repo_download_clone_path() -> String {
    AppConfig::global().repo_download_clone_path.clone()
}

pub fn cleanup_delay_secs() -> u64 {
    AppConfig::global().cleanup_delay_secs
}

pub fn check_lock_ttl_secs() -> u64 {
    AppConfig::global().check_lock_ttl_secs
}

pub fn acquire_concurrency() -> usize {
    AppConfig::global().acquire_concurrency
}

pub fn max_comparisons() -> usize {
    AppConfig::global().max_comparisons
}

pub fn git_timeout_secs() -> u64 {
    AppConfig::global().git_timeout_secs
}

pub fn moss_user_id() -> String {
    AppConfig::global().moss_user_id.clone()
}

pub fn moss_server() -> String {
    AppConfig::global().moss_server.clone()
}

pub fn moss_port() -> u16 {
    AppConfig::global().moss_port
}
