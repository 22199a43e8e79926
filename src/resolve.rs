//! Path resolution for spamsweep cache and config files.
//!
//! Resolution order for the cache directory:
//!   1. SPAMSWEEP_CACHE environment variable
//!   2. Platform cache dir (e.g. ~/.cache/spamsweep)
//!   3. ~/.cache/spamsweep when no platform dir can be determined

use std::path::PathBuf;

/// Return the cache directory path (lock, track and password files).
pub fn cache_dir() -> PathBuf {
    if let Ok(env) = std::env::var("SPAMSWEEP_CACHE") {
        if !env.is_empty() {
            return PathBuf::from(env);
        }
    }
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "spamsweep") {
        return proj_dirs.cache_dir().to_path_buf();
    }
    home_dir().join(".cache").join("spamsweep")
}

/// Return the OS-native spamsweep config directory.
pub fn config_dir() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "spamsweep") {
        proj_dirs.config_dir().to_path_buf()
    } else {
        home_dir().join(".config").join("spamsweep")
    }
}

pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

// --- Derived helpers: per-account cache files ---

pub fn lock_file() -> PathBuf {
    cache_dir().join("lock")
}

/// Prefix for seen-UID files; the folder role is appended to it.
pub fn track_prefix(identity_hash: &str) -> PathBuf {
    cache_dir().join(format!("track{}", identity_hash))
}

pub fn password_file(identity_hash: &str) -> PathBuf {
    cache_dir().join(format!(".spamsweep-{}", identity_hash))
}

/// Get the user's home directory.
pub fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}
