//! Bootstrap helpers for walletbridge.
//!
//! Env vars can be persisted in `~/.walletbridge/.env` (standard dotenvy
//! format) so the service and CLI pick them up from any working directory.

use std::path::{Path, PathBuf};

/// `~/.walletbridge`, or `./.walletbridge` when no home directory is known.
pub fn walletbridge_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".walletbridge")
}

/// Path to the walletbridge-specific `.env` file: `~/.walletbridge/.env`.
pub fn walletbridge_env_path() -> PathBuf {
    walletbridge_home().join(".env")
}

/// Load env vars from `~/.walletbridge/.env`.
///
/// Call this **after** `dotenvy::dotenv()`. dotenvy never overwrites existing
/// env vars, so the effective priority is:
///
///   explicit env vars > `./.env` > `~/.walletbridge/.env`
pub fn load_walletbridge_env() {
    load_env_file(&walletbridge_env_path());
}

/// Load `path` if it exists. Returns whether anything was loaded.
pub fn load_env_file(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }
    match dotenvy::from_path(path) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Failed to load {}: {}", path.display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_path_under_walletbridge_home() {
        let path = walletbridge_env_path();
        assert!(path.ends_with(".walletbridge/.env"));
    }

    #[test]
    fn loads_values_without_overriding_existing_ones() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "WALLETBRIDGE_BOOTSTRAP_TEST_NEW=\"from file\"\nWALLETBRIDGE_BOOTSTRAP_TEST_SET=file\n",
        )
        .unwrap();

        // SAFETY: these variable names are only touched by this test.
        unsafe {
            std::env::remove_var("WALLETBRIDGE_BOOTSTRAP_TEST_NEW");
            std::env::set_var("WALLETBRIDGE_BOOTSTRAP_TEST_SET", "process");
        }

        assert!(load_env_file(&path));
        assert_eq!(
            std::env::var("WALLETBRIDGE_BOOTSTRAP_TEST_NEW").unwrap(),
            "from file"
        );
        assert_eq!(
            std::env::var("WALLETBRIDGE_BOOTSTRAP_TEST_SET").unwrap(),
            "process"
        );
    }

    #[test]
    fn missing_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!load_env_file(&dir.path().join(".env")));
    }
}
