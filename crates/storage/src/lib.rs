// storage/src/lib.rs

//! Source persistence
//!
//! This crate provides the session's source stores:
//! - `FileStore`, one file per contract under a workspace directory
//! - `MemoryStore`, an in-process map for tests and throwaway sessions

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use session::PersistenceError;

/// Default extension of contract source files
pub const DEFAULT_EXTENSION: &str = "scilla";

/// Reject names that are empty, hidden or would escape the workspace
pub fn validate_name(name: &str) -> Result<(), PersistenceError> {
    let invalid = name.trim().is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\'])
        || name.contains('\0');

    if invalid {
        return Err(PersistenceError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("Counter").is_ok());
        assert!(validate_name("my-token_v2").is_ok());

        for bad in ["", "  ", ".hidden", "..", "a/b", "a\\b", "../escape"] {
            assert!(
                matches!(validate_name(bad), Err(PersistenceError::InvalidName(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }
}
