//! ABOUTME: Shared testing utilities and helper functions
//! ABOUTME: Common test fixtures for all planmarket crates

use std::path::PathBuf;

/// Short unique suffix for test resources that must not collide across parallel tests
pub fn unique_suffix() -> String {
    ulid::Ulid::new().to_string().to_lowercase()
}

/// Directory used for throwaway test databases
pub fn temp_dir_path() -> PathBuf {
    std::env::temp_dir().join("planmarket-test")
}

/// Path for a fresh SQLite database file; the parent directory is created
pub fn temp_db_path(prefix: &str) -> String {
    let dir = temp_dir_path();
    let _ = std::fs::create_dir_all(&dir);
    dir.join(format!("{}_{}.db", prefix, unique_suffix()))
        .to_string_lossy()
        .to_string()
}

/// A JWT secret long enough to pass config validation
pub fn test_jwt_secret() -> String {
    "test_secret_key_32_characters_minimum".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_paths_are_unique() {
        let a = temp_db_path("x");
        let b = temp_db_path("x");
        assert_ne!(a, b);
        assert!(a.ends_with(".db"));
    }

    #[test]
    fn test_jwt_secret_length() {
        assert!(test_jwt_secret().len() >= 32);
    }
}
