// Display preferences kept next to the task collection

use crate::storage::Storage;
use eyre::Result;
use tracing::debug;

/// Read the dark-mode flag; anything other than `"true"` reads as off
pub fn dark_mode<S: Storage + ?Sized>(storage: &S, key: &str) -> Result<bool> {
    Ok(storage.get(key)?.is_some_and(|v| v.trim() == "true"))
}

pub fn set_dark_mode<S: Storage + ?Sized>(storage: &mut S, key: &str, enabled: bool) -> Result<()> {
    storage.set(key, if enabled { "true" } else { "false" })?;
    debug!(enabled, "Saved dark mode preference");
    Ok(())
}

/// Flip the dark-mode flag and return the new value
pub fn toggle_dark_mode<S: Storage + ?Sized>(storage: &mut S, key: &str) -> Result<bool> {
    let enabled = !dark_mode(&*storage, key)?;
    set_dark_mode(storage, key, enabled)?;
    Ok(enabled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    const KEY: &str = "todo-dark-mode";

    #[test]
    fn test_default_is_off() {
        let storage = MemoryStorage::new();
        assert!(!dark_mode(&storage, KEY).unwrap());
    }

    #[test]
    fn test_unrecognized_value_is_off() {
        let mut storage = MemoryStorage::new();
        storage.set(KEY, "yes").unwrap();
        assert!(!dark_mode(&storage, KEY).unwrap());
    }

    #[test]
    fn test_toggle_roundtrip() {
        let mut storage = MemoryStorage::new();
        assert!(toggle_dark_mode(&mut storage, KEY).unwrap());
        assert_eq!(storage.get(KEY).unwrap().as_deref(), Some("true"));
        assert!(!toggle_dark_mode(&mut storage, KEY).unwrap());
        assert_eq!(storage.get(KEY).unwrap().as_deref(), Some("false"));
    }
}
