use gloo_storage::{LocalStorage, Storage};

use tactical_shared::storage::{MemoryStorage, SettingsStorage, StorageError};

/// `SettingsStorage` over browser localStorage, falling back to memory when
/// localStorage is unavailable (private mode, sandboxed iframe).
pub struct BrowserStorage {
    fallback: Option<MemoryStorage>,
}

impl BrowserStorage {
    pub fn open() -> Self {
        let available = web_sys::window()
            .and_then(|w| w.local_storage().ok().flatten())
            .is_some();
        if !available {
            web_sys::console::warn_1(&"localStorage unavailable; settings will not persist".into());
        }
        Self {
            fallback: (!available).then(MemoryStorage::new),
        }
    }
}

impl SettingsStorage for BrowserStorage {
    fn read(&self, key: &str) -> Option<String> {
        if let Some(memory) = &self.fallback {
            return memory.read(key);
        }
        LocalStorage::raw().get_item(key).ok().flatten()
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Some(memory) = &mut self.fallback {
            return memory.write(key, value);
        }
        LocalStorage::raw()
            .set_item(key, value)
            .map_err(|e| StorageError::Write {
                key: key.to_string(),
                message: format!("{e:?}"),
            })
    }
}
