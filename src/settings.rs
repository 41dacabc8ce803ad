use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use thiserror::Error;

pub const SETTINGS_KEY: &str = "memories.settings";
pub const REFRESH_CHOICES: [u32; 3] = [5, 10, 15];
pub const DEFAULT_REFRESH_MINUTES: u32 = 5;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings storage is not available: {0}")]
    Unavailable(String),
    #[error("could not encode settings: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("server URL must start with http:// or https://, got {0:?}")]
    InvalidServerUrl(String),
    #[error("API token is empty")]
    MissingToken,
}

/// Key-value persistence for settings. The browser build stores into
/// `localStorage`; tests use [`MemoryStore`].
pub trait SettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError>;
    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError>;
}

#[derive(Default)]
pub struct MemoryStore {
    values: RefCell<HashMap<String, String>>,
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        Ok(self.values.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.values
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub struct LocalStorageStore {
    storage: web_sys::Storage,
}

impl LocalStorageStore {
    pub fn open() -> Result<Self, SettingsError> {
        let window = web_sys::window()
            .ok_or_else(|| SettingsError::Unavailable("no window".to_string()))?;
        let storage = window
            .local_storage()
            .map_err(|e| SettingsError::Unavailable(format!("{e:?}")))?
            .ok_or_else(|| SettingsError::Unavailable("localStorage disabled".to_string()))?;
        Ok(Self { storage })
    }
}

impl SettingsStore for LocalStorageStore {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        self.storage
            .get_item(key)
            .map_err(|e| SettingsError::Unavailable(format!("{e:?}")))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.storage
            .set_item(key, value)
            .map_err(|e| SettingsError::Unavailable(format!("{e:?}")))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub server_url: String,
    pub api_token: String,
    pub auto_refresh_minutes: u32,
    pub font_size: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            api_token: String::new(),
            auto_refresh_minutes: DEFAULT_REFRESH_MINUTES,
            font_size: 16,
        }
    }
}

impl Settings {
    /// Reads stored settings. A missing or unreadable entry yields the
    /// defaults; an out-of-range refresh interval falls back to 5 minutes.
    pub fn load(store: &impl SettingsStore) -> Result<Self, SettingsError> {
        let Some(raw) = store.get(SETTINGS_KEY)? else {
            return Ok(Self::default());
        };
        let mut settings = match serde_json::from_str::<Settings>(&raw) {
            Ok(settings) => settings,
            Err(err) => {
                log::warn!("discarding unreadable settings: {err}");
                Self::default()
            }
        };
        if !REFRESH_CHOICES.contains(&settings.auto_refresh_minutes) {
            settings.auto_refresh_minutes = DEFAULT_REFRESH_MINUTES;
        }
        Ok(settings)
    }

    pub fn save(&self, store: &impl SettingsStore) -> Result<(), SettingsError> {
        let raw = serde_json::to_string(self)?;
        store.set(SETTINGS_KEY, &raw)
    }

    pub fn is_configured(&self) -> bool {
        !self.server_url.is_empty() && !self.api_token.is_empty()
    }

    /// Ignores values other than 5, 10 and 15.
    pub fn set_auto_refresh_minutes(&mut self, minutes: u32) {
        if REFRESH_CHOICES.contains(&minutes) {
            self.auto_refresh_minutes = minutes;
        }
    }

    pub fn set_credentials(&mut self, server_url: &str, api_token: &str) -> Result<(), SettingsError> {
        let url = normalize_server_url(server_url)?;
        let token = api_token.trim();
        if token.is_empty() {
            return Err(SettingsError::MissingToken);
        }
        self.server_url = url;
        self.api_token = token.to_string();
        Ok(())
    }

    pub fn clear_credentials(&mut self) {
        self.server_url.clear();
        self.api_token.clear();
    }
}

pub fn normalize_server_url(raw: &str) -> Result<String, SettingsError> {
    let url = raw.trim().trim_end_matches('/');
    let has_scheme = url.starts_with("http://") || url.starts_with("https://");
    let has_host = url
        .split_once("://")
        .is_some_and(|(_, rest)| !rest.is_empty());
    if !has_scheme || !has_host {
        return Err(SettingsError::InvalidServerUrl(raw.to_string()));
    }
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_settings_load_defaults() {
        let store = MemoryStore::default();
        let settings = Settings::load(&store).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(!settings.is_configured());
    }

    #[test]
    fn round_trips_through_store() {
        let store = MemoryStore::default();
        let mut settings = Settings::default();
        settings
            .set_credentials(" https://memos.example.org/ ", " secret ")
            .unwrap();
        settings.set_auto_refresh_minutes(15);
        settings.save(&store).unwrap();

        let loaded = Settings::load(&store).unwrap();
        assert_eq!(loaded.server_url, "https://memos.example.org");
        assert_eq!(loaded.api_token, "secret");
        assert_eq!(loaded.auto_refresh_minutes, 15);
        assert!(loaded.is_configured());
    }

    #[test]
    fn invalid_refresh_interval_falls_back() {
        let store = MemoryStore::default();
        store
            .set(SETTINGS_KEY, r#"{"auto_refresh_minutes": 7}"#)
            .unwrap();
        assert_eq!(Settings::load(&store).unwrap().auto_refresh_minutes, 5);

        let mut settings = Settings::default();
        settings.set_auto_refresh_minutes(3);
        assert_eq!(settings.auto_refresh_minutes, 5);
    }

    #[test]
    fn corrupt_settings_are_discarded() {
        let store = MemoryStore::default();
        store.set(SETTINGS_KEY, "not json").unwrap();
        assert_eq!(Settings::load(&store).unwrap(), Settings::default());
    }

    #[test]
    fn rejects_bad_credentials() {
        let mut settings = Settings::default();
        assert!(matches!(
            settings.set_credentials("memos.local", "t"),
            Err(SettingsError::InvalidServerUrl(_))
        ));
        assert!(matches!(
            settings.set_credentials("https://", "t"),
            Err(SettingsError::InvalidServerUrl(_))
        ));
        assert!(matches!(
            settings.set_credentials("http://memos.local", "  "),
            Err(SettingsError::MissingToken)
        ));
        assert!(!settings.is_configured());
    }

    #[test]
    fn clear_credentials_keeps_preferences() {
        let mut settings = Settings::default();
        settings.set_credentials("http://memos.local", "t").unwrap();
        settings.set_auto_refresh_minutes(10);
        settings.clear_credentials();
        assert!(!settings.is_configured());
        assert_eq!(settings.auto_refresh_minutes, 10);
    }
}
