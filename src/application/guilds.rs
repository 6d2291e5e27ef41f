//! Guild registry - lazily materialized per-guild contexts backed by a
//! key-value store. Direct messages get a context keyed by channel, with the
//! same defaults as a fresh guild.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::application::errors::StorageError;
use crate::domain::entities::{GuildContext, GuildSettings, BASE_COG};
use crate::domain::traits::Store;

pub struct GuildRegistry {
    store: Arc<dyn Store>,
    guilds: Mutex<HashMap<String, Arc<Mutex<GuildContext>>>>,
}

fn key(id: &str) -> String {
    format!("guilds/{}", id)
}

impl GuildRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            guilds: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the context for a guild, loading it from the store on first
    /// sight. A missing or unreadable record becomes a fresh default that is
    /// persisted right away.
    pub async fn get_or_create(&self, id: &str) -> Result<Arc<Mutex<GuildContext>>, StorageError> {
        {
            let guilds = self.guilds.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(guild) = guilds.get(id) {
                return Ok(guild.clone());
            }
        }
        let settings = match self.store.get(&key(id)).await? {
            Some(raw) => match serde_json::from_str::<GuildSettings>(&raw) {
                Ok(mut settings) => {
                    // A stored record may predate the base-cog guard
                    if settings.blacklist.iter().any(|cog| cog == BASE_COG) {
                        tracing::warn!("guild {} had cog '{}' blacklisted; dropping it", id, BASE_COG);
                        settings.blacklist.retain(|cog| cog != BASE_COG);
                    }
                    settings
                }
                Err(err) => {
                    tracing::warn!("corrupt record for guild {}, using defaults: {}", id, err);
                    GuildSettings::default()
                }
            },
            None => {
                let settings = GuildSettings::default();
                self.persist(id, &settings).await?;
                settings
            }
        };
        let guild = Arc::new(Mutex::new(GuildContext::new(id, settings)));
        let mut guilds = self.guilds.lock().unwrap_or_else(PoisonError::into_inner);
        // another task may have raced us here; keep whichever landed first
        Ok(guilds.entry(id.to_string()).or_insert(guild).clone())
    }

    /// Write back every context mutated since the last flush
    pub async fn flush(&self) -> Result<(), StorageError> {
        let dirty: Vec<(String, GuildSettings)> = {
            let guilds = self.guilds.lock().unwrap_or_else(PoisonError::into_inner);
            guilds
                .values()
                .filter_map(|guild| {
                    let mut guild = guild.lock().unwrap_or_else(PoisonError::into_inner);
                    guild
                        .take_dirty()
                        .then(|| (guild.id.clone(), guild.settings().clone()))
                })
                .collect()
        };
        for (id, settings) in dirty {
            self.persist(&id, &settings).await?;
        }
        Ok(())
    }

    async fn persist(&self, id: &str, settings: &GuildSettings) -> Result<(), StorageError> {
        let raw = serde_json::to_string(settings)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        self.store.set(&key(id), &raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap as Map;

    #[derive(Default)]
    struct MemStore {
        data: Mutex<Map<String, String>>,
    }

    #[async_trait]
    impl Store for MemStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            Ok(self.data.lock().unwrap().get(key).cloned())
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.data.lock().unwrap().insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<(), StorageError> {
            self.data.lock().unwrap().remove(key);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_first_sight_persists_defaults() {
        let store = Arc::new(MemStore::default());
        let registry = GuildRegistry::new(store.clone());
        let guild = registry.get_or_create("42").await.unwrap();
        assert_eq!(guild.lock().unwrap().prefixes(), [";".to_string()]);
        assert!(store.data.lock().unwrap().contains_key("guilds/42"));
    }

    #[tokio::test]
    async fn test_contexts_are_shared_and_cached() {
        let registry = GuildRegistry::new(Arc::new(MemStore::default()));
        let a = registry.get_or_create("42").await.unwrap();
        let b = registry.get_or_create("42").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_flush_writes_only_dirty_contexts() {
        let store = Arc::new(MemStore::default());
        let registry = GuildRegistry::new(store.clone());
        let guild = registry.get_or_create("42").await.unwrap();
        registry.get_or_create("43").await.unwrap();
        guild.lock().unwrap().add_prefix("!");
        registry.flush().await.unwrap();
        let raw = store.data.lock().unwrap().get("guilds/42").cloned().unwrap();
        let settings: GuildSettings = serde_json::from_str(&raw).unwrap();
        assert!(settings.prefixes.contains(&"!".to_string()));
        // a second flush has nothing to do
        assert!(!guild.lock().unwrap().take_dirty());
    }

    #[tokio::test]
    async fn test_stored_base_blacklist_is_dropped() {
        let store = Arc::new(MemStore::default());
        store
            .set("guilds/42", r#"{"blacklist":["base","games"]}"#)
            .await
            .unwrap();
        let registry = GuildRegistry::new(store);
        let guild = registry.get_or_create("42").await.unwrap();
        let guild = guild.lock().unwrap();
        assert!(guild.is_allowed(BASE_COG));
        assert!(!guild.is_allowed("games"));
    }

    #[tokio::test]
    async fn test_stored_settings_survive_restart() {
        let store = Arc::new(MemStore::default());
        {
            let registry = GuildRegistry::new(store.clone());
            let guild = registry.get_or_create("42").await.unwrap();
            guild.lock().unwrap().set_breaker('/');
            registry.flush().await.unwrap();
        }
        let registry = GuildRegistry::new(store);
        let guild = registry.get_or_create("42").await.unwrap();
        assert_eq!(guild.lock().unwrap().breaker(), '/');
    }
}
