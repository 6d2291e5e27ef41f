//! Per-guild settings affecting parsing and permission checks.

use serde::{Deserialize, Serialize};

/// The cog implementing enable/disable; it can never be blacklisted,
/// otherwise a guild could lock itself out of re-enabling cogs.
pub const BASE_COG: &str = "base";

/// Persisted per-guild record, rewritten in full on every mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildSettings {
    pub blacklist: Vec<String>,
    pub language: String,
    pub timezone: String,
    pub prefixes: Vec<String>,
    pub breaker: char,
}

impl Default for GuildSettings {
    fn default() -> Self {
        Self {
            blacklist: Vec::new(),
            language: "en".to_string(),
            timezone: "UTC".to_string(),
            prefixes: vec![";".to_string()],
            breaker: '|',
        }
    }
}

impl GuildSettings {
    /// Whether a cog can be used under these settings. A blacklist entry
    /// disables the named cog and all its sub-cogs.
    pub fn allows(&self, cog_name: &str) -> bool {
        !self.blacklist.iter().any(|entry| {
            cog_name == entry || cog_name.starts_with(&format!("{}.", entry))
        })
    }
}

/// Mutable per-guild context. Mutators mark the context dirty; the caller is
/// responsible for flushing dirty contexts to storage.
#[derive(Debug)]
pub struct GuildContext {
    pub id: String,
    settings: GuildSettings,
    dirty: bool,
}

impl GuildContext {
    pub fn new(id: impl Into<String>, settings: GuildSettings) -> Self {
        Self {
            id: id.into(),
            settings,
            dirty: false,
        }
    }

    pub fn settings(&self) -> &GuildSettings {
        &self.settings
    }

    pub fn prefixes(&self) -> &[String] {
        &self.settings.prefixes
    }

    pub fn breaker(&self) -> char {
        self.settings.breaker
    }

    pub fn language(&self) -> &str {
        &self.settings.language
    }

    pub fn timezone(&self) -> &str {
        &self.settings.timezone
    }

    /// Whether a cog can be used on this guild. Disabling `a.b` also
    /// disables `a.b.c`.
    pub fn is_allowed(&self, cog_name: &str) -> bool {
        self.settings.allows(cog_name)
    }

    /// Remove a cog from the blacklist; false if it was not blacklisted
    pub fn enable(&mut self, cog_name: &str) -> bool {
        let before = self.settings.blacklist.len();
        self.settings.blacklist.retain(|entry| entry != cog_name);
        if self.settings.blacklist.len() != before {
            self.dirty = true;
            true
        } else {
            false
        }
    }

    /// Add a cog to the blacklist; refuses the base cog and duplicates
    pub fn disable(&mut self, cog_name: &str) -> bool {
        if cog_name == BASE_COG {
            return false;
        }
        if self.settings.blacklist.iter().any(|entry| entry == cog_name) {
            return false;
        }
        self.settings.blacklist.push(cog_name.to_string());
        self.dirty = true;
        true
    }

    pub fn add_prefix(&mut self, prefix: &str) -> bool {
        if prefix.is_empty() || self.settings.prefixes.iter().any(|p| p == prefix) {
            return false;
        }
        self.settings.prefixes.push(prefix.to_string());
        self.dirty = true;
        true
    }

    pub fn remove_prefix(&mut self, prefix: &str) -> bool {
        let before = self.settings.prefixes.len();
        self.settings.prefixes.retain(|p| p != prefix);
        if self.settings.prefixes.len() != before {
            self.dirty = true;
            true
        } else {
            false
        }
    }

    pub fn set_breaker(&mut self, breaker: char) {
        self.settings.breaker = breaker;
        self.dirty = true;
    }

    pub fn set_language(&mut self, language: impl Into<String>) {
        self.settings.language = language.into();
        self.dirty = true;
    }

    pub fn set_timezone(&mut self, timezone: impl Into<String>) {
        self.settings.timezone = timezone.into();
        self.dirty = true;
    }

    /// Return and clear the dirty flag
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}
