use super::User;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Represents an incoming chat message
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub author: User,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(channel_id: impl Into<String>, author: User, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel_id: channel_id.into(),
            guild_id: None,
            author,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_guild(mut self, guild_id: impl Into<String>) -> Self {
        self.guild_id = Some(guild_id.into());
        self
    }

    /// Whether the message comes from a direct/private channel
    pub fn is_direct(&self) -> bool {
        self.guild_id.is_none()
    }
}

/// Set of capability names granted to a caller in a channel.
///
/// A command requirement `(name, true)` means the capability must be granted,
/// `(name, false)` means it must not be.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities(HashSet<String>);

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, name: impl Into<String>) -> Self {
        self.0.insert(name.into());
        self
    }

    pub fn has(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn satisfies(&self, requirements: &[(String, bool)]) -> bool {
        requirements
            .iter()
            .all(|(name, required)| self.has(name) == *required)
    }
}

impl<S: Into<String>> FromIterator<S> for Capabilities {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// A platform event as mapped by an adapter: the message plus the permission
/// sets the platform computed for the author and for the bot in that channel.
#[derive(Debug, Clone)]
pub struct Incoming {
    pub message: Message,
    pub author_caps: Capabilities,
    pub bot_caps: Capabilities,
}

impl Incoming {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            author_caps: Capabilities::new(),
            bot_caps: Capabilities::new(),
        }
    }

    pub fn with_author_caps(mut self, caps: Capabilities) -> Self {
        self.author_caps = caps;
        self
    }

    pub fn with_bot_caps(mut self, caps: Capabilities) -> Self {
        self.bot_caps = caps;
        self
    }

    /// Identifier of the settings context: the guild, or the channel for
    /// direct messages.
    pub fn context_id(&self) -> &str {
        self.message
            .guild_id
            .as_deref()
            .unwrap_or(&self.message.channel_id)
    }
}
