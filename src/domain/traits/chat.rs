use async_trait::async_trait;

use crate::application::errors::BotError;

/// Identity of the bot account on the platform
#[derive(Debug, Clone)]
pub struct BotIdentity {
    pub id: String,
    pub name: String,
}

impl BotIdentity {
    /// Both mention spellings used by the platform; always implicit prefixes
    pub fn mentions(&self) -> [String; 2] {
        [format!("<@{}>", self.id), format!("<@!{}>", self.id)]
    }
}

/// ChatPort trait - abstraction for messaging platform adapters
#[async_trait]
pub trait ChatPort: Send + Sync {
    /// Send a text reply to a channel
    async fn send_message(&self, channel_id: &str, text: &str) -> Result<(), BotError>;

    /// Delete a message, if the platform allows it
    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), BotError>;

    /// The bot's own identity
    fn identity(&self) -> BotIdentity;
}
