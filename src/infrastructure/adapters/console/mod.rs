//! Console adapter for development/testing

use async_trait::async_trait;

use crate::application::errors::BotError;
use crate::domain::traits::{BotIdentity, ChatPort};

/// Console chat adapter for local development; every reply is printed to
/// stdout
pub struct ConsoleAdapter {
    identity: BotIdentity,
}

impl ConsoleAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            identity: BotIdentity {
                id: "console".to_string(),
                name: name.into(),
            },
        }
    }

    pub fn read_line(&self, prompt: &str) -> Option<String> {
        use std::io::Write;
        print!("{}", prompt);
        std::io::stdout().flush().ok()?;
        let mut input = String::new();
        std::io::stdin().read_line(&mut input).ok()?;
        if input.is_empty() {
            // EOF
            return None;
        }
        Some(input.trim_end().to_string())
    }
}

#[async_trait]
impl ChatPort for ConsoleAdapter {
    async fn send_message(&self, _channel_id: &str, text: &str) -> Result<(), BotError> {
        println!("[BOT] {}", text);
        Ok(())
    }

    async fn delete_message(&self, _channel_id: &str, message_id: &str) -> Result<(), BotError> {
        println!("[BOT] (would delete message {})", message_id);
        Ok(())
    }

    fn identity(&self) -> BotIdentity {
        self.identity.clone()
    }
}
