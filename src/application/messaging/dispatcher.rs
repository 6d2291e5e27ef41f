//! Message dispatcher: from an incoming platform message to command
//! invocations, replies and lifecycle signals.
//!
//! The dispatcher never holds a registry or guild lock across an await
//! point: command handlers run synchronously under a read guard and produce
//! a list of actions, which are performed against the chat port afterwards.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

use crate::application::errors::BotError;
use crate::application::guilds::GuildRegistry;
use crate::application::messaging::tokenizer::read_commands;
use crate::application::messaging::{binder, pretty};
use crate::domain::entities::{GuildContext, GuildSettings, Incoming};
use crate::domain::traits::ChatPort;
use crate::plugins::cog::Context;
use crate::plugins::registry::{reload_unit, CogState, SharedRegistry};

/// Process exit status asking the supervisor not to bring the bot back up
pub const EXIT_SHUTDOWN: i32 = 69;
/// Process exit status asking the supervisor to start a fresh process
pub const EXIT_RESTART: i32 = 82;

enum Action {
    Reply(String),
    DeleteTrigger,
    /// Reload a cog by name; runs in the async phase so the registry write
    /// lock is not held while the unit is re-imported
    ReloadCog(String),
    Exit(i32),
}

pub struct Dispatcher {
    chat: Arc<dyn ChatPort>,
    cogs: SharedRegistry,
    guilds: Arc<GuildRegistry>,
    master: Option<String>,
    admins: Vec<String>,
    banned: Vec<String>,
    shutdown: watch::Sender<Option<i32>>,
}

impl Dispatcher {
    pub fn new(chat: Arc<dyn ChatPort>, cogs: SharedRegistry, guilds: Arc<GuildRegistry>) -> Self {
        let (shutdown, _) = watch::channel(None);
        Self {
            chat,
            cogs,
            guilds,
            master: None,
            admins: Vec::new(),
            banned: Vec::new(),
            shutdown,
        }
    }

    pub fn with_master(mut self, master: impl Into<String>) -> Self {
        self.master = Some(master.into());
        self
    }

    pub fn with_admins(mut self, admins: Vec<String>) -> Self {
        self.admins = admins;
        self
    }

    pub fn with_banned(mut self, banned: Vec<String>) -> Self {
        self.banned = banned;
        self
    }

    /// Receiver signalled with the process exit status on shutdown/restart
    pub fn shutdown_signal(&self) -> watch::Receiver<Option<i32>> {
        self.shutdown.subscribe()
    }

    fn is_master(&self, user_id: &str) -> bool {
        self.master.as_deref() == Some(user_id)
    }

    fn is_admin(&self, user_id: &str) -> bool {
        self.is_master(user_id) || self.admins.iter().any(|id| id == user_id)
    }

    /// Entry point for every message the platform adapter hands over
    pub async fn handle(&self, incoming: Incoming) -> Result<(), BotError> {
        let author = &incoming.message.author;
        if author.is_bot || author.id == self.chat.identity().id {
            return Ok(());
        }
        if self.banned.iter().any(|id| id == &author.id) {
            tracing::debug!("dropping message from banned user {}", author.id);
            return Ok(());
        }

        let guild = self.guilds.get_or_create(incoming.context_id()).await?;

        let (commands, sole) = {
            let guard = guild.lock().unwrap_or_else(PoisonError::into_inner);
            let mut prefixes: Vec<String> = self.chat.identity().mentions().to_vec();
            prefixes.extend(guard.prefixes().iter().cloned());
            read_commands(
                &incoming.message.content,
                &prefixes,
                guard.breaker(),
                incoming.message.is_direct(),
            )
        };

        if commands.is_empty() {
            self.emit_message_event(&incoming, &guild).await?;
        } else {
            let sole = sole && commands.len() == 1;
            for command in commands {
                let actions = self.resolve(&command, &incoming, &guild, sole);
                self.perform(actions, &incoming).await?;
            }
        }

        self.guilds.flush().await?;
        Ok(())
    }

    /// Turn one extracted command string into a list of actions. Runs
    /// entirely synchronously; the registry read guard is dropped before any
    /// chat traffic.
    fn resolve(
        &self,
        command: &str,
        incoming: &Incoming,
        guild: &Arc<Mutex<GuildContext>>,
        sole: bool,
    ) -> Vec<Action> {
        let (word, rest) = match command.split_once(char::is_whitespace) {
            Some((word, rest)) => (word.to_lowercase(), rest),
            None => (command.to_lowercase(), ""),
        };
        if word.is_empty() {
            return Vec::new();
        }

        if let Some(actions) = self.special(&word, rest, incoming) {
            return actions;
        }

        let settings = {
            let guard = guild.lock().unwrap_or_else(PoisonError::into_inner);
            guard.settings().clone()
        };

        let registry = self.cogs.read().unwrap_or_else(|e| e.into_inner());
        let spec = match lookup(&registry, &word, &settings, incoming) {
            Lookup::Found(spec) => spec,
            Lookup::None => return Vec::new(),
            Lookup::Ambiguous(cogs) => {
                return vec![Action::Reply(format!(
                    "The command `{}` was found in multiple cogs: {}. Use `<cog>.{}` to specify.",
                    word,
                    pretty(&cogs, "`%s`", "and"),
                    word
                ))]
            }
        };

        let bound = match binder::bind(&spec, rest) {
            Ok(bound) => bound,
            Err(err) => return vec![Action::Reply(err.to_string())],
        };

        let Some(handler) = spec.handler.clone() else {
            tracing::error!("command '{}' has no handler", spec.name);
            return Vec::new();
        };
        let ctx = Context {
            message: &incoming.message,
            caps: &incoming.author_caps,
            guild: guild.as_ref(),
            cogs: &registry,
        };
        let mut actions = Vec::new();
        match catch_unwind(AssertUnwindSafe(|| handler(&ctx, &bound))) {
            Ok(Ok(Some(reply))) => actions.push(Action::Reply(reply)),
            Ok(Ok(None)) => {}
            Ok(Err(err)) => {
                tracing::warn!("command '{}' failed: {}", spec.name, err);
                actions.push(Action::Reply(format!(
                    "Something went wrong while running `{}`",
                    word
                )));
            }
            Err(_) => {
                tracing::error!("command '{}' panicked", spec.name);
                actions.push(Action::Reply(format!(
                    "Something went wrong while running `{}`",
                    word
                )));
            }
        }
        if spec.delete_message && sole && incoming.bot_caps.has("manage_messages") {
            actions.push(Action::DeleteTrigger);
        }
        actions
    }

    /// Lifecycle commands handled by the dispatcher itself, outside any cog.
    /// Returns `None` when the word is not special, so cogs may still claim
    /// it.
    fn special(&self, word: &str, rest: &str, incoming: &Incoming) -> Option<Vec<Action>> {
        let author = &incoming.message.author.id;
        match word {
            "shutdown" | "restart" => {
                // only the master may take the bot down for good
                let allowed = if word == "shutdown" {
                    self.is_master(author)
                } else {
                    self.is_admin(author)
                };
                if !allowed {
                    return Some(Vec::new());
                }
                let status = if word == "shutdown" {
                    EXIT_SHUTDOWN
                } else {
                    EXIT_RESTART
                };
                {
                    let mut registry = self.cogs.write().unwrap_or_else(|e| e.into_inner());
                    registry.shutdown_all();
                }
                Some(vec![
                    Action::Reply(
                        if status == EXIT_SHUTDOWN {
                            "Shutting down"
                        } else {
                            "Restarting"
                        }
                        .to_string(),
                    ),
                    Action::Exit(status),
                ])
            }
            "reload" => {
                if !self.is_admin(author) {
                    return Some(Vec::new());
                }
                let name = rest.trim();
                if name.is_empty() {
                    return Some(vec![Action::Reply("Reload which cog?".to_string())]);
                }
                Some(vec![Action::ReloadCog(name.to_string())])
            }
            _ => None,
        }
    }

    async fn perform(&self, actions: Vec<Action>, incoming: &Incoming) -> Result<(), BotError> {
        for action in actions {
            match action {
                Action::Reply(text) => {
                    self.chat
                        .send_message(&incoming.message.channel_id, &text)
                        .await?
                }
                Action::DeleteTrigger => {
                    self.chat
                        .delete_message(&incoming.message.channel_id, &incoming.message.id)
                        .await?
                }
                Action::ReloadCog(name) => {
                    let reply = match reload_unit(&self.cogs, &name).await {
                        Some(CogState::Loaded) => format!("Cog `{}` reloaded", name),
                        Some(state) => format!("Cog `{}` is now {}", name, state.as_str()),
                        None => format!("No such cog: `{}`", name),
                    };
                    self.chat
                        .send_message(&incoming.message.channel_id, &reply)
                        .await?
                }
                Action::Exit(status) => {
                    tracing::info!("exiting with status {}", status);
                    let _ = self.shutdown.send(Some(status));
                }
            }
        }
        Ok(())
    }

    /// Non-command messages still reach cogs through their "message" hooks
    async fn emit_message_event(
        &self,
        incoming: &Incoming,
        guild: &Arc<Mutex<GuildContext>>,
    ) -> Result<(), BotError> {
        let settings = {
            let guard = guild.lock().unwrap_or_else(PoisonError::into_inner);
            guard.settings().clone()
        };
        let replies = {
            let registry = self.cogs.read().unwrap_or_else(|e| e.into_inner());
            let ctx = Context {
                message: &incoming.message,
                caps: &incoming.author_caps,
                guild: guild.as_ref(),
                cogs: &registry,
            };
            registry.emit("message", &ctx, &settings)
        };
        for reply in replies {
            self.chat
                .send_message(&incoming.message.channel_id, &reply)
                .await?;
        }
        Ok(())
    }
}

enum Lookup {
    Found(Arc<crate::domain::entities::CommandSpec>),
    Ambiguous(Vec<String>),
    None,
}

/// Resolve a command word, dotted or bare, against the loaded cogs
fn lookup(
    registry: &crate::plugins::registry::PluginRegistry,
    word: &str,
    settings: &GuildSettings,
    incoming: &Incoming,
) -> Lookup {
    if let Some((cog_name, command)) = word.rsplit_once('.') {
        if !settings.allows(cog_name) {
            return Lookup::None;
        }
        return match registry
            .cog(cog_name)
            .and_then(|cog| cog.table.get_permitted(command, &incoming.author_caps))
        {
            Some(spec) => Lookup::Found(spec),
            None => Lookup::None,
        };
    }
    let mut matches = registry.find_command(word, settings, &incoming.author_caps);
    match matches.len() {
        0 => Lookup::None,
        1 => Lookup::Found(matches.remove(0).1),
        _ => Lookup::Ambiguous(matches.into_iter().map(|(cog, _)| cog).collect()),
    }
}
