use clap::{Parser, Subcommand};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use cogwheel::application::guilds::GuildRegistry;
use cogwheel::application::messaging::{Dispatcher, EXIT_SHUTDOWN};
use cogwheel::domain::entities::{Capabilities, Incoming, Message, User};
use cogwheel::infrastructure::adapters::console::ConsoleAdapter;
use cogwheel::infrastructure::config::Config;
use cogwheel::infrastructure::storage::FileStore;
use cogwheel::plugins::{BaseCog, LibCogLoader, PluginRegistry, Wheel};

#[derive(Parser)]
#[command(name = "cogwheel")]
#[command(about = "A hot-reloading command bot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Load only these cog units and disable discovery
    #[arg(short, long)]
    load: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot on the console adapter
    Run,
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
}

fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            let status = run_bot(cli.config, cli.load);
            std::process::exit(status);
        }
        Commands::Version => {
            println!("cogwheel v{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::InitConfig => {
            if let Err(err) = Config::default().save(&cli.config) {
                tracing::error!("couldn't write {}: {}", cli.config, err);
                std::process::exit(1);
            }
            println!("Wrote default config to {}", cli.config);
        }
    }
}

fn run_bot(config_path: String, load: Vec<String>) -> i32 {
    let config = if std::path::Path::new(&config_path).exists() {
        match Config::load(&config_path) {
            Ok(config) => config.apply_env(),
            Err(err) => {
                tracing::warn!("Failed to load config: {}, using defaults", err);
                Config::default().apply_env()
            }
        }
    } else {
        Config::default().apply_env()
    };

    tracing::info!("Starting {}", config.bot.name);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            tracing::error!("couldn't start runtime: {}", err);
            return 1;
        }
    };
    rt.block_on(run_console(config, load))
}

async fn run_console(config: Config, load: Vec<String>) -> i32 {
    let store = Arc::new(FileStore::new(&config.path.guilds));
    if let Err(err) = store.init().await {
        tracing::error!("couldn't initialize storage: {}", err);
        return 1;
    }
    let guilds = Arc::new(GuildRegistry::new(store));

    let mut registry = PluginRegistry::new(Arc::new(LibCogLoader), &config.path.config);
    registry.install_builtin(Box::new(BaseCog));
    let registry = Arc::new(RwLock::new(registry));

    let chat = Arc::new(ConsoleAdapter::new(&config.bot.name));

    let mut dispatcher = Dispatcher::new(chat.clone(), registry.clone(), guilds);
    if let Some(master) = &config.bot.master {
        dispatcher = dispatcher.with_master(master);
    }
    dispatcher = dispatcher
        .with_admins(config.bot.admins.clone())
        .with_banned(config.bot.banned.clone());
    let mut shutdown = dispatcher.shutdown_signal();

    if load.is_empty() {
        let mut wheel = Wheel::new(
            registry.clone(),
            &config.path.cogs,
            Duration::from_secs(config.wheel.interval_secs),
            config.wheel.import,
            config.wheel.reload,
        );
        wheel.prime();
        tokio::spawn(wheel.run(dispatcher.shutdown_signal()));
    } else {
        // Explicit load list: import exactly these units, no wheel
        let mut registry = registry.write().unwrap_or_else(|e| e.into_inner());
        for name in &load {
            let path = config
                .path
                .cogs
                .join(format!("{}.{}", name, std::env::consts::DLL_EXTENSION));
            registry.load(name, &path, None);
        }
    }

    // The console author gets every capability the dispatcher checks; the
    // master id is used when set so lifecycle commands work locally.
    let author = User::new(
        config.bot.master.clone().unwrap_or_else(|| "console-user".to_string()),
    );
    let caps: Capabilities = ["manage_guild", "manage_messages"].into_iter().collect();

    tracing::info!("Console ready; direct messages need no prefix");
    loop {
        let line = {
            let chat = chat.clone();
            tokio::task::spawn_blocking(move || chat.read_line("> ")).await
        };
        let line = match line {
            Ok(Some(line)) => line,
            _ => break,
        };
        if line.is_empty() {
            continue;
        }
        let incoming = Incoming::new(Message::new("console", author.clone(), line))
            .with_author_caps(caps.clone())
            .with_bot_caps(caps.clone());
        if let Err(err) = dispatcher.handle(incoming).await {
            tracing::error!("dispatch failed: {}", err);
        }
        if shutdown.has_changed().unwrap_or(false) {
            break;
        }
    }
    let status = *shutdown.borrow();
    status.unwrap_or(EXIT_SHUTDOWN)
}
