use clap::{Parser, Subcommand};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;

use syer_bot::application::errors::BotError;
use syer_bot::application::messaging::Dispatcher;
use syer_bot::application::services::{AuthGate, BotService};
use syer_bot::domain::traits::{ConfigStore, Transport};
use syer_bot::infrastructure::adapters::ConsoleAdapter;
use syer_bot::infrastructure::config::Config;
use syer_bot::infrastructure::database::Database;
use syer_bot::infrastructure::plugins::{
    HostCapabilities, PluginLoader, PluginRuntime, Registry, RegistrySlot,
};
use syer_bot::infrastructure::storage::{JsonFileStore, MemoryStore};

#[derive(Parser)]
#[command(name = "syer-bot")]
#[command(about = "A chat bot driven by sandboxed plugin scripts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot
    Run,
    /// Load the plugin directory once and list what it registers
    Plugins,
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
}

fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => run_bot(&cli.config),
        Commands::Plugins => list_plugins(&cli.config),
        Commands::Version => {
            println!("syer-bot v{}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        Commands::InitConfig => init_config(),
    }
}

fn load_config(path: &str) -> Result<Config, BotError> {
    let mut config = Config::load(path)?;
    config.apply_env();
    config.validate()?;
    Ok(config)
}

fn run_bot(config_path: &str) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Refusing to start: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), BotError> {
    tracing::info!(
        "Starting {} as {} on {}:{}",
        config.bot.name,
        config.network.nick,
        config.network.server,
        config.network.port
    );

    let database = Arc::new(Database::new(&config.database.path)?);
    tracing::info!("Database opened: {}", config.database.path.display());

    let store = JsonFileStore::new(&config.store.directory);
    store.init()?;
    let store: Arc<dyn ConfigStore> = Arc::new(store);
    let auth = Arc::new(AuthGate::load(store.clone()));

    let slot = Arc::new(RegistrySlot::default());
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let host = Arc::new(HostCapabilities::new(
        store,
        auth.clone(),
        database,
        slot.clone(),
        control_tx.clone(),
    ));
    let loader = PluginLoader::new(
        &config.plugins.directory,
        config.plugins.sandbox.clone(),
        host,
    );
    let plugins = Arc::new(PluginRuntime::new(loader, slot.clone()));
    plugins.reload().await?;

    let transport: Arc<dyn Transport> = Arc::new(ConsoleAdapter::new(&config.network.nick));
    let dispatcher = Arc::new(Dispatcher::new(slot, auth.clone(), transport.clone()));
    let service = BotService::new(dispatcher, plugins, auth, transport);
    service
        .join_startup_channels(&config.network.channels)
        .await?;

    let (events_tx, events_rx) = mpsc::channel(64);
    tokio::spawn(ConsoleAdapter::read_input(events_tx, control_tx));
    tracing::info!("Console ready, type :quit to stop");

    service.run(events_rx, control_rx).await
}

/// Dry run: scripts get an in-memory store and database, so nothing
/// they do at load time is persisted
fn list_plugins(config_path: &str) -> ExitCode {
    let mut config = if Path::new(config_path).exists() {
        match Config::load(config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("{}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        Config::default()
    };
    config.apply_env();

    let database = match Database::open_in_memory() {
        Ok(db) => Arc::new(db),
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let store: Arc<dyn ConfigStore> = Arc::new(MemoryStore::new());
    let auth = Arc::new(AuthGate::load(store.clone()));
    let slot = Arc::new(RegistrySlot::default());
    let (control_tx, _control_rx) = mpsc::unbounded_channel();
    let host = Arc::new(HostCapabilities::new(store, auth, database, slot, control_tx));
    let loader = PluginLoader::new(&config.plugins.directory, config.plugins.sandbox, host);

    let (registry, report) = match loader.load_all() {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    print_registry(&registry);
    for failure in report.failed.iter().chain(&report.discarded) {
        eprintln!("! {}", failure);
    }
    println!("\n{}", report);

    if report.failed.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_registry(registry: &Registry) {
    for d in &registry.commands {
        let places: Vec<String> = d.places.iter().map(|p| p.to_string()).collect();
        let mut flags = Vec::new();
        if let Some(group) = &d.permission {
            flags.push(format!("perm={}", group));
        }
        if d.admin_only {
            flags.push("admin".to_string());
        }
        println!(
            "{:<16} {:<12} {:<8} {:<20} [{}] {} {}",
            d.plugin,
            d.name,
            d.spec.kind(),
            d.spec.key(),
            places.join(","),
            flags.join(" "),
            d.help.as_deref().unwrap_or("")
        );
    }
    for d in &registry.joins {
        println!(
            "{:<16} {:<12} {}",
            d.plugin,
            "<join>",
            if d.admin_only { "admin" } else { "" }
        );
    }
    for r in &registry.routes {
        println!("{:<16} {:<12} {} {}", r.plugin, "<route>", r.method, r.path);
    }
}

fn init_config() -> ExitCode {
    match serde_yaml::to_string(&Config::default()) {
        Ok(yaml) => {
            println!("{}", yaml);
            println!("\nSave this to config.yaml and adjust as needed.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Failed to render default config: {}", e);
            ExitCode::FAILURE
        }
    }
}
