use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use courier_bot::application::errors::RuntimeError;
use courier_bot::domain::traits::Bot;
use courier_bot::infrastructure::adapters::console::{self, ConsoleAdapter};
use courier_bot::infrastructure::config::Config;
use courier_bot::plugins::builtin;
use courier_bot::plugins::process::run_host;
use courier_bot::plugins::{LoopExit, Runtime};

#[derive(Parser)]
#[command(name = "courier-bot")]
#[command(about = "A chat bot with a shell-like command parser and plugin runtime", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: String,

    /// Log at debug level
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot (default)
    Run,
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
    /// Serve one process-mode plugin over stdin/stdout
    #[command(hide = true)]
    PluginHost { name: String },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = load_config(&cli.config);
    init_logging(&config, cli.debug);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_bot(config),
        Commands::Version => {
            println!("courier-bot v{}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        Commands::InitConfig => init_config(),
        Commands::PluginHost { name } => plugin_host(&name),
    }
}

fn load_config(path: &str) -> Config {
    if !Path::new(path).exists() {
        return Config::load_env();
    }
    match Config::load(path) {
        Ok(mut config) => {
            config.apply_env();
            config
        }
        Err(e) => {
            eprintln!("Failed to load config: {}, using defaults", e);
            Config::load_env()
        }
    }
}

/// Logs go to stderr; stdout belongs to the console bot or the host protocol
fn init_logging(config: &Config, debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };

    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn build_runtime() -> Option<tokio::runtime::Runtime> {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => Some(rt),
        Err(e) => {
            tracing::error!("Failed to build async runtime: {}", e);
            None
        }
    }
}

fn run_bot(config: Config) -> ExitCode {
    tracing::info!("Starting courier-bot: {}", config.bot.name);
    let Some(rt) = build_runtime() else {
        return ExitCode::FAILURE;
    };

    let result = rt.block_on(run_console_bot(config));
    // stdin is read on a blocking thread that never returns on its own
    rt.shutdown_background();

    match result {
        Ok(exit) if exit.restart_requested => restart(),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Bot stopped with error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_console_bot(config: Config) -> Result<LoopExit, RuntimeError> {
    let bot = Arc::new(ConsoleAdapter::new(config.bot.id.clone(), config.bot.name.clone()));
    if let Err(e) = bot.start().await {
        tracing::error!("Failed to start bot: {}", e);
    }

    let mut runtime = Runtime::new(config.runtime_settings(), bot);
    for descriptor in builtin::descriptors() {
        runtime.register(descriptor)?;
    }

    let input = runtime.handle();
    tokio::spawn(async move {
        if let Err(e) = console::feed(tokio::io::stdin(), &input).await {
            tracing::warn!("Console input stopped: {}", e);
        }
    });

    let signals = runtime.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, stopping");
            if let Err(e) = signals.stop().await {
                tracing::warn!("Failed to request stop: {}", e);
            }
        }
    });

    let exit = runtime.run().await?;
    tracing::info!("Bot stopped ({} events dropped)", exit.dropped);
    Ok(exit)
}

fn plugin_host(name: &str) -> ExitCode {
    let Some(rt) = build_runtime() else {
        return ExitCode::FAILURE;
    };
    let registry = builtin::descriptors();
    let result = rt.block_on(run_host(&registry, name, tokio::io::stdin(), tokio::io::stdout()));
    rt.shutdown_background();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Plugin host {} failed: {}", name, e);
            ExitCode::FAILURE
        }
    }
}

/// Replace this process with a fresh copy of itself
#[cfg(unix)]
fn restart() -> ExitCode {
    use std::os::unix::process::CommandExt;

    tracing::info!("Restarting");
    let err = match std::env::current_exe() {
        Ok(exe) => std::process::Command::new(exe)
            .args(std::env::args_os().skip(1))
            .exec(),
        Err(e) => e,
    };
    tracing::error!("Failed to restart: {}", err);
    ExitCode::FAILURE
}

#[cfg(not(unix))]
fn restart() -> ExitCode {
    tracing::info!("Restarting");
    let spawned = std::env::current_exe().and_then(|exe| {
        std::process::Command::new(exe)
            .args(std::env::args_os().skip(1))
            .spawn()
    });
    match spawned {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Failed to restart: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_config() -> ExitCode {
    match Config::default().to_yaml() {
        Ok(yaml) => {
            println!("{}", yaml);
            println!("\nSave this to config.yaml and adjust as needed.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
