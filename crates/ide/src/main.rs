// ide/src/main.rs
use clap::{Parser, Subcommand};
use contract_ide::{Command, Ide, IdeConfig, Repl, SAMPLE_CONTRACT};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "contract-ide")]
#[command(about = "Contract development workbench", version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a workspace with a config file and a sample contract
    Init {
        /// Workspace directory
        #[arg(short, long, default_value = ".")]
        dir: String,
    },

    /// Type-check a contract file
    Check {
        /// Contract source file
        file: String,
    },

    /// List the simulated chain's genesis accounts
    Accounts {
        /// Configuration file path
        #[arg(short, long, default_value = "./config.toml")]
        config: String,
    },

    /// Start an interactive session
    Repl {
        /// Configuration file path
        #[arg(short, long, default_value = "./config.toml")]
        config: String,

        /// Keep sources in memory instead of the workspace directory
        #[arg(short, long)]
        ephemeral: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so they do not interleave with command output
    let log_level = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "contract_ide={0},session={0},simulator={0},storage={0}",
                    log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Init { dir } => init_workspace(&dir)?,
        Commands::Check { file } => check_file(&file).await?,
        Commands::Accounts { config } => show_accounts(&config)?,
        Commands::Repl { config, ephemeral } => run_repl(&config, ephemeral).await?,
    }

    Ok(())
}

fn load_config(path: &str) -> anyhow::Result<IdeConfig> {
    if Path::new(path).exists() {
        tracing::info!("Loading configuration from {}", path);
        IdeConfig::from_file(path)
    } else {
        tracing::warn!("{} not found, using default configuration", path);
        Ok(IdeConfig::default())
    }
}

fn init_workspace(dir: &str) -> anyhow::Result<()> {
    tracing::info!("Initializing workspace at {}", dir);

    let contracts = Path::new(dir).join("contracts");
    std::fs::create_dir_all(&contracts)?;

    let config = IdeConfig {
        workspace_dir: contracts.display().to_string(),
        ..Default::default()
    };
    let config_path = Path::new(dir).join("config.toml");
    config.to_file(&config_path)?;

    let sample = contracts.join(format!("Counter.{}", storage::DEFAULT_EXTENSION));
    if !sample.exists() {
        std::fs::write(&sample, SAMPLE_CONTRACT)?;
    }

    println!("Workspace initialized at {}", dir);
    println!("Edit {} to configure the session", config_path.display());
    Ok(())
}

async fn check_file(path: &str) -> anyhow::Result<()> {
    use session::Checker;
    use simulator::{CheckerConfig, SimulatedChecker};

    let code = std::fs::read_to_string(path)?;
    let checker = SimulatedChecker::new(&CheckerConfig::default());
    let result = checker.check(&code).await;

    if result.is_success() {
        println!("{}: no errors", path);
        return Ok(());
    }

    for line in contract_ide::repl::diagnostic_lines(result.diagnostics()) {
        println!("{}:{}", path, line);
    }
    anyhow::bail!("{} failed type-checking", path)
}

fn show_accounts(config_path: &str) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    for account in config.chain.genesis_accounts() {
        println!("{} balance={}", account.address, account.balance);
    }
    Ok(())
}

async fn run_repl(config_path: &str, ephemeral: bool) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    let mut ide = if ephemeral {
        let store = Arc::new(storage::MemoryStore::with_sources([("Counter", SAMPLE_CONTRACT)]));
        Ide::new(config, store)
    } else {
        Ide::with_workspace(config)
    };
    let loaded = ide.start().await?;
    println!("{} source files loaded. Type 'help' for commands.", loaded);

    let mut repl = Repl::new(ide);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received shutdown signal");
                None
            }
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<Command>() {
            Ok(Command::Quit) => break,
            Ok(command) => command,
            Err(err) => {
                println!("error: {}", err);
                continue;
            }
        };

        match repl.execute(command).await {
            Ok(output) => output.iter().for_each(|line| println!("{}", line)),
            Err(err) => println!("error: {}", err),
        }
        for notification in repl.drain_notifications() {
            println!("{}", notification);
        }
    }

    println!("Bye");
    Ok(())
}
