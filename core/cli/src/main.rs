//! seeme: command-line client for the SeeMe daemon.
//!
//! ## Subcommands
//!
//! - `add`, `delete`, `update`, `list`: account administration (localhost only
//!   unless the daemon allows remote admin)
//! - `login`, `report`: what a monitored machine runs; credentials come from
//!   flags or the `[client]` section of `seeme.toml`
//! - `status`: last activity for one account, plus online/disconnect
//! - `health`: daemon liveness and counters

mod commands;
mod daemon_client;
mod logging;

use clap::{Args, Parser, Subcommand};
use seeme_core::{config_path, load_config, ClientSection, StorageConfig};
use std::time::Duration;

use commands::{CliError, Credentials};
use daemon_client::DaemonClient;

#[derive(Parser)]
#[command(name = "seeme")]
#[command(about = "SeeMe account and activity client")]
#[command(version)]
struct Cli {
    /// Daemon address (host:port). Overrides SEEME_ADDR and ~/.seeme/daemon.addr
    #[arg(long, global = true, value_name = "ADDR")]
    addr: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Falls back to `[client]` in seeme.toml for anything not given.
#[derive(Args)]
struct CredentialArgs {
    #[arg(long, value_name = "IDENTITY")]
    identity: Option<String>,
    #[arg(long, value_name = "NAME")]
    name: Option<String>,
    /// Prefer `[client] password` so it stays out of the process list
    #[arg(long, value_name = "PASSWORD")]
    password: Option<String>,
}

impl CredentialArgs {
    fn resolve(self, client: &ClientSection) -> Result<Credentials, CliError> {
        Credentials::resolve(self.identity, self.name, self.password, client)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and print its identity
    Add {
        #[arg(value_name = "NAME")]
        name: String,
        #[arg(value_name = "PASSWORD")]
        password: String,
    },

    /// Delete an account
    Delete {
        #[arg(value_name = "IDENTITY")]
        identity: String,
    },

    /// Replace an account's name and password
    Update {
        #[arg(value_name = "IDENTITY")]
        identity: String,
        #[arg(value_name = "NAME")]
        name: String,
        #[arg(value_name = "PASSWORD")]
        password: String,
    },

    /// List every account
    List,

    /// Show an account's last activity
    Status {
        #[arg(value_name = "IDENTITY")]
        identity: String,
    },

    /// Log in with an account's credentials
    Login {
        #[command(flatten)]
        credentials: CredentialArgs,
    },

    /// Log in, then push an activity label
    Report {
        #[arg(value_name = "LABEL")]
        label: String,

        #[command(flatten)]
        credentials: CredentialArgs,

        /// Keep reporting every N seconds until the daemon refuses a push.
        /// Defaults to `[client] report_every_secs`
        #[arg(long, value_name = "SECS")]
        every: Option<u64>,
    },

    /// Check that the daemon is up
    Health,
}

fn main() {
    let storage = StorageConfig::default();
    let _logging_guard = logging::init(&storage);
    let cli = Cli::parse();

    let config = match load_config(&config_path(&storage)) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "Failed to load config");
            eprintln!("seeme: {}", err);
            std::process::exit(2);
        }
    };

    let client = match DaemonClient::resolve(cli.addr.as_deref(), &storage, &config) {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(error = %err, "Failed to resolve daemon address");
            eprintln!("seeme: {}", err);
            std::process::exit(2);
        }
    };

    let mut stdout = std::io::stdout().lock();
    let result = match cli.command {
        Commands::Add { name, password } => commands::add(&client, &name, &password, &mut stdout),
        Commands::Delete { identity } => commands::delete(&client, &identity, &mut stdout),
        Commands::Update {
            identity,
            name,
            password,
        } => commands::update(&client, &identity, &name, &password, &mut stdout),
        Commands::List => commands::list(&client, &mut stdout),
        Commands::Status { identity } => commands::status(&client, &identity, &mut stdout),
        Commands::Login { credentials } => credentials
            .resolve(&config.client)
            .and_then(|credentials| commands::login(&client, &credentials, &mut stdout)),
        Commands::Report {
            label,
            credentials,
            every,
        } => credentials.resolve(&config.client).and_then(|credentials| {
            let every = every
                .or(config.client.report_every_secs)
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs);
            commands::report(&client, &credentials, &label, every, &mut stdout)
        }),
        Commands::Health => commands::health(&client, &mut stdout),
    };

    if let Err(err) = result {
        tracing::error!(error = %err, "seeme command failed");
        eprintln!("seeme: {}", err);
        std::process::exit(1);
    }
}
