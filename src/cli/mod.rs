use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod migrate;
pub mod serve;
pub mod token;

use crate::core::AppConfig;

#[derive(Subcommand)]
enum Command {
    /// Create or update the db schema
    Migrate {},
    /// Run the API server
    Serve {
        /// Set the server host address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Set the server port
        #[arg(long, default_value = "2222")]
        port: String,
    },
    /// Print a bearer token for a user
    Token {
        #[arg(long)]
        user_id: String,

        /// How long the token is valid for
        #[arg(long, default_value = "24")]
        ttl_hours: i64,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();
    let config = AppConfig::default();

    // Handle each sub command
    match args.command {
        Some(Command::Migrate {}) => {
            migrate::run(&config.db_path).await?;
        }
        Some(Command::Serve { host, port }) => {
            serve::run(host, port, config).await?;
        }
        Some(Command::Token { user_id, ttl_hours }) => {
            token::run(&user_id, ttl_hours, &config)?;
        }
        None => {}
    }

    Ok(())
}
