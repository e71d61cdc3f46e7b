//! `timberline-cli`: migrations, staff accounts and catalog seeding.
//!
//! ```bash
//! timberline-cli migrate
//!
//! # The first super admin. The password is read from stdin.
//! echo "$PASSWORD" | timberline-cli staff create -e owner@timberline.example -n "Owner" -r super_admin
//!
//! timberline-cli staff set-role -e lin@timberline.example -r support
//! timberline-cli staff deactivate -e lin@timberline.example
//! timberline-cli seed catalog -f data/catalog.yaml
//! ```
//!
//! Every command connects with `DATABASE_URL`; a `.env` file is honored.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use timberline_core::StaffRole;

mod commands;

use commands::CliError;

#[derive(Parser)]
#[command(name = "timberline-cli", author, version, about = "Timberline database and staff tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending database migrations
    Migrate,
    /// Create and manage staff accounts
    #[command(subcommand)]
    Staff(StaffCommand),
    /// Load data files into the backend
    #[command(subcommand)]
    Seed(SeedCommand),
}

#[derive(Subcommand)]
enum StaffCommand {
    /// Create an account. The password is the first line of stdin.
    Create {
        #[arg(short, long)]
        email: String,
        /// Name shown in the back office
        #[arg(short, long)]
        name: String,
        /// `super_admin`, `admin`, `manager` or `support`
        #[arg(short, long, default_value = "support", value_parser = role_arg)]
        role: StaffRole,
    },
    /// Give an existing account a new role
    SetRole {
        #[arg(short, long)]
        email: String,
        #[arg(short, long, value_parser = role_arg)]
        role: StaffRole,
    },
    /// Switch an account off; its open sessions lose access on their next request
    Deactivate {
        #[arg(short, long)]
        email: String,
    },
}

#[derive(Subcommand)]
enum SeedCommand {
    /// Upsert products from a YAML file, matched by slug
    Catalog {
        #[arg(short, long, default_value = "data/catalog.yaml")]
        file: PathBuf,
    },
}

fn role_arg(raw: &str) -> Result<StaffRole, String> {
    commands::staff::parse_role(raw).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .init();

    if let Err(e) = run(Cli::parse()).await {
        tracing::error!(error = %e, "command failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Migrate => commands::migrate::run().await,
        Command::Staff(StaffCommand::Create { email, name, role }) => {
            let password = commands::staff::read_password()?;
            commands::staff::create(&email, &name, role, &password).await
        }
        Command::Staff(StaffCommand::SetRole { email, role }) => commands::staff::set_role(&email, role).await,
        Command::Staff(StaffCommand::Deactivate { email }) => commands::staff::deactivate(&email).await,
        Command::Seed(SeedCommand::Catalog { file }) => commands::seed::catalog(&file).await,
    }
}
