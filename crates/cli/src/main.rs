//! Kafsh CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! kafsh-cli migrate
//!
//! # Grant the admin flag to a Telegram user who has signed in once
//! kafsh-cli admin grant --telegram-id 123456789
//!
//! # Load the catalog from YAML, overwriting existing rows
//! kafsh-cli seed catalog --file crates/cli/seed/catalog.yaml --replace
//!
//! # Mint a signed initData string for local development
//! kafsh-cli dev init-data --user-id 123456789 --first-name Sara
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `admin grant|revoke|list` - Manage the stored admin flag
//! - `seed catalog` - Upsert products from a YAML file
//! - `dev init-data` - Print a signed `initData` payload

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "kafsh-cli")]
#[command(author, version, about = "Kafsh CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run storefront database migrations
    Migrate,
    /// Manage admin users
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Seed the database
    Seed {
        #[command(subcommand)]
        target: SeedTarget,
    },
    /// Local development helpers
    Dev {
        #[command(subcommand)]
        action: DevAction,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Grant the admin flag
    Grant {
        /// Telegram user id
        #[arg(long)]
        telegram_id: i64,
    },
    /// Revoke the admin flag
    Revoke {
        /// Telegram user id
        #[arg(long)]
        telegram_id: i64,
    },
    /// List users with the admin flag
    List,
}

#[derive(Subcommand)]
enum SeedTarget {
    /// Upsert products, variants, sizes and images from YAML
    Catalog {
        /// Path to the catalog YAML file
        #[arg(short, long)]
        file: String,

        /// Overwrite fields, stock and images of existing products
        #[arg(long)]
        replace: bool,
    },
}

#[derive(Subcommand)]
enum DevAction {
    /// Print a signed initData string for `TELEGRAM_BOT_TOKEN`
    InitData {
        /// Telegram user id
        #[arg(long)]
        user_id: i64,

        /// First name
        #[arg(long)]
        first_name: String,

        /// Username without `@`
        #[arg(long)]
        username: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::storefront().await?,
        Commands::Admin { action } => match action {
            AdminAction::Grant { telegram_id } => {
                commands::admin::set_admin(telegram_id, true).await?;
            }
            AdminAction::Revoke { telegram_id } => {
                commands::admin::set_admin(telegram_id, false).await?;
            }
            AdminAction::List => commands::admin::list().await?,
        },
        Commands::Seed { target } => match target {
            SeedTarget::Catalog { file, replace } => {
                commands::seed::catalog(&file, replace).await?;
            }
        },
        Commands::Dev { action } => match action {
            DevAction::InitData {
                user_id,
                first_name,
                username,
            } => commands::dev::init_data(user_id, &first_name, username.as_deref())?,
        },
    }
    Ok(())
}
