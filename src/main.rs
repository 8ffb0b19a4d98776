use clap::{Parser, Subcommand};
use forum::{init_db, init_tracing, run_app, set_user_active_in_db, set_user_admin_in_db, Config};

/// Forum backend: users, posts and threaded comments over a REST API.
#[derive(Parser)]
#[command(name = "forum")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve,

    /// Give an account admin rights
    GrantAdmin {
        /// Username or email
        identifier: String,
    },

    /// Take admin rights away from an account
    RevokeAdmin { identifier: String },

    /// Disable an account; it can no longer log in
    Deactivate { identifier: String },

    /// Re-enable a disabled account
    Activate { identifier: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let config = Config::from_env()?;

    let (identifier, change) = match Cli::parse().command.unwrap_or(Commands::Serve) {
        Commands::Serve => return run_app(config).await,
        Commands::GrantAdmin { identifier } => (identifier, AccountChange::Admin(true)),
        Commands::RevokeAdmin { identifier } => (identifier, AccountChange::Admin(false)),
        Commands::Deactivate { identifier } => (identifier, AccountChange::Active(false)),
        Commands::Activate { identifier } => (identifier, AccountChange::Active(true)),
    };

    let pool = init_db(&config).await?;
    let user = match change {
        AccountChange::Admin(value) => set_user_admin_in_db(&pool, &identifier, value).await?,
        AccountChange::Active(value) => set_user_active_in_db(&pool, &identifier, value).await?,
    };
    println!(
        "{} (id {}): admin={} active={}",
        user.username, user.id, user.is_admin, user.is_active
    );
    Ok(())
}

enum AccountChange {
    Admin(bool),
    Active(bool),
}
