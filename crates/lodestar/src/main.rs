use chrono::DateTime;
use clap::Parser;
use entity::account;
use lodestar_core::validation;
use lodestar_lib::{
    config::{Command, Config},
    server::run_server,
};
use migration::MigratorTrait;
use sea_orm::{ActiveModelTrait, ColumnTrait, Database, EntityTrait, QueryFilter, QueryOrder, Set};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let config = Config::parse();

    // Initialize logger based on command
    let log_level = match &config.command {
        Command::Serve(serve_config) => serve_config.log_level.as_str(),
        _ => "info",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match config.command {
        Command::Serve(serve_config) => {
            serve_config.validate()?;
            run_server(serve_config).await?;
        }
        Command::Migrate { database_url } => {
            run_migrations(&database_url).await?;
        }
        Command::ListAccounts { database_url } => {
            list_accounts(&database_url).await?;
        }
        Command::RevokeSession {
            database_url,
            username,
        } => {
            revoke_session(&database_url, &username).await?;
        }
    }

    Ok(())
}

async fn run_migrations(database_url: &str) -> anyhow::Result<()> {
    log::info!("Connecting to database: {}", database_url);
    let db = Database::connect(database_url).await?;

    log::info!("Running database migrations...");
    migration::Migrator::up(&db, None).await?;

    println!("✅ Database migrations completed successfully!");

    Ok(())
}

async fn list_accounts(database_url: &str) -> anyhow::Result<()> {
    let db = Database::connect(database_url).await?;

    let accounts = account::Entity::find()
        .order_by_asc(account::Column::CreatedAt)
        .all(&db)
        .await?;

    if accounts.is_empty() {
        println!("No accounts found.");
        return Ok(());
    }

    println!("Accounts:");
    println!(
        "{:<38} {:<20} {:<30} {:<8} {:<20}",
        "ID", "Username", "Email", "Session", "Created At"
    );
    println!("{}", "-".repeat(120));
    for account in accounts {
        let created_at = DateTime::from_timestamp(account.created_at, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| account.created_at.to_string());
        let session = if account.refresh_token.is_some() { "yes" } else { "no" };

        println!(
            "{:<38} {:<20} {:<30} {:<8} {:<20}",
            account.id, account.username, account.email, session, created_at
        );
    }

    Ok(())
}

async fn revoke_session(database_url: &str, username: &str) -> anyhow::Result<()> {
    let db = Database::connect(database_url).await?;

    let username = validation::normalize_username(username);
    let Some(existing) = account::Entity::find()
        .filter(account::Column::Username.eq(&username))
        .one(&db)
        .await?
    else {
        anyhow::bail!("Account '{}' not found", username);
    };

    let mut active: account::ActiveModel = existing.into();
    active.refresh_token = Set(None);
    active.updated_at = Set(chrono::Utc::now().timestamp());
    active.update(&db).await?;

    println!("✅ Session revoked for '{}'", username);

    Ok(())
}
