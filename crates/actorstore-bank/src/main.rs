//! Bank sample host: deposits into an account stored in `PostgreSQL` and
//! prints the resulting view.
//!
//! Usage: `actorstore-bank <account-id> <amount>`

use std::error::Error;
use std::sync::Arc;

use actorstore_bank::application::command_handlers::handle_deposit;
use actorstore_bank::application::query_handlers::get_account_by_id;
use actorstore_bank::domain::commands::Deposit;
use actorstore_core::options::StorageOptions;
use actorstore_table::postgres::PgTableStore;
use actorstore_table::storage::ActorStorage;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let mut args = std::env::args().skip(1);
    let account_id = args.next().ok_or("usage: actorstore-bank <account-id> <amount>")?;
    let amount: i64 = args
        .next()
        .ok_or("usage: actorstore-bank <account-id> <amount>")?
        .parse()
        .map_err(|e| format!("amount must be an integer: {e}"))?;

    // Read configuration from environment.
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| "DATABASE_URL environment variable must be set")?;
    let options = StorageOptions::from_env()?;
    tracing::info!(?options, "starting bank sample");

    let store = PgTableStore::connect(&database_url).await?;
    store.ensure_schema().await?;
    let storage = ActorStorage::with_options(Arc::new(store), options);

    let command = Deposit {
        correlation_id: Uuid::new_v4(),
        account_id: account_id.clone(),
        amount,
        description: None,
    };
    handle_deposit(&command, &storage).await?;

    let view = get_account_by_id(&account_id, &storage).await?;
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}
