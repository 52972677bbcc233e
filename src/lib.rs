pub mod cart;
pub mod checkout;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod password;
pub mod session;

#[cfg(test)]
mod tests;

use tracing::info;
use tracing_subscriber::EnvFilter;

pub use cart::{Cart, CartItem, ItemId};
pub use checkout::Register;
pub use config::Config;
pub use db::Database;
pub use error::{PosError, PosResult};
pub use session::SessionContext;

/// Open the database at `config.database_path`, creating the schema and
/// migrating older files.
pub fn open(config: &Config) -> PosResult<Database> {
    let db = Database::new(&config.database_path)?;
    db.initialize()?;

    info!("Database ready at {}", config.database_path.display());
    Ok(db)
}

/// Log to stderr, filtered by `RUST_LOG`. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
