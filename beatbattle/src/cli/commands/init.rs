//! `init` command
//!
//! Opening the gateway creates the schema, so by the time this handler runs
//! the database is ready. It only reports where.

use serde_json::json;
use tracing::warn;

use crate::app::App;
use crate::cli::args::{InitArgs, OutputFormat};
use crate::error::BattleError;

use super::print_json;

/// Report the initialized database.
///
/// # Errors
///
/// Returns a JSON error if the report cannot be serialized.
pub fn run(app: &App, args: &InitArgs) -> Result<(), BattleError> {
    let database = &app.config().database;
    if database.is_memory() {
        warn!("nothing persisted: the in-memory database is discarded on exit");
    }

    match args.format {
        OutputFormat::Human => {
            println!("database ready: {}", database.url);
            Ok(())
        }
        OutputFormat::Json => print_json(&json!({
            "database": database.url,
            "persistent": !database.is_memory(),
        })),
    }
}
