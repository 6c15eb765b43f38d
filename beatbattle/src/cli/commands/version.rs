//! Version information display
//!
//! Prints version and build metadata in human or JSON format.

use serde_json::json;

use crate::cli::args::{OutputFormat, VersionArgs};

/// Print version and build information.
pub fn run(args: &VersionArgs) {
    let name = env!("CARGO_PKG_NAME");
    let version = env!("CARGO_PKG_VERSION");

    match args.format {
        OutputFormat::Human => println!("{name} {version}"),
        OutputFormat::Json => println!(
            "{}",
            json!({ "name": name, "version": version })
        ),
    }
}
