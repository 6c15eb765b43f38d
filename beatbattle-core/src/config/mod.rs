//! Configuration schema shared by the library and the CLI.

pub mod schema;

pub use schema::*;
