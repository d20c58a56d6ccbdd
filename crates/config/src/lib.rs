//! Configuration schema and discovery for the recado bridge.

pub mod loader;
pub mod schema;

pub use {
    loader::{discover_and_load, find_config_file, load_config},
    schema::RecadoConfig,
};
