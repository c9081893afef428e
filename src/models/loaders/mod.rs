pub mod toml_loader;

pub use toml_loader::{find_latest_file, load_candidates};
