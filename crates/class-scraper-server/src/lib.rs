pub mod api;

pub use api::{AppState, ServerConfig, router};
