pub mod http;
pub mod logging;
pub mod static_files;
pub mod streaming;

pub use http::{create_router, AppState};
