pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod recording;
pub mod router;
pub mod state;
pub mod storage;
pub mod stream;

pub use config::ServerConfig;
pub use error::ApiError;
pub use router::create_router;
pub use state::ServerState;
