// HTTP and WebSocket route handlers

pub mod files;
pub mod health;
pub mod stream;

pub use files::*;
pub use health::*;
pub use stream::*;
