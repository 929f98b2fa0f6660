pub mod config;
pub mod error;
pub mod events;
pub mod handlers;
pub mod server;

pub use config::ServerConfig;
pub use error::ServerError;
pub use events::ServerEvent;
pub use server::{ServerHandle, ServerState, ServerStats, UdpServer};
