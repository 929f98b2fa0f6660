pub mod client;
pub mod config;
pub mod error;
pub mod reconcile;

pub use client::{ClientNetworkService, ConnectionState};
pub use config::ClientConfig;
pub use error::ClientError;
pub use reconcile::{ReconcilerConfig, RemoteEntityReconciler, RemoteEntityState};
