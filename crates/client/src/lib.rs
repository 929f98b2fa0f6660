pub mod game;
pub mod net;

pub use game::LocalWorld;
pub use net::{
    ClientConfig, ClientError, ClientNetworkService, ConnectionState, ReconcilerConfig,
    RemoteEntityReconciler,
};
