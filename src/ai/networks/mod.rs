mod q_network;

pub use q_network::{soft_update, QNetwork, QNetworkConfig};
