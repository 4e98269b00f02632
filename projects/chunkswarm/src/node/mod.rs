pub mod commands;
pub mod config;
pub mod context;
pub mod download;
pub mod handlers;
pub mod node;
pub mod status;
pub mod upload;

pub use config::NodeConfig;
pub use node::Node;
