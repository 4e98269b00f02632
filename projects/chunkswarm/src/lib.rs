pub mod file;
pub mod network;
pub mod node;
pub mod tracker;
pub mod utils;
