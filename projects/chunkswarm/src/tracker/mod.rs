pub mod registry;
pub mod server;

pub use registry::Registry;
pub use server::Tracker;
