pub mod bitfield;
pub mod protocol;
pub mod transport;
