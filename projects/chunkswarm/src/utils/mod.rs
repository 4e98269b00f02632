mod math;
pub use math::div_ceil;

pub mod codec;
pub mod log;
