pub mod core;
pub mod logging;
pub mod probe;

pub use crate::core::proxy;
