//! Numeric helpers for the stablegen reference transformer.

pub mod attention;
pub mod layernorm;
pub mod utils;

pub use attention::*;
pub use layernorm::*;
pub use utils::*;
