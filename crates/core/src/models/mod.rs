//! Data models for CueCannon

mod actor;
mod production;
mod script;

pub use actor::*;
pub use production::*;
pub use script::*;
