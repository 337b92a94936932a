// crates/core/src/lib.rs
pub mod display;
pub mod events;
pub mod result;

pub use display::*;
pub use events::*;
pub use result::*;
