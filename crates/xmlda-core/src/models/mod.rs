//! Shared data models for XML-DA pollers

mod item;
mod state;
mod value;

pub use item::*;
pub use state::*;
pub use value::*;
