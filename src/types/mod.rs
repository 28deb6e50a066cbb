//! Type Model: type shapes, resolution, equality and reification

pub mod type_system;
mod resolve;

pub use type_system::*;
