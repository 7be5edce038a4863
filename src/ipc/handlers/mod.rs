pub mod core;
pub mod grid;
pub mod questions;
pub mod reports;
pub mod roster;
pub mod rules;
pub mod setup;
pub mod sheets;
