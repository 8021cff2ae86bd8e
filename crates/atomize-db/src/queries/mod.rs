//! Query functions, one module per table.

pub mod micro_wins;
pub mod tasks;
pub mod users;
