//! Process wiring for `gridline-server`.

pub mod config;
pub mod health;
