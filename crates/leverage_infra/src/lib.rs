#![forbid(unsafe_code)]

pub mod bootstrap;
pub mod config;
pub mod health;
pub mod store;
