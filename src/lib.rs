pub mod cli;
pub mod client;
pub mod config;
pub mod discovery;
pub mod display;
pub mod server;
