#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod model;
pub mod render;
pub mod session;
pub mod settings;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::{run, Cli};
