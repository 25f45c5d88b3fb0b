pub mod app;
pub mod config;

pub use app::{Murmur, build};
pub use config::Config;
