pub mod connection;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod registry;
pub mod store;

pub use error::GatewayError;
