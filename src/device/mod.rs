pub mod connection;
pub mod constants;
pub mod resolver;
pub mod session;
pub mod transport;
pub mod types;
