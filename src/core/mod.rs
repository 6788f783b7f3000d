pub mod config;
pub mod gateway;
pub mod message;
pub mod relay;
pub mod session;
pub mod transcript;
