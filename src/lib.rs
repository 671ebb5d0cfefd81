pub mod collapse;
pub mod config;
pub mod export;
pub mod sampler;
pub mod server;
pub mod service;
pub mod snapshot;
pub mod store;
