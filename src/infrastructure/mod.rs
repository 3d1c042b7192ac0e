// Infrastructure module - config files, endpoint resolution, logging and concrete transports
pub mod config;
pub mod endpoint;
pub mod logging;
pub mod transport;
