pub mod config;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod server;

pub use config::{AppConfig, ClientConfig, LoggingConfig, ServerConfig, StoreConfig};
pub use observability::init_tracing;
pub use server::{ServerBuilder, SmartLaunchServer, build_app};
