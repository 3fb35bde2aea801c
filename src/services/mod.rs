// file: src/services/mod.rs
// description: service container and service handler exports
// reference: internal module structure

pub mod container;
pub mod handler;
pub mod rest_handler;

pub use container::{ServiceContainer, ServiceContainerBuilder};
pub use handler::{ServiceCall, ServiceHandler, ServiceState};
pub use rest_handler::{RestServiceHandler, RestState};
