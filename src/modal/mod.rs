// file: src/modal/mod.rs
// description: modal registry and typed modal handle exports
// reference: internal module structure

pub mod handle;
pub mod registry;

pub use handle::ModalHandle;
pub use registry::{ModalRegistry, ModalView, Resolver};
