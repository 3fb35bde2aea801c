// file: src/lib.rs
// description: library entry point and public api exports
// reference: rust library patterns
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/readme.md"))]

pub mod config;
pub mod error;
pub mod http;
pub mod modal;
pub mod progress;
pub mod services;
pub mod utils;

pub use config::{Config, HttpConfig, LoggingConfig, ModalConfig};
pub use error::{HttpError, ModalError, ProgressError, Result, ServiceError, ToolkitError};
pub use http::{HttpClient, HttpClientOptions, HttpEvent, HttpRequestOptions, HttpResponse};
pub use modal::{ModalHandle, ModalRegistry, ModalView};
pub use progress::{Listeners, Progress, ProgressController, ProgressState, Subscription};
pub use services::{RestServiceHandler, ServiceCall, ServiceContainer, ServiceHandler, ServiceState};
pub use utils::{OperationTimer, Validator};
