// file: src/http/mod.rs
// description: http module exports
// reference: internal module structure

pub mod auth;
pub mod body;
pub mod client;
pub mod params;
pub mod transfer;

pub use auth::{AuthType, Credentials, authorization_header};
pub use body::{FilePart, FormValue, Payload, RequestBody, RequestData};
pub use client::{
    Headers, HttpClient, HttpClientOptions, HttpEvent, HttpRequestOptions, HttpResponse, Method,
    PreparedRequest,
};
pub use params::{ParamValue, Params, fill_path_params, stringify_params, unfilled_placeholders};
pub use transfer::TransferProgress;
