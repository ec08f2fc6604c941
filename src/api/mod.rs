//! Wire adapter for the gateway authentication API.
//!
//! This module provides:
//! - The injected [`HttpTransport`] capability and its reqwest default
//! - Typed request/response DTOs for the three auth endpoints
//! - [`AuthApiClient`], which decodes structured server errors and surfaces
//!   response headers for the engine to classify

pub mod client;
pub mod transport;
pub mod types;

pub use client::AuthApiClient;
pub use transport::{
    HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, ResponseHeaders, TransportError,
};
