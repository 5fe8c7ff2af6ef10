//! The application being served.
//!
//! An [`Application`] is a blocking request/response callable. It is looked
//! up by name in an [`ApplicationRegistry`] once at startup and invoked off
//! the reactor thread by [`ApplicationService`].

mod builtin;
mod registry;
mod service;

pub use builtin::{Echo, Hello, ProcessId};
pub use registry::{ApplicationConstructor, ApplicationRegistry};
pub use service::ApplicationService;

use crate::error::application::ApplicationError;

use std::net::SocketAddr;

use bytes::Bytes;

/// What an application sees of one request.
#[derive(Debug, Clone)]
pub struct AppRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    /// `None` for Unix-domain peers.
    pub remote: Option<SocketAddr>,
}

impl AppRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl AppResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn text(status: u16, body: impl Into<Bytes>) -> Self {
        Self::new(status, body).with_header("content-type", "text/plain; charset=utf-8")
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A synchronous request handler.
///
/// Called on a blocking-pool thread, so it may block freely. Returning an
/// error answers the request with a 500.
pub trait Application: Send + Sync + 'static {
    fn call(&self, request: &AppRequest) -> Result<AppResponse, ApplicationError>;
}
