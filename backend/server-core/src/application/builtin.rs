use crate::application::{AppRequest, AppResponse, Application};
use crate::error::application::ApplicationError;

use std::fmt::Write as _;

/// Answers every request with a fixed greeting.
pub struct Hello;

impl Application for Hello {
    fn call(&self, _request: &AppRequest) -> Result<AppResponse, ApplicationError> {
        Ok(AppResponse::text(200, "Hello, world!\n"))
    }
}

/// Echoes the request line and body back.
pub struct Echo;

impl Application for Echo {
    fn call(&self, request: &AppRequest) -> Result<AppResponse, ApplicationError> {
        let mut text = format!("{} {}", request.method, request.path);
        if let Some(query) = &request.query {
            let _ = write!(text, "?{query}");
        }
        text.push('\n');

        let mut body = text.into_bytes();
        body.extend_from_slice(&request.body);
        Ok(AppResponse::text(200, body))
    }
}

/// Answers with the id of the serving process, so a client can tell which
/// generation handled its request.
pub struct ProcessId;

impl Application for ProcessId {
    fn call(&self, _request: &AppRequest) -> Result<AppResponse, ApplicationError> {
        Ok(AppResponse::text(200, format!("{}\n", std::process::id())))
    }
}
