use crate::access_log::{AccessEntry, AccessLog};
use crate::application::{AppRequest, AppResponse, Application};

use std::convert::Infallible;
use std::fmt::Display;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http::request::Parts;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::header::{HeaderName, REFERER, USER_AGENT};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use log::{error, trace, warn};

/// Adapts an [`Application`] to hyper: collects the body, runs the
/// callable on the blocking pool, and writes the access log.
#[derive(Clone)]
pub struct ApplicationService {
    application: Arc<dyn Application>,
    access_log: Option<Arc<AccessLog>>,
    remote: Option<SocketAddr>,
}

impl ApplicationService {
    pub fn new(
        application: Arc<dyn Application>,
        access_log: Option<Arc<AccessLog>>,
        remote: Option<SocketAddr>,
    ) -> Self {
        Self {
            application,
            access_log,
            remote,
        }
    }
}

impl<B> Service<Request<B>> for ApplicationService
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Display + Send,
{
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, request: Request<B>) -> Self::Future {
        let application = Arc::clone(&self.application);
        let access_log = self.access_log.clone();
        let remote = self.remote;

        Box::pin(async move {
            let (parts, body) = request.into_parts();
            let mut entry = access_entry(&parts, remote);

            let collected = body.collect().await;
            let response = match collected {
                Ok(collected) => {
                    let app_request = app_request(&parts, collected.to_bytes(), remote);
                    invoke(application, app_request).await
                }
                Err(e) => {
                    warn!("Failed to read request body for {}: {e}", entry.target);
                    AppResponse::text(400, "Bad Request\n")
                }
            };

            let response = into_http(response);
            entry.status = response.status().as_u16();
            entry.bytes = response
                .body()
                .size_hint()
                .exact()
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or_default();

            if let Some(access_log) = access_log {
                access_log.record(&entry);
            }
            trace!("{} {} -> {}", entry.method, entry.target, entry.status);

            Ok(response)
        })
    }
}

async fn invoke(application: Arc<dyn Application>, request: AppRequest) -> AppResponse {
    match tokio::task::spawn_blocking(move || application.call(&request)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            error!("Application failed: {e}");
            internal_error()
        }
        Err(e) => {
            error!("Application task did not complete: {e}");
            internal_error()
        }
    }
}

fn internal_error() -> AppResponse {
    AppResponse::text(500, "Internal Server Error\n")
}

fn app_request(parts: &Parts, body: Bytes, remote: Option<SocketAddr>) -> AppRequest {
    AppRequest {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: parts
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect(),
        body,
        remote,
    }
}

fn access_entry(parts: &Parts, remote: Option<SocketAddr>) -> AccessEntry {
    let header = |name: HeaderName| {
        parts
            .headers
            .get(name)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
    };

    AccessEntry {
        remote,
        method: parts.method.to_string(),
        target: parts
            .uri
            .path_and_query()
            .map(|target| target.as_str().to_string())
            .unwrap_or_else(|| parts.uri.to_string()),
        version: format!("{:?}", parts.version),
        status: 0,
        bytes: 0,
        referer: header(REFERER),
        user_agent: header(USER_AGENT),
    }
}

fn into_http(response: AppResponse) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(response.status);
    for (name, value) in &response.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    builder.body(Full::new(response.body)).unwrap_or_else(|e| {
        error!("Application produced an invalid response: {e}");
        let mut fallback = Response::new(Full::new(internal_error().body));
        *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        fallback
    })
}
