// ────────────────────────────────
// src/server/handler.rs
// Maps http requests on the health path to an evaluation round.
// ────────────────────────────────
use crate::config::{ServerSettings, DEFAULT_PATH};
use crate::health::{Checker, Status};
use crate::metrics::MetricsRegistry;
use hyper::header::{HeaderName, HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, StatusCode};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower::Service;

const OK_BODY: &str = "ok";

/// Serves the aggregate status of a [`Checker`] over http.
#[derive(Clone)]
pub struct HealthHandler {
    checker: Arc<Checker>,
    path: Arc<str>,
    header: HeaderName,
    metrics: Option<(Arc<str>, Arc<MetricsRegistry>)>,
}

impl HealthHandler {
    pub fn new(checker: Arc<Checker>) -> Self {
        Self {
            checker,
            path: Arc::from(DEFAULT_PATH),
            header: HeaderName::from_static("x-service-health"),
            metrics: None,
        }
    }

    pub fn from_settings(checker: Arc<Checker>, settings: &ServerSettings) -> anyhow::Result<Self> {
        Self::new(checker)
            .with_path(&settings.path)
            .with_header(&settings.header)
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = Arc::from(path);
        self
    }

    pub fn with_header(mut self, header: &str) -> anyhow::Result<Self> {
        self.header = HeaderName::from_bytes(header.as_bytes())
            .map_err(|e| anyhow::anyhow!("invalid header name {:?}: {}", header, e))?;
        Ok(self)
    }

    /// Also serve prometheus metrics from `registry` on `path`.
    pub fn with_metrics(mut self, path: &str, registry: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some((Arc::from(path), registry));
        self
    }

    pub fn checker(&self) -> &Arc<Checker> {
        &self.checker
    }

    pub async fn handle(&self, req: Request<Body>) -> Result<Response<Body>, hyper::http::Error> {
        let path = req.uri().path().to_owned();

        if let Some((metrics_path, registry)) = &self.metrics {
            if path.as_str() == &**metrics_path {
                return match registry.gather() {
                    Ok(body) => Response::builder()
                        .status(StatusCode::OK)
                        .header(CONTENT_TYPE, "text/plain; version=0.0.4")
                        .body(Body::from(body)),
                    Err(e) => {
                        tracing::error!(%e, "failed to encode metrics");
                        Response::builder()
                            .status(StatusCode::INTERNAL_SERVER_ERROR)
                            .body(Body::empty())
                    }
                };
            }
        }

        if path.as_str() != &*self.path {
            return Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(Body::from("Not Found"));
        }
        if *req.method() != Method::GET && *req.method() != Method::HEAD {
            return Response::builder()
                .status(StatusCode::METHOD_NOT_ALLOWED)
                .header(ALLOW, "GET, HEAD")
                .body(Body::empty());
        }

        let (status, details) = self.checker.evaluate(None).await;
        render(status, &details, &self.header)
    }
}

/// Renders an aggregate status: a plain "ok" when healthy, otherwise a json
/// object of check name to status token.
pub fn render(
    status: Status,
    details: &BTreeMap<String, Status>,
    header: &HeaderName,
) -> Result<Response<Body>, hyper::http::Error> {
    let code = StatusCode::from_u16(status.status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let builder = Response::builder()
        .status(code)
        .header(header, HeaderValue::from_static(status.as_str()));

    if status.is_healthy() {
        return builder
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(Body::from(OK_BODY));
    }

    match serde_json::to_vec(details) {
        Ok(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body)),
        Err(e) => {
            tracing::error!(%e, "failed to encode health details");
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::empty())
        }
    }
}

impl Service<Request<Body>> for HealthHandler {
    type Response = Response<Body>;
    type Error = Box<dyn std::error::Error + Send + Sync>;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let handler = self.clone();
        Box::pin(async move {
            handler.handle(req).await.map_err(|e| {
                tracing::error!(%e, "failed to build health response");
                Box::new(e) as Box<dyn std::error::Error + Send + Sync>
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_HEADER;

    #[test]
    fn test_default_header_matches_setting() {
        let handler = HealthHandler::new(Arc::new(Checker::new()));
        assert!(handler.header.as_str().eq_ignore_ascii_case(DEFAULT_HEADER));
    }

    #[test]
    fn test_invalid_header_name() {
        let handler = HealthHandler::new(Arc::new(Checker::new()));
        assert!(handler.with_header("not a header").is_err());
    }

    #[tokio::test]
    async fn test_render_unknown() {
        let mut details = BTreeMap::new();
        details.insert("db".to_string(), Status::Unknown);
        let header = HeaderName::from_static("x-service-health");

        let resp = render(Status::Unknown, &details, &header).unwrap();
        assert_eq!(resp.status().as_u16(), 425);
        assert_eq!(resp.headers()[&header], "unknown");

        let body = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(&body[..], br#"{"db":"unknown"}"#);
    }
}
