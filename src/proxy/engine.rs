use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use bytes::Bytes;
use http_body_util::BodyExt;
use reqwest::Url;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, instrument, warn};

use super::key::CacheKeyStrategy;
use crate::cache::{Cache, Lookup, OriginResponse};
use crate::error::{ProxyError, Result as ProxyResult};

const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Whether a response was replayed from the store or fetched from the origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// Reverse proxy that answers repeat requests from a response store.
///
/// Concurrent misses for the same key are not coalesced: each one fetches
/// from the origin and writes the store, and the last write wins.
pub struct CachingProxy {
    origin: Url,
    cache: Arc<dyn Cache>,
    key_strategy: Box<dyn CacheKeyStrategy>,
    http_client: reqwest::Client,
}

#[derive(Clone)]
struct AppState {
    proxy: Arc<CachingProxy>,
}

impl CachingProxy {
    pub fn new(
        origin: Url,
        cache: Arc<dyn Cache>,
        key_strategy: Box<dyn CacheKeyStrategy>,
    ) -> Result<Self> {
        // Redirects are relayed to the caller, not followed.
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            origin,
            cache,
            key_strategy,
            http_client,
        })
    }

    pub fn router(self: &Arc<Self>) -> Router {
        let app_state = AppState {
            proxy: self.clone(),
        };

        Router::<AppState>::new()
            .route("/*path", any(handle_request))
            .fallback(handle_request)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .into_inner(),
            )
            .with_state(app_state)
    }

    /// Bind `host:port` and serve until the listener fails
    pub async fn serve(self: &Arc<Self>, host: &str, port: u16) -> ProxyResult<()> {
        let addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ProxyError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

        info!("Caching proxy listening on {}, origin {}", addr, self.origin);

        axum::serve(listener, self.router())
            .await
            .map_err(|e| ProxyError::Internal(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Origin base without its trailing slash, followed by path and query
    pub fn target_url(&self, uri: &Uri) -> String {
        let base = self.origin.as_str().trim_end_matches('/');
        let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        format!("{}{}", base, path_and_query)
    }

    #[instrument(skip(self, req), fields(method = %req.method(), uri = %req.uri()))]
    pub async fn handle_proxy_request(&self, req: Request) -> ProxyResult<Response> {
        let (parts, body) = req.into_parts();
        let target_url = self.target_url(&parts.uri);

        let body_bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                error!("Failed to read request body: {}", e);
                return Err(ProxyError::BadRequest(format!("Failed to read request body: {}", e)));
            }
        };

        let cache_key = self.key_strategy.key(&target_url, &parts.method, &body_bytes);

        if let Some(record) = self.lookup(&cache_key).await {
            debug!("Cache HIT for key: {}", cache_key);
            return build_response(&record, CacheStatus::Hit);
        }

        debug!("Cache MISS for key: {}", cache_key);
        let record = self.forward_request(&target_url, parts, body_bytes).await?;

        if let Err(e) = self.cache.set(&cache_key, &record).await {
            warn!("Failed to cache origin response err = {} url = {}", e, target_url);
        }

        build_response(&record, CacheStatus::Miss)
    }

    /// Store faults read as a miss so the request still reaches the origin
    async fn lookup(&self, key: &str) -> Option<OriginResponse> {
        match self.cache.get(key).await {
            Ok(Lookup::Found(record)) => Some(record),
            Ok(Lookup::NotFound) => None,
            Err(e) => {
                warn!("Cache lookup failed for key {}, treating as miss: {}", key, e);
                None
            }
        }
    }

    async fn forward_request(
        &self,
        target_url: &str,
        parts: axum::http::request::Parts,
        body: Bytes,
    ) -> ProxyResult<OriginResponse> {
        debug!("Forwarding {} request to {}", parts.method, target_url);

        let mut headers = HeaderMap::new();
        for (name, value) in parts.headers.iter() {
            if is_forwardable_request_header(name) {
                headers.append(name.clone(), value.clone());
            }
        }

        let mut request_builder = self
            .http_client
            .request(parts.method, target_url)
            .headers(headers);

        if !body.is_empty() {
            request_builder = request_builder.body(body);
        }

        let request = request_builder
            .build()
            .map_err(|e| ProxyError::RequestBuild(e.to_string()))?;

        let response = self.http_client.execute(request).await.map_err(|e| {
            error!("Origin request failed for {}: {}", target_url, e);
            ProxyError::Upstream(e.to_string())
        })?;

        let status_code = response.status().as_u16();
        let mut record = OriginResponse::new(status_code, Default::default(), Bytes::new());
        for (name, value) in response.headers().iter() {
            record.add_header(name.as_str(), Bytes::copy_from_slice(value.as_bytes()));
        }

        record.body = response.bytes().await.map_err(|e| {
            error!("Failed to read origin response body for {}: {}", target_url, e);
            ProxyError::UpstreamRead(e.to_string())
        })?;

        Ok(record)
    }
}

/// Replay a stored record to the caller with an `X-Cache` annotation
pub fn build_response(record: &OriginResponse, status: CacheStatus) -> ProxyResult<Response> {
    let status_code = StatusCode::from_u16(record.status_code).map_err(|e| {
        ProxyError::Internal(format!("Invalid cached status {}: {}", record.status_code, e))
    })?;

    let mut response = Response::new(Body::from(record.body.clone()));
    *response.status_mut() = status_code;

    let headers = response.headers_mut();
    for (name, values) in &record.headers {
        let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
            debug!("Skipping invalid cached header name: {}", name);
            continue;
        };
        if is_hop_by_hop_header(&header_name) {
            continue;
        }

        headers.remove(&header_name);
        for value in values {
            match HeaderValue::from_bytes(value) {
                Ok(header_value) => {
                    headers.append(header_name.clone(), header_value);
                }
                Err(_) => debug!("Skipping invalid cached value for header {}", name),
            }
        }
    }

    headers.insert(X_CACHE, HeaderValue::from_static(status.as_str()));

    Ok(response)
}

async fn handle_request(State(state): State<AppState>, req: Request) -> Response {
    match state.proxy.handle_proxy_request(req).await {
        Ok(response) => response,
        Err(e) => {
            error!("Proxy request failed: {}", e);
            e.into_response()
        }
    }
}

fn is_forwardable_request_header(name: &HeaderName) -> bool {
    !is_hop_by_hop_header(name) && *name != header::HOST && *name != header::CONTENT_LENGTH
}

fn is_hop_by_hop_header(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "proxy-connection"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}
