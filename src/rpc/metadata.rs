//! Context ⇄ metadata bridge.
//!
//! # Responsibilities
//! - Write registered context keys into outgoing gRPC metadata
//! - Rebuild a request context from incoming gRPC metadata
//! - Seed the ingress context from HTTP headers
//!
//! # Design Decisions
//! - Only registered keys cross a boundary; everything else is dropped
//! - Duplicate entries: the first value wins
//! - Values that are not visible ASCII are dropped rather than rejected
//! - Clients may never assert identity keys; those come from token verification

use http::HeaderMap;
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, MetadataMap};
use tonic::service::Interceptor;
use tonic::{Request, Status};

use crate::context::{KeySet, RequestContext};

/// Emit every registered key present in `ctx` into `metadata`.
pub fn context_to_metadata(ctx: &RequestContext, metadata: &mut MetadataMap) {
    for (key, value) in ctx.iter() {
        let Ok(name) = AsciiMetadataKey::from_bytes(key.as_str().as_bytes()) else {
            continue;
        };
        match AsciiMetadataValue::try_from(value) {
            Ok(value) => {
                metadata.insert(name, value);
            }
            Err(_) => tracing::debug!(key = %key.as_str(), "Dropping non-ASCII context value"),
        }
    }
}

/// Build a context from `metadata`, keeping only keys in `keys`.
pub fn metadata_to_context(metadata: &MetadataMap, keys: &KeySet) -> RequestContext {
    let mut ctx = RequestContext::new(keys.clone());
    for key in keys.iter() {
        let first = metadata
            .get_all(key.as_str())
            .iter()
            .next()
            .and_then(|v| v.to_str().ok());
        if let Some(value) = first {
            ctx.insert(key, value);
        }
    }
    ctx
}

/// Seed the ingress context from HTTP headers.
///
/// Identity keys are skipped; missing request/trace ids are generated.
pub fn headers_to_context(headers: &HeaderMap, keys: &KeySet) -> RequestContext {
    let mut ctx = RequestContext::new(keys.clone());
    for key in keys.iter().filter(|k| !k.is_identity()) {
        let first = headers
            .get_all(key.as_str())
            .iter()
            .next()
            .and_then(|v| v.to_str().ok());
        if let Some(value) = first {
            ctx.insert(key, value);
        }
    }
    ctx.ensure_ids();
    ctx
}

/// Client interceptor: moves the [`RequestContext`] found in the request
/// extensions into outgoing metadata.
#[derive(Debug, Clone, Default)]
pub struct ClientContextInterceptor;

impl Interceptor for ClientContextInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        if let Some(ctx) = request.extensions_mut().remove::<RequestContext>() {
            context_to_metadata(&ctx, request.metadata_mut());
        }
        Ok(request)
    }
}

/// Server interceptor: rebuilds the [`RequestContext`] from incoming metadata
/// and stores it in the request extensions for the handler.
#[derive(Debug, Clone)]
pub struct ServerContextInterceptor {
    keys: KeySet,
}

impl ServerContextInterceptor {
    pub fn new(keys: KeySet) -> Self {
        Self { keys }
    }
}

impl Interceptor for ServerContextInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let mut ctx = metadata_to_context(request.metadata(), &self.keys);
        ctx.ensure_ids();
        request.extensions_mut().insert(ctx);
        Ok(request)
    }
}
