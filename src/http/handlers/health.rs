//! Liveness endpoint.

/// Always `200 OK`; the process answering is the whole check.
pub async fn health() -> &'static str {
    "OK"
}
