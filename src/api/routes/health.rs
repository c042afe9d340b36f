//! Health endpoint.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::api::server::AppState;
use crate::news::Domain;

/// GET /health: version plus the per-domain origin cache flags.
///
/// Never triggers an upstream fetch.
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let mut domains = BTreeMap::new();
    let mut degraded = false;
    for domain in Domain::ALL {
        let status = state.cache().status(domain);
        degraded |= status.rate_limited || (!status.has_data && status.last_error.is_some());
        domains.insert(domain.as_str(), status);
    }

    Json(json!({
        "status": if degraded { "degraded" } else { "ok" },
        "version": env!("CARGO_PKG_VERSION"),
        "domains": domains,
    }))
}
