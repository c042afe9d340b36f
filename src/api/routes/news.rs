//! Paginated read, section, poll and ingest routes.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::api::server::AppState;
use crate::error::{NewsError, Result};
use crate::news::{Domain, NewsItem, PAGE_SIZE};
use crate::origin::assembler::SECTION_LIMIT;

/// Raw query of the news routes. Numbers are parsed by hand so a malformed
/// value gets the same JSON error shape as an out-of-range one.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub domain: Option<String>,
    pub name: Option<String>,
    pub last_timestamp: Option<String>,
}

impl NewsQuery {
    pub(crate) fn domain(&self) -> Result<Domain> {
        match self.domain.as_deref() {
            None | Some("") => Ok(Domain::default()),
            Some(d) => d.parse(),
        }
    }

    fn page(&self) -> Result<u32> {
        match self.page.as_deref() {
            None | Some("") => Ok(1),
            Some(p) => p
                .trim()
                .parse()
                .map_err(|_| NewsError::InvalidPageNumber(0)),
        }
    }

    fn limit(&self, default: usize) -> usize {
        self.limit
            .as_deref()
            .and_then(|l| l.trim().parse().ok())
            .unwrap_or(default)
    }
}

/// GET /news?page=&limit=&domain=
pub async fn get_news(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NewsQuery>,
) -> Response {
    let domain = match query.domain() {
        Ok(d) => d,
        Err(e) => return e.into_response(),
    };
    let page = match query.page() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    let limit = query.limit(PAGE_SIZE);

    match state.assembler.get_page(domain, page, limit).await {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /news/section?domain=&name=
pub async fn get_section(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NewsQuery>,
) -> Response {
    let domain = match query.domain() {
        Ok(d) => d,
        Err(e) => return e.into_response(),
    };
    let name = query.name.as_deref().unwrap_or("market-beats");
    let limit = query.limit(SECTION_LIMIT);

    match state.assembler.get_section(domain, name, limit).await {
        Ok(Some(section)) => (StatusCode::OK, Json(section)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("unknown section: {name}") })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /news/poll?domain=&lastTimestamp=
pub async fn poll_news(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NewsQuery>,
) -> Response {
    let domain = match query.domain() {
        Ok(d) => d,
        Err(e) => return e.into_response(),
    };
    let last_timestamp = query
        .last_timestamp
        .as_deref()
        .and_then(|t| t.trim().parse::<i64>().ok());
    let resp = state.assembler.poll(domain, last_timestamp).await;
    (StatusCode::OK, Json(resp)).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub news_data: Vec<NewsItem>,
}

/// POST /news/ingest?domain= with `{"newsData": [...]}`.
pub async fn ingest_news(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NewsQuery>,
    body: std::result::Result<Json<IngestRequest>, JsonRejection>,
) -> Response {
    let domain = match query.domain() {
        Ok(d) => d,
        Err(e) => return e.into_response(),
    };
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(%domain, error = %rejection, "Rejected ingest payload");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("invalid news data: {}", rejection.body_text()) })),
            )
                .into_response();
        }
    };

    let items: Vec<NewsItem> = body
        .news_data
        .into_iter()
        .filter(|item| !item.id.trim().is_empty())
        .collect();
    let accepted = state.cache().ingest(domain, items);
    debug!(%domain, accepted, "Ingest accepted");
    (
        StatusCode::OK,
        Json(json!({ "success": true, "accepted": accepted })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::config::ServerConfig;
    use crate::api::server::build_router;
    use crate::clock::ManualClock;
    use crate::config::OriginConfig;
    use crate::news::{sample_item, PageResponse, MAX_PAGES};
    use crate::origin::testing::ScriptedSource;
    use crate::origin::OriginCache;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    const NOW: i64 = 1_760_000_000_000;

    fn app_with(items: Vec<NewsItem>) -> (axum::Router, Arc<ScriptedSource>) {
        let source = Arc::new(ScriptedSource::new(vec![Ok(items)]));
        let cache = OriginCache::new(source.clone(), ManualClock::new(NOW), OriginConfig::default());
        let state = AppState::new(Arc::new(cache));
        (build_router(state, &ServerConfig::default()), source)
    }

    fn live(n: usize) -> Vec<NewsItem> {
        (0..n)
            .map(|i| sample_item(&format!("live-{i}"), NOW / 1000 - i as i64))
            .collect()
    }

    async fn send(app: axum::Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_get_news_default_page() {
        let (app, _) = app_with(live(3));
        let (status, body) = send(app, get("/news")).await;
        assert_eq!(status, StatusCode::OK);
        let page: PageResponse = serde_json::from_value(body.clone()).unwrap();
        assert_eq!(page.news.len(), PAGE_SIZE);
        assert_eq!(page.pagination.page, 1);
        assert_eq!(page.pagination.total_pages, MAX_PAGES);
        assert_eq!(body["pagination"]["pageSize"], 10);
        assert_eq!(body["news"][0]["id"], "live-0");
        assert!(body["news"][0].get("isHistorical").is_none());
        assert_eq!(body["news"][9]["isHistorical"], true);
    }

    #[tokio::test]
    async fn test_get_news_page_out_of_range_is_400() {
        for uri in ["/news?page=0", "/news?page=5", "/news?page=abc"] {
            let (app, source) = app_with(live(3));
            let (status, body) = send(app, get(uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert!(body["error"].is_string());
            assert!(body.get("news").is_none());
            assert_eq!(source.calls(), 0);
        }
    }

    #[tokio::test]
    async fn test_get_news_unknown_domain_is_400() {
        let (app, _) = app_with(live(3));
        let (status, body) = send(app, get("/news?domain=mars")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("mars"));
    }

    #[tokio::test]
    async fn test_get_news_limit_one() {
        let (app, _) = app_with(live(3));
        let (_, body) = send(app, get("/news?page=2&limit=1&domain=domestic")).await;
        assert_eq!(body["news"].as_array().unwrap().len(), 1);
        assert_eq!(body["pagination"]["page"], 1);
        assert_eq!(body["pagination"]["pageSize"], 1);
    }

    #[tokio::test]
    async fn test_section_route() {
        let mut item = sample_item("gdp", NOW / 1000);
        item.headline = "GDP growth beats forecast".into();
        let (app, _) = app_with(vec![item]);
        let (status, body) = send(app, get("/news/section?domain=global&name=market-beats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["news"][0]["id"], "gdp");
        assert_eq!(body["news"][0]["category"], "economic");

        let (app, _) = app_with(Vec::new());
        let (status, _) = send(app, get("/news/section?name=other")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_poll_route() {
        let (app, _) = app_with(live(2));
        let (status, body) = send(app.clone(), get("/news/poll")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hasUpdates"], true);
        assert_eq!(body["news"].as_array().unwrap().len(), 2);

        let uri = format!("/news/poll?lastTimestamp={NOW}");
        let (_, body) = send(app, get(&uri)).await;
        assert_eq!(body["hasUpdates"], false);
        assert!(body["news"].is_null());
    }

    #[tokio::test]
    async fn test_ingest_then_read() {
        let (app, _) = app_with(live(1));
        let payload = json!({
            "newsData": [
                {"id": "ws-1", "headline": "Pushed", "datetime": NOW / 1000 + 60},
                {"id": "ws-1", "headline": "Pushed dup", "datetime": NOW / 1000 + 60},
                {"id": "", "headline": "No id", "datetime": 1}
            ]
        });
        let req = Request::post("/news/ingest?domain=global")
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap();
        let (status, body) = send(app.clone(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true, "accepted": 1}));

        let (_, body) = send(app, get("/news?page=1")).await;
        assert_eq!(body["news"][0]["id"], "ws-1");
        assert_eq!(body["news"][1]["id"], "live-0");
    }

    #[tokio::test]
    async fn test_ingest_malformed_is_400() {
        let (app, _) = app_with(Vec::new());
        for payload in [r#"{"newsData": "nope"}"#, r#"{"other": []}"#, "not json"] {
            let req = Request::post("/news/ingest")
                .header("content-type", "application/json")
                .body(Body::from(payload))
                .unwrap();
            let (status, body) = send(app.clone(), req).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{payload}");
            assert!(body["error"].is_string());
        }
    }
}
