//! Pagination aggregator.
//!
//! Walks a `limit`/`offset` list endpoint page by page. Pages are fetched
//! strictly one after another, and entities come out in request order.
//!
//! Iteration stops when the first of these happens:
//!
//! - the offset reaches the reported total (`filtered` when present, else `total`)
//! - `max_results` entities have been produced
//! - a page comes back empty
//! - no total is reported and a page is shorter than requested

use crate::error::{GatewayError, GatewayResult};
use crate::request::ApiRequest;
use crate::transport::Transport;
use futures::stream::{self, Stream, TryStreamExt};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Position of one paginated walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    /// Offset of the next page.
    pub offset: u64,
    /// Requested page size.
    pub limit: u64,
    /// Total reported by the backend so far.
    pub total_known: Option<u64>,
}

/// Entities gathered by [`Paginator::collect`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Collected {
    /// Total reported by the backend, if any.
    pub total: Option<u64>,
    /// Gathered entities in request order.
    pub entities: Vec<Value>,
}

impl Collected {
    /// Result document returned to tool callers.
    pub fn into_value(self) -> Value {
        serde_json::json!({
            "total": self.total.unwrap_or(self.entities.len() as u64),
            "count": self.entities.len(),
            "entities": self.entities,
        })
    }
}

struct PageState {
    transport: Transport,
    base: ApiRequest,
    cursor: PageCursor,
    fetched: u64,
    max_results: Option<u64>,
    done: bool,
}

/// Lazily fetches the pages of one list request.
#[derive(Debug, Clone)]
pub struct Paginator {
    transport: Transport,
    base: ApiRequest,
    page_size: u64,
    start_offset: u64,
    max_results: Option<u64>,
}

impl Paginator {
    /// Paginate `base` with pages of `page_size` (clamped to 1..=100).
    pub fn new(transport: Transport, base: ApiRequest, page_size: u64) -> Self {
        Self {
            transport,
            base,
            page_size: page_size.clamp(1, 100),
            start_offset: 0,
            max_results: None,
        }
    }

    /// Start from a given offset.
    pub fn starting_at(mut self, offset: u64) -> Self {
        self.start_offset = offset;
        self
    }

    /// Stop after this many entities.
    pub fn max_results(mut self, max_results: Option<u64>) -> Self {
        self.max_results = max_results;
        self
    }

    fn initial_state(&self) -> PageState {
        PageState {
            transport: self.transport.clone(),
            base: self.base.clone(),
            cursor: PageCursor {
                offset: self.start_offset,
                limit: self.page_size,
                total_known: None,
            },
            fetched: 0,
            max_results: self.max_results,
            done: false,
        }
    }

    /// Stream of pages. Each call starts a fresh walk.
    pub fn pages(&self) -> impl Stream<Item = GatewayResult<Vec<Value>>> + Send + 'static {
        stream::try_unfold(self.initial_state(), next_page)
    }

    /// Stream of entities in request order.
    pub fn stream(&self) -> impl Stream<Item = GatewayResult<Value>> + Send + 'static {
        self.pages()
            .map_ok(|page| stream::iter(page.into_iter().map(Ok)))
            .try_flatten()
    }

    /// Gather every entity the walk produces.
    pub async fn collect(&self) -> GatewayResult<Collected> {
        let mut total = None;
        let mut entities = Vec::new();
        let mut pages = Box::pin(self.pages_with_total());
        while let Some((page, reported)) = pages.try_next().await? {
            total = reported.or(total);
            entities.extend(page);
        }
        Ok(Collected { total, entities })
    }

    fn pages_with_total(
        &self,
    ) -> impl Stream<Item = GatewayResult<(Vec<Value>, Option<u64>)>> + Send + 'static {
        stream::try_unfold(self.initial_state(), |state| async move {
            let next = next_page(state).await?;
            Ok(next.map(|(page, state)| {
                let total = state.cursor.total_known;
                ((page, total), state)
            }))
        })
    }
}

async fn next_page(mut state: PageState) -> GatewayResult<Option<(Vec<Value>, PageState)>> {
    if state.done {
        return Ok(None);
    }

    let remaining = state.max_results.map(|max| max.saturating_sub(state.fetched));
    if remaining == Some(0) {
        return Ok(None);
    }
    if let Some(total) = state.cursor.total_known {
        if state.cursor.offset >= total {
            return Ok(None);
        }
    }

    let limit = remaining.map_or(state.cursor.limit, |r| r.min(state.cursor.limit));
    let request = state.base.with_page(limit, state.cursor.offset);
    let response = state.transport.send(&request).await?;
    let body = response.json_body()?;
    let (mut entities, total) = parse_page(response.status, body)?;

    let received = entities.len() as u64;
    debug!(
        offset = state.cursor.offset,
        limit,
        received,
        total = ?total,
        "Fetched page"
    );

    if received == 0 {
        return Ok(None);
    }
    let cap = total.map_or(limit, |total| limit.min(total.saturating_sub(state.cursor.offset)));
    if received > cap {
        entities.truncate(cap as usize);
    }
    if entities.is_empty() {
        return Ok(None);
    }

    let kept = entities.len() as u64;
    state.cursor.offset += kept;
    state.fetched += kept;
    state.cursor.total_known = total;
    state.done = match total {
        Some(total) => state.cursor.offset >= total,
        None => kept < limit,
    };

    Ok(Some((entities, state)))
}

/// Split a list response into its entities and reported total.
///
/// Accepts the Qase wrapper `{status, result: {total, filtered, entities}}`
/// as well as an unwrapped `result` object.
fn parse_page(status: u16, body: Value) -> GatewayResult<(Vec<Value>, Option<u64>)> {
    let mut result = match body {
        Value::Object(mut map) if map.contains_key("result") => {
            map.remove("result").unwrap_or(Value::Null)
        }
        other => other,
    };

    let total = result
        .get("filtered")
        .and_then(Value::as_u64)
        .or_else(|| result.get("total").and_then(Value::as_u64));

    match result.get_mut("entities").map(Value::take) {
        Some(Value::Array(entities)) => Ok((entities, total)),
        _ => Err(GatewayError::unexpected_response(
            status,
            "list response has no `entities` array",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ApiVersion, HttpMethod};
    use crate::request::RequestBody;
    use crate::transport::testing::{transport, ScriptedSender};
    use crate::transport::{ApiResponse, RetryPolicy};
    use futures::StreamExt;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn base() -> ApiRequest {
        ApiRequest {
            method: HttpMethod::Get,
            api_version: ApiVersion::V1,
            url: "https://api.qase.io/v1/case/DEMO".to_string(),
            query: vec![("filters[search]".to_string(), "login".to_string())],
            headers: BTreeMap::new(),
            body: RequestBody::Empty,
            idempotent: true,
        }
    }

    /// Backend holding `total` entities with ids 0..total.
    fn backend(total: u64, report_total: bool) -> std::sync::Arc<ScriptedSender> {
        ScriptedSender::new(move |_, request| {
            let limit: u64 = request.query_param("limit").unwrap().parse().unwrap();
            let offset: u64 = request.query_param("offset").unwrap().parse().unwrap();
            let entities: Vec<Value> = (offset..(offset + limit).min(total))
                .map(|id| json!({"id": id}))
                .collect();
            let mut result = json!({"count": entities.len(), "entities": entities});
            if report_total {
                result["total"] = json!(total);
                result["filtered"] = json!(total);
            }
            Ok(ApiResponse::json(200, &json!({"status": true, "result": result})))
        })
    }

    fn ids(entities: &[Value]) -> Vec<u64> {
        entities.iter().map(|e| e["id"].as_u64().unwrap()).collect()
    }

    #[tokio::test]
    async fn test_collects_exactly_total_in_order() {
        let sender = backend(250, true);
        let paginator = Paginator::new(transport(sender.clone(), RetryPolicy::fast()), base(), 100);

        let collected = paginator.collect().await.unwrap();
        assert_eq!(collected.total, Some(250));
        assert_eq!(ids(&collected.entities), (0..250).collect::<Vec<_>>());
        assert_eq!(sender.call_count(), 3);

        let offsets: Vec<_> = sender
            .calls()
            .iter()
            .map(|r| r.query_param("offset").unwrap().to_string())
            .collect();
        assert_eq!(offsets, vec!["0", "100", "200"]);
        assert!(sender
            .calls()
            .iter()
            .all(|r| r.query_param("filters[search]") == Some("login")));
    }

    #[tokio::test]
    async fn test_max_results_caps_fetching() {
        let sender = backend(250, true);
        let paginator = Paginator::new(transport(sender.clone(), RetryPolicy::fast()), base(), 100)
            .max_results(Some(120));

        let collected = paginator.collect().await.unwrap();
        assert_eq!(collected.entities.len(), 120);
        assert_eq!(sender.call_count(), 2);
        assert_eq!(sender.calls()[1].query_param("limit"), Some("20"));
    }

    #[tokio::test]
    async fn test_short_page_stops_without_total() {
        let sender = backend(130, false);
        let paginator = Paginator::new(transport(sender.clone(), RetryPolicy::fast()), base(), 50);

        let collected = paginator.collect().await.unwrap();
        assert_eq!(collected.total, None);
        assert_eq!(collected.entities.len(), 130);
        assert_eq!(sender.call_count(), 3);
    }

    #[tokio::test]
    async fn test_empty_page_stops_even_if_total_is_wrong() {
        let sender = ScriptedSender::new(|index, _| {
            let entities = if index == 0 { vec![json!({"id": 1})] } else { vec![] };
            Ok(ApiResponse::json(
                200,
                &json!({"status": true, "result": {"total": 10, "entities": entities}}),
            ))
        });
        let paginator = Paginator::new(transport(sender.clone(), RetryPolicy::fast()), base(), 1);
        let collected = paginator.collect().await.unwrap();
        assert_eq!(collected.entities.len(), 1);
        assert_eq!(sender.call_count(), 2);
    }

    #[tokio::test]
    async fn test_never_yields_more_than_reported_total() {
        let sender = ScriptedSender::new(|_, _| {
            let entities: Vec<Value> = (0..5).map(|id| json!({"id": id})).collect();
            Ok(ApiResponse::json(
                200,
                &json!({"status": true, "result": {"total": 3, "entities": entities}}),
            ))
        });
        let paginator = Paginator::new(transport(sender.clone(), RetryPolicy::fast()), base(), 100);

        let collected = paginator.collect().await.unwrap();
        assert_eq!(collected.total, Some(3));
        assert_eq!(ids(&collected.entities), vec![0, 1, 2]);
        assert_eq!(sender.call_count(), 1);
    }

    #[tokio::test]
    async fn test_stream_is_lazy_and_restartable() {
        let sender = backend(250, true);
        let paginator = Paginator::new(transport(sender.clone(), RetryPolicy::fast()), base(), 100)
            .starting_at(50);

        let first: Vec<_> = paginator.stream().take(3).collect().await;
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].as_ref().unwrap()["id"], 50);
        assert_eq!(sender.call_count(), 1);

        let again = paginator.collect().await.unwrap();
        assert_eq!(again.entities.len(), 200);
        assert_eq!(again.entities[0]["id"], 50);
    }

    #[tokio::test]
    async fn test_error_page_aborts() {
        let sender = ScriptedSender::sequence(vec![Ok(ApiResponse::json(
            200,
            &json!({"status": true, "result": {"items": []}}),
        ))]);
        let paginator = Paginator::new(transport(sender, RetryPolicy::fast()), base(), 100);
        let err = paginator.collect().await.unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamServer { status: 200, .. }));
    }

    #[test]
    fn test_into_value() {
        let collected = Collected {
            total: Some(7),
            entities: vec![json!({"id": 1})],
        };
        assert_eq!(
            collected.into_value(),
            json!({"total": 7, "count": 1, "entities": [{"id": 1}]})
        );
    }
}
