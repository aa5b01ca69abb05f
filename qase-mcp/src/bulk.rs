//! Bulk batcher.
//!
//! Splits the items of a bulk tool into chunks, sends the chunks
//! concurrently (admission still goes through the shared token bucket) and
//! reassembles one outcome per input item, in input order. A failed chunk
//! marks exactly its own items as failed; the other chunks are unaffected.

use crate::error::{ErrorKind, GatewayError, GatewayResult};
use crate::registry::{ToolDescriptor, ToolMode};
use crate::request::{ApiRequest, RequestBuilder};
use crate::transport::Transport;
use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

/// Items of one bulk call and the chunk size applied to them.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkBatch {
    /// Items in caller order.
    pub items: Vec<Value>,
    /// Maximum items per request.
    pub chunk_size: usize,
}

impl BulkBatch {
    /// Create a batch; a zero chunk size is treated as one.
    pub fn new(items: Vec<Value>, chunk_size: usize) -> Self {
        Self {
            items,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Chunks with the input index of their first item.
    pub fn chunks(&self) -> impl Iterator<Item = (usize, &[Value])> {
        self.items
            .chunks(self.chunk_size)
            .enumerate()
            .map(move |(n, chunk)| (n * self.chunk_size, chunk))
    }

    /// Number of chunks.
    pub fn chunk_count(&self) -> usize {
        (self.items.len() + self.chunk_size - 1) / self.chunk_size
    }
}

/// Outcome of one input item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    /// The item's chunk was accepted.
    Succeeded {
        /// Per-item result (e.g. the created ID) when the backend returns one.
        #[serde(skip_serializing_if = "Value::is_null")]
        result: Value,
    },
    /// The item's chunk failed.
    Failed {
        /// Error kind of the chunk failure.
        kind: ErrorKind,
        /// Error message of the chunk failure.
        message: String,
    },
}

/// Outcome of one input item, with its position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemOutcome {
    /// Index in the caller's input.
    pub index: usize,
    /// Chunk the item was sent in.
    pub chunk: usize,
    /// What happened to it.
    #[serde(flatten)]
    pub status: ItemStatus,
}

impl ItemOutcome {
    /// Whether the item succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self.status, ItemStatus::Succeeded { .. })
    }
}

/// Per-item outcomes of a bulk call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkReport {
    /// Number of succeeded items.
    pub succeeded: usize,
    /// Number of failed items.
    pub failed: usize,
    /// One outcome per input item, in input order.
    pub items: Vec<ItemOutcome>,
}

impl BulkReport {
    /// Build a report from ordered outcomes.
    pub fn from_outcomes(items: Vec<ItemOutcome>) -> Self {
        let succeeded = items.iter().filter(|item| item.is_success()).count();
        Self {
            succeeded,
            failed: items.len() - succeeded,
            items,
        }
    }

    /// Index and error kind of each failed item.
    pub fn failed_items(&self) -> Vec<(usize, ErrorKind)> {
        self.items
            .iter()
            .filter_map(|item| match item.status {
                ItemStatus::Failed { kind, .. } => Some((item.index, kind)),
                ItemStatus::Succeeded { .. } => None,
            })
            .collect()
    }

    /// The report when every item succeeded, otherwise `PartialBulkFailure`.
    pub fn into_result(self) -> GatewayResult<BulkReport> {
        if self.failed == 0 {
            Ok(self)
        } else {
            Err(GatewayError::PartialBulkFailure { report: self })
        }
    }

    /// Result document returned to tool callers.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            json!({"succeeded": self.succeeded, "failed": self.failed})
        })
    }
}

/// Sends bulk chunks concurrently.
#[derive(Debug, Clone)]
pub struct BulkBatcher {
    transport: Transport,
    builder: RequestBuilder,
    chunk_ceiling: usize,
}

impl BulkBatcher {
    /// Create a batcher; no chunk exceeds `chunk_ceiling` items.
    pub fn new(transport: Transport, builder: RequestBuilder, chunk_ceiling: usize) -> Self {
        Self {
            transport,
            builder,
            chunk_ceiling: chunk_ceiling.max(1),
        }
    }

    /// Chunk size for a descriptor: its own size capped by the ceiling.
    pub fn chunk_size(&self, descriptor: &ToolDescriptor) -> usize {
        match descriptor.mode {
            ToolMode::Bulk { chunk_size, .. } => chunk_size.clamp(1, self.chunk_ceiling),
            _ => self.chunk_ceiling,
        }
    }

    /// Send every chunk and return one outcome per item.
    ///
    /// Never short-circuits: all chunks are attempted.
    #[instrument(skip(self, descriptor, base, items), fields(tool = descriptor.name, items = items.len()))]
    pub async fn execute(
        &self,
        descriptor: &ToolDescriptor,
        base: &ApiRequest,
        items: Vec<Value>,
    ) -> BulkReport {
        let body_key = match descriptor.mode {
            ToolMode::Bulk { body_key, .. } => body_key,
            _ => "items",
        };
        let batch = BulkBatch::new(items, self.chunk_size(descriptor));
        debug!(chunks = batch.chunk_count(), chunk_size = batch.chunk_size, "Sending bulk chunks");

        let sends = batch.chunks().enumerate().map(|(chunk_index, (start, chunk))| {
            let request = self.builder.build_chunk(base, body_key, chunk);
            async move {
                let outcome = self.send_chunk(&request, chunk.len()).await;
                (chunk_index, start, chunk.len(), outcome)
            }
        });
        let results = join_all(sends).await;

        let mut outcomes = Vec::with_capacity(batch.items.len());
        for (chunk_index, start, len, outcome) in results {
            match outcome {
                Ok(per_item) => {
                    outcomes.extend(per_item.into_iter().enumerate().map(|(offset, result)| {
                        ItemOutcome {
                            index: start + offset,
                            chunk: chunk_index,
                            status: ItemStatus::Succeeded { result },
                        }
                    }))
                }
                Err(err) => {
                    warn!(chunk = chunk_index, start, len, error = %err, "Bulk chunk failed");
                    outcomes.extend((0..len).map(|offset| ItemOutcome {
                        index: start + offset,
                        chunk: chunk_index,
                        status: ItemStatus::Failed {
                            kind: err.kind(),
                            message: err.to_string(),
                        },
                    }))
                }
            }
        }
        outcomes.sort_by_key(|outcome| outcome.index);

        BulkReport::from_outcomes(outcomes)
    }

    async fn send_chunk(&self, request: &ApiRequest, len: usize) -> GatewayResult<Vec<Value>> {
        let response = self.transport.send(request).await?;
        let body = response.json_body()?;
        Ok(per_item_results(&body, len))
    }
}

/// Spread a chunk response over its items.
///
/// Uses `result.ids` or a `result` array when its length matches the chunk;
/// otherwise each item gets `null`.
fn per_item_results(body: &Value, len: usize) -> Vec<Value> {
    let result = body.get("result").unwrap_or(body);
    let aligned = result
        .get("ids")
        .and_then(Value::as_array)
        .filter(|ids| ids.len() == len)
        .map(|ids| ids.iter().map(|id| json!({ "id": id })).collect())
        .or_else(|| {
            result
                .as_array()
                .filter(|items| items.len() == len)
                .cloned()
        });
    aligned.unwrap_or_else(|| vec![Value::Null; len])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiEndpoints, ApiToken};
    use crate::registry::EndpointRegistry;
    use crate::request::RequestBody;
    use crate::transport::testing::{transport, ScriptedSender};
    use crate::transport::{ApiResponse, RetryPolicy};
    use std::sync::Arc;

    fn chunk_items(request: &ApiRequest) -> Vec<Value> {
        match &request.body {
            RequestBody::Json(body) => body["cases"].as_array().cloned().unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Fails the chunk whose first title is "case 100"; echoes ids otherwise.
    fn backend() -> Arc<ScriptedSender> {
        ScriptedSender::new(|_, request| {
            let items = chunk_items(request);
            if items[0]["title"] == "case 100" {
                return Ok(ApiResponse::json(500, &json!({"status": false, "errorMessage": "boom"})));
            }
            let ids: Vec<Value> = items
                .iter()
                .map(|item| json!(item["n"].as_u64().unwrap() + 1000))
                .collect();
            Ok(ApiResponse::json(200, &json!({"status": true, "result": {"ids": ids}})))
        })
    }

    fn setup(sender: Arc<ScriptedSender>, ceiling: usize) -> (BulkBatcher, ToolDescriptor, ApiRequest) {
        let registry = EndpointRegistry::qase();
        let descriptor = registry.resolve("qase_create_bulk_test_cases").unwrap().clone();
        let builder = RequestBuilder::new(ApiEndpoints::default(), ApiToken::new("t"));
        let args = registry
            .validate(
                &descriptor,
                json!({"project_code": "DEMO", "cases": [{"title": "x"}]}).as_object().unwrap(),
            )
            .unwrap();
        let base = builder.build(&descriptor, &args).unwrap();
        let batcher = BulkBatcher::new(transport(sender, RetryPolicy::fast()), builder, ceiling);
        (batcher, descriptor, base)
    }

    fn items(n: u64) -> Vec<Value> {
        (0..n).map(|i| json!({"title": format!("case {}", i), "n": i})).collect()
    }

    #[test]
    fn test_batch_chunks() {
        let batch = BulkBatch::new(items(250), 100);
        let sizes: Vec<(usize, usize)> = batch.chunks().map(|(start, c)| (start, c.len())).collect();
        assert_eq!(sizes, vec![(0, 100), (100, 100), (200, 50)]);
        assert_eq!(batch.chunk_count(), 3);
        assert_eq!(BulkBatch::new(items(0), 100).chunk_count(), 0);
    }

    #[tokio::test]
    async fn test_partial_failure_marks_only_failed_chunk() {
        let sender = backend();
        let (batcher, descriptor, base) = setup(sender.clone(), 100);

        let report = batcher.execute(&descriptor, &base, items(250)).await;

        assert_eq!(report.items.len(), 250);
        assert_eq!(report.succeeded, 150);
        assert_eq!(report.failed, 100);
        for (i, item) in report.items.iter().enumerate() {
            assert_eq!(item.index, i);
            if (100..200).contains(&i) {
                assert!(matches!(
                    item.status,
                    ItemStatus::Failed { kind: ErrorKind::UpstreamServerError, .. }
                ));
                assert_eq!(item.chunk, 1);
            } else {
                assert_eq!(
                    item.status,
                    ItemStatus::Succeeded { result: json!({"id": i as u64 + 1000}) }
                );
            }
        }

        // Chunks are idempotent, so the failing one was retried once.
        assert_eq!(sender.call_count(), 4);
        assert!(matches!(
            report.into_result(),
            Err(GatewayError::PartialBulkFailure { .. })
        ));
    }

    #[tokio::test]
    async fn test_ceiling_caps_chunk_size() {
        let sender = backend();
        let (batcher, descriptor, base) = setup(sender.clone(), 40);
        assert_eq!(batcher.chunk_size(&descriptor), 40);

        let report = batcher.execute(&descriptor, &base, items(90)).await;
        assert_eq!(report.failed, 0);
        let sizes: Vec<usize> = sender.calls().iter().map(|r| chunk_items(r).len()).collect();
        let mut sorted = sizes.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![10, 40, 40]);
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_per_item_results_fallbacks() {
        assert_eq!(
            per_item_results(&json!({"status": true}), 2),
            vec![Value::Null, Value::Null]
        );
        assert_eq!(
            per_item_results(&json!({"result": [{"hash": "a"}, {"hash": "b"}]}), 2),
            vec![json!({"hash": "a"}), json!({"hash": "b"})]
        );
        assert_eq!(
            per_item_results(&json!({"result": {"ids": [1]}}), 2),
            vec![Value::Null, Value::Null]
        );
    }

    #[test]
    fn test_report_serialization() {
        let report = BulkReport::from_outcomes(vec![
            ItemOutcome {
                index: 0,
                chunk: 0,
                status: ItemStatus::Succeeded { result: json!({"id": 5}) },
            },
            ItemOutcome {
                index: 1,
                chunk: 1,
                status: ItemStatus::Failed {
                    kind: ErrorKind::NetworkFailure,
                    message: "reset".into(),
                },
            },
        ]);
        assert_eq!(report.failed_items(), vec![(1, ErrorKind::NetworkFailure)]);
        let value = report.to_value();
        assert_eq!(value["items"][0]["status"], "succeeded");
        assert_eq!(value["items"][1]["kind"], "network_failure");
    }
}
