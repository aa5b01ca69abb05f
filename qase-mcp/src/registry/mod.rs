//! Endpoint registry.
//!
//! Maps tool names to [`ToolDescriptor`]s: the HTTP method, path template,
//! argument schema and execution mode of every exposed Qase operation. The
//! registry is built once from the static catalog and never mutated.

pub mod catalog;
pub mod schema;

pub use catalog::{Invalidation, InvalidationScope, INVALIDATIONS};
pub use schema::{ArgLocation, ArgSpec, ArgType, Constraint, ValidatedArguments};

use crate::error::{GatewayError, GatewayResult};
use crate::types::ToolDefinition;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// Qase REST API version a tool talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiVersion {
    /// `https://api.qase.io/v1`
    V1,
    /// `https://api.qase.io/v2`
    V2,
}

impl ApiVersion {
    /// Short label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiVersion::V1 => "v1",
            ApiVersion::V2 => "v2",
        }
    }
}

/// HTTP method of a tool's backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl HttpMethod {
    /// Method as understood by the HTTP client.
    pub fn as_reqwest(&self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }

    /// Method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether repeating the call has the same effect as sending it once.
    pub fn is_idempotent(&self) -> bool {
        !matches!(self, HttpMethod::Post)
    }

    /// Whether the call changes backend state.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, HttpMethod::Get)
    }
}

/// How a tool invocation is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolMode {
    /// One request, one response.
    Single,
    /// Paginated list aggregated across pages.
    List,
    /// Items split into chunks, sent concurrently and reassembled.
    Bulk {
        /// Argument holding the items.
        items_arg: &'static str,
        /// Body field the chunk is sent under.
        body_key: &'static str,
        /// Preferred chunk size; capped by the configured ceiling.
        chunk_size: usize,
    },
    /// Slow-changing reference data served from the cache.
    Reference {
        /// Cache endpoint name, shared with the invalidation table.
        endpoint: &'static str,
        /// Whether the backend paginates the data.
        paginated: bool,
    },
}

impl ToolMode {
    /// Whether the tool pages through results.
    pub fn supports_pagination(&self) -> bool {
        matches!(
            self,
            ToolMode::List | ToolMode::Reference { paginated: true, .. }
        )
    }

    /// Whether the tool batches items.
    pub fn supports_bulk(&self) -> bool {
        matches!(self, ToolMode::Bulk { .. })
    }
}

/// Shape of a successful tool result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultShape {
    /// The unwrapped `result` object.
    Object,
    /// `{ "total": n, "count": n, "entities": [...] }` gathered over pages.
    Entities,
    /// Backend only acknowledges; missing `result` is not an error.
    Ack,
}

/// Static description of one tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    /// Unique tool name (e.g., "qase_create_test_case").
    pub name: &'static str,

    /// Human-readable description.
    pub description: &'static str,

    /// HTTP method.
    pub method: HttpMethod,

    /// Path relative to the version base URL, with `{placeholder}` segments.
    pub path_template: &'static str,

    /// Ordered argument schema.
    pub args: Vec<ArgSpec>,

    /// Execution mode.
    pub mode: ToolMode,

    /// Shape of the normalized result.
    pub result_shape: ResultShape,

    /// API version.
    pub api_version: ApiVersion,

    /// Per-tool cache TTL override.
    pub cache_ttl: Option<Duration>,
}

impl ToolDescriptor {
    fn new(
        method: HttpMethod,
        name: &'static str,
        description: &'static str,
        path_template: &'static str,
    ) -> Self {
        let result_shape = match method {
            HttpMethod::Get => ResultShape::Object,
            _ => ResultShape::Ack,
        };
        Self {
            name,
            description,
            method,
            path_template,
            args: Vec::new(),
            mode: ToolMode::Single,
            result_shape,
            api_version: ApiVersion::V1,
            cache_ttl: None,
        }
    }

    /// GET tool.
    pub fn get(name: &'static str, description: &'static str, path: &'static str) -> Self {
        Self::new(HttpMethod::Get, name, description, path)
    }

    /// POST tool.
    pub fn post(name: &'static str, description: &'static str, path: &'static str) -> Self {
        Self::new(HttpMethod::Post, name, description, path)
    }

    /// PATCH tool.
    pub fn patch(name: &'static str, description: &'static str, path: &'static str) -> Self {
        Self::new(HttpMethod::Patch, name, description, path)
    }

    /// DELETE tool.
    pub fn delete(name: &'static str, description: &'static str, path: &'static str) -> Self {
        Self::new(HttpMethod::Delete, name, description, path)
    }

    /// Append an argument.
    pub fn arg(mut self, spec: ArgSpec) -> Self {
        self.args.push(spec);
        self
    }

    /// Aggregate pages; adds `limit`, `offset` and `max_results`.
    pub fn list(mut self) -> Self {
        self.mode = ToolMode::List;
        self.result_shape = ResultShape::Entities;
        self.args.push(
            ArgSpec::paging("limit", "Page size used while fetching (max 100)").range(1, 100),
        );
        self.args.push(
            ArgSpec::paging("offset", "Number of entities to skip before the first page")
                .range(0, i64::MAX),
        );
        self.args.push(
            ArgSpec::paging("max_results", "Maximum number of entities to return in total")
                .range(1, i64::MAX),
        );
        self
    }

    /// Split the given items argument into chunks sent under `body_key`.
    pub fn bulk(mut self, items_arg: &'static str, body_key: &'static str, chunk_size: usize) -> Self {
        self.mode = ToolMode::Bulk {
            items_arg,
            body_key,
            chunk_size,
        };
        self
    }

    /// Serve a single reference object from the cache.
    pub fn reference(mut self, endpoint: &'static str) -> Self {
        self.mode = ToolMode::Reference {
            endpoint,
            paginated: false,
        };
        self.result_shape = ResultShape::Object;
        self
    }

    /// Serve a paginated reference list from the cache; adds `max_results`.
    pub fn reference_list(mut self, endpoint: &'static str) -> Self {
        self.mode = ToolMode::Reference {
            endpoint,
            paginated: true,
        };
        self.result_shape = ResultShape::Entities;
        self.args.push(
            ArgSpec::paging("max_results", "Maximum number of entities to return in total")
                .range(1, i64::MAX),
        );
        self
    }

    /// Talk to the v2 API.
    pub fn v2(mut self) -> Self {
        self.api_version = ApiVersion::V2;
        self
    }

    /// Override the cache TTL.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Override the result shape.
    pub fn shape(mut self, shape: ResultShape) -> Self {
        self.result_shape = shape;
        self
    }

    /// Spec of a named argument.
    pub fn arg_spec(&self, name: &str) -> Option<&ArgSpec> {
        self.args.iter().find(|spec| spec.name == name)
    }

    /// Whether repeating the tool's request is safe.
    pub fn is_idempotent(&self) -> bool {
        self.method.is_idempotent()
    }

    /// MCP definition advertised to clients.
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name, self.description)
            .with_schema(schema::input_schema(&self.args))
            .with_category(catalog::category_of(self.path_template))
    }
}

/// Registry of every tool the gateway exposes.
#[derive(Debug, Clone)]
pub struct EndpointRegistry {
    tools: Vec<ToolDescriptor>,
    index: HashMap<&'static str, usize>,
}

impl EndpointRegistry {
    /// Registry populated with the full Qase catalog.
    pub fn qase() -> Self {
        Self::from_descriptors(catalog::all_tools())
    }

    /// Registry over an explicit descriptor list. The first descriptor wins
    /// on a duplicate name.
    pub fn from_descriptors(tools: Vec<ToolDescriptor>) -> Self {
        let mut index = HashMap::with_capacity(tools.len());
        for (position, tool) in tools.iter().enumerate() {
            if index.contains_key(tool.name) {
                warn!(tool = tool.name, "Duplicate tool name ignored");
                continue;
            }
            index.insert(tool.name, position);
        }
        Self { tools, index }
    }

    /// Look up a tool by name.
    pub fn resolve(&self, tool_name: &str) -> GatewayResult<&ToolDescriptor> {
        self.index
            .get(tool_name)
            .map(|&position| &self.tools[position])
            .ok_or_else(|| GatewayError::NotFoundTool(tool_name.to_string()))
    }

    /// Validate raw arguments against a descriptor's schema.
    pub fn validate(
        &self,
        descriptor: &ToolDescriptor,
        arguments: &Map<String, Value>,
    ) -> GatewayResult<ValidatedArguments> {
        schema::validate_arguments(&descriptor.args, arguments)
    }

    /// Registered descriptors in catalog order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools
            .iter()
            .enumerate()
            .filter(|(position, tool)| self.index.get(tool.name) == Some(position))
            .map(|(_, tool)| tool)
    }

    /// MCP definitions for every tool.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.descriptors().map(ToolDescriptor::definition).collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
