//! Request builder.
//!
//! Turns a descriptor plus validated arguments into a fully-formed
//! [`ApiRequest`]. Building is pure: the same inputs always produce the
//! same request, and nothing here touches the network.

use crate::config::{ApiEndpoints, ApiToken};
use crate::error::{GatewayError, GatewayResult};
use crate::registry::{ApiVersion, ArgLocation, HttpMethod, ToolDescriptor, ValidatedArguments};
use base64::Engine;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Header carrying the API token.
pub const TOKEN_HEADER: &str = "Token";

const DEFAULT_MIME: &str = "application/octet-stream";

/// One part of a multipart body.
#[derive(Clone, PartialEq, Eq)]
pub struct MultipartPart {
    /// Form field name.
    pub name: String,
    /// File name reported to the backend.
    pub file_name: String,
    /// MIME type of the content.
    pub mime_type: String,
    /// Raw content.
    pub data: Vec<u8>,
}

impl fmt::Debug for MultipartPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultipartPart")
            .field("name", &self.name)
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// No body.
    Empty,
    /// JSON document.
    Json(Value),
    /// `multipart/form-data` parts.
    Multipart(Vec<MultipartPart>),
}

/// A fully-formed outbound request.
#[derive(Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// API version the URL belongs to.
    pub api_version: ApiVersion,
    /// Absolute URL without the query string.
    pub url: String,
    /// Query parameters in a stable order.
    pub query: Vec<(String, String)>,
    /// Headers, including the token.
    pub headers: BTreeMap<String, String>,
    /// Payload.
    pub body: RequestBody,
    /// Whether the transport may repeat the request after a 5xx or timeout.
    pub idempotent: bool,
}

impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: BTreeMap<&str, &str> = self
            .headers
            .iter()
            .map(|(name, value)| {
                if name.eq_ignore_ascii_case(TOKEN_HEADER) {
                    (name.as_str(), "***")
                } else {
                    (name.as_str(), value.as_str())
                }
            })
            .collect();
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("api_version", &self.api_version)
            .field("url", &self.url)
            .field("query", &self.query)
            .field("headers", &headers)
            .field("body", &self.body)
            .field("idempotent", &self.idempotent)
            .finish()
    }
}

impl ApiRequest {
    /// Value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Copy with `limit` and `offset` replaced.
    pub fn with_page(&self, limit: u64, offset: u64) -> ApiRequest {
        let mut page = self.clone();
        page.query.retain(|(key, _)| key != "limit" && key != "offset");
        page.query.push(("limit".to_string(), limit.to_string()));
        page.query.push(("offset".to_string(), offset.to_string()));
        page
    }
}

/// Builds [`ApiRequest`]s from descriptors.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    endpoints: ApiEndpoints,
    token: ApiToken,
}

impl RequestBuilder {
    /// Create a builder for the given endpoints and token.
    pub fn new(endpoints: ApiEndpoints, token: ApiToken) -> Self {
        Self { endpoints, token }
    }

    /// Base URL for an API version.
    pub fn base_url(&self, version: ApiVersion) -> &str {
        match version {
            ApiVersion::V1 => &self.endpoints.v1,
            ApiVersion::V2 => &self.endpoints.v2,
        }
    }

    /// Build the request for one invocation.
    ///
    /// Bulk items and paging arguments are left out; the batcher and the
    /// paginator add them per chunk and per page.
    pub fn build(
        &self,
        descriptor: &ToolDescriptor,
        args: &ValidatedArguments,
    ) -> GatewayResult<ApiRequest> {
        let url = self.render_url(descriptor, args)?;

        let mut query = Vec::new();
        let mut fields = Map::new();
        let mut file_name = None;
        let mut file_content = None;
        let mut file_mime = None;

        for spec in &descriptor.args {
            let Some(value) = args.get(spec.name) else {
                continue;
            };
            match spec.location {
                ArgLocation::Query(name) => query.push((name.to_string(), render(value))),
                ArgLocation::Filter(name) => {
                    query.push((format!("filters[{}]", name), render(value)))
                }
                ArgLocation::Body(key) => {
                    fields.insert(key.to_string(), value.clone());
                }
                ArgLocation::FileName => file_name = value.as_str(),
                ArgLocation::FileContent => file_content = value.as_str(),
                ArgLocation::FileMime => file_mime = value.as_str(),
                ArgLocation::Path(_) | ArgLocation::Items | ArgLocation::Paging => {}
            }
        }

        let mut headers = BTreeMap::new();
        headers.insert(TOKEN_HEADER.to_string(), self.token.expose().to_string());
        headers.insert("Accept".to_string(), "application/json".to_string());

        let body = match file_content {
            Some(content) => {
                let data = base64::engine::general_purpose::STANDARD
                    .decode(content)
                    .map_err(|e| GatewayError::validation("content_base64", e.to_string()))?;
                RequestBody::Multipart(vec![MultipartPart {
                    name: "file".to_string(),
                    file_name: file_name.unwrap_or("attachment").to_string(),
                    mime_type: file_mime.unwrap_or(DEFAULT_MIME).to_string(),
                    data,
                }])
            }
            None => {
                headers.insert("Content-Type".to_string(), "application/json".to_string());
                if fields.is_empty() {
                    RequestBody::Empty
                } else {
                    RequestBody::Json(Value::Object(fields))
                }
            }
        };

        Ok(ApiRequest {
            method: descriptor.method,
            api_version: descriptor.api_version,
            url,
            query,
            headers,
            body,
            idempotent: descriptor.is_idempotent(),
        })
    }

    /// Request for one page of a list.
    pub fn build_page(&self, base: &ApiRequest, limit: u64, offset: u64) -> ApiRequest {
        base.with_page(limit, offset)
    }

    /// Request for one bulk chunk.
    ///
    /// The chunk is sent under `body_key` next to any other body fields.
    /// Chunks are tagged idempotent so the transport may repeat them.
    pub fn build_chunk(&self, base: &ApiRequest, body_key: &str, chunk: &[Value]) -> ApiRequest {
        let mut request = base.clone();
        let mut fields = match &base.body {
            RequestBody::Json(Value::Object(fields)) => fields.clone(),
            _ => Map::new(),
        };
        fields.insert(body_key.to_string(), Value::Array(chunk.to_vec()));
        request.body = RequestBody::Json(Value::Object(fields));
        request.idempotent = true;
        request
    }

    fn render_url(&self, descriptor: &ToolDescriptor, args: &ValidatedArguments) -> GatewayResult<String> {
        let base = self.base_url(descriptor.api_version);
        let mut url = reqwest::Url::parse(base)
            .map_err(|e| GatewayError::validation("base_url", e.to_string()))?;

        let mut segments = Vec::new();
        for segment in descriptor.path_template.split('/').filter(|s| !s.is_empty()) {
            match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(placeholder) => {
                    let value = descriptor
                        .args
                        .iter()
                        .find(|spec| spec.location == ArgLocation::Path(placeholder))
                        .and_then(|spec| args.get(spec.name))
                        .ok_or_else(|| {
                            GatewayError::validation(
                                placeholder,
                                "no argument supplies this path placeholder",
                            )
                        })?;
                    segments.push(render(value));
                }
                None => segments.push(segment.to_string()),
            }
        }

        url.path_segments_mut()
            .map_err(|_| GatewayError::validation("base_url", "cannot be a base URL"))?
            .pop_if_empty()
            .extend(segments.iter().map(String::as_str));

        Ok(url.to_string())
    }
}

/// Render a validated value as a path segment or query value.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(render).collect::<Vec<_>>().join(","),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::EndpointRegistry;
    use serde_json::json;

    fn builder() -> RequestBuilder {
        RequestBuilder::new(ApiEndpoints::default(), ApiToken::new("secret-token"))
    }

    fn build(tool: &str, args: Value) -> GatewayResult<ApiRequest> {
        let registry = EndpointRegistry::qase();
        let descriptor = registry.resolve(tool)?;
        let validated = registry.validate(descriptor, args.as_object().unwrap())?;
        builder().build(descriptor, &validated)
    }

    #[test]
    fn test_create_case_request() {
        let request = build(
            "qase_create_test_case",
            json!({"project_code": "DEMO", "title": "Login works", "type_id": 3}),
        )
        .unwrap();

        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.url, "https://api.qase.io/v1/case/DEMO");
        assert_eq!(request.body, RequestBody::Json(json!({"title": "Login works", "type": 3})));
        assert_eq!(request.headers.get("Token").unwrap(), "secret-token");
        assert_eq!(request.headers.get("Content-Type").unwrap(), "application/json");
        assert!(!request.idempotent);
    }

    #[test]
    fn test_build_is_deterministic() {
        let args = json!({"project_code": "DEMO", "priority": "high,low", "search": "login"});
        let first = build("qase_list_test_cases", args.clone()).unwrap();
        let second = build("qase_list_test_cases", args).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_filters_are_bracketed_and_joined() {
        let request = build(
            "qase_list_test_cases",
            json!({"project_code": "DEMO", "priority": ["high", "low"], "suite_id": 7, "limit": 50}),
        )
        .unwrap();
        assert_eq!(request.query_param("filters[priority]"), Some("high,low"));
        assert_eq!(request.query_param("filters[suite_id]"), Some("7"));
        assert_eq!(request.query_param("limit"), None);
        assert_eq!(request.body, RequestBody::Empty);
    }

    #[test]
    fn test_path_segments_are_encoded() {
        let request = build(
            "qase_get_shared_step",
            json!({"project_code": "DEMO", "shared_step_hash": "a b/c"}),
        )
        .unwrap();
        assert_eq!(request.url, "https://api.qase.io/v1/shared_step/DEMO/a%20b%2Fc");
    }

    #[test]
    fn test_missing_placeholder_names_it() {
        let descriptor = crate::registry::ToolDescriptor::get("t", "d", "/thing/{code}/{id}")
            .arg(crate::registry::ArgSpec::path(
                "project_code",
                "code",
                crate::registry::ArgType::String,
                "Code",
            ));
        let validated = crate::registry::schema::validate_arguments(
            &descriptor.args,
            json!({"project_code": "DEMO"}).as_object().unwrap(),
        )
        .unwrap();
        let err = builder().build(&descriptor, &validated).unwrap_err();
        assert!(matches!(err, GatewayError::Validation { ref field, .. } if field == "id"));
    }

    #[test]
    fn test_v2_base_url() {
        let request = build(
            "qase_create_results_v2",
            json!({
                "project_code": "DEMO",
                "run_id": 5,
                "results": [{"title": "a", "execution": {"status": "passed"}}]
            }),
        )
        .unwrap();
        assert_eq!(request.url, "https://api.qase.io/v2/DEMO/run/5/results");
        assert_eq!(request.body, RequestBody::Empty);
    }

    #[test]
    fn test_chunk_and_page_requests() {
        let base = build(
            "qase_create_bulk_test_results",
            json!({"project_code": "DEMO", "run_id": 5, "results": [{"case_id": 1, "status": "passed"}]}),
        )
        .unwrap();
        let chunk = builder().build_chunk(&base, "results", &[json!({"case_id": 1})]);
        assert_eq!(chunk.body, RequestBody::Json(json!({"results": [{"case_id": 1}]})));
        assert!(chunk.idempotent);

        let list = build("qase_list_suites", json!({"project_code": "DEMO"})).unwrap();
        let page = builder().build_page(&list, 100, 200);
        let again = builder().build_page(&page, 100, 300);
        assert_eq!(again.query_param("offset"), Some("300"));
        assert_eq!(again.query.len(), 2);
    }

    #[test]
    fn test_upload_is_multipart() {
        let request = build(
            "qase_upload_attachment",
            json!({"project_code": "DEMO", "file_name": "log.txt", "content_base64": "aGVsbG8="}),
        )
        .unwrap();
        match request.body {
            RequestBody::Multipart(ref parts) => {
                assert_eq!(parts[0].name, "file");
                assert_eq!(parts[0].file_name, "log.txt");
                assert_eq!(parts[0].mime_type, "application/octet-stream");
                assert_eq!(parts[0].data, b"hello");
            }
            ref other => panic!("unexpected body: {:?}", other),
        }
        assert!(!request.headers.contains_key("Content-Type"));
    }

    #[test]
    fn test_debug_redacts_token() {
        let request = build("qase_get_project", json!({"project_code": "DEMO"})).unwrap();
        let debug = format!("{:?}", request);
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("***"));
    }
}
