//! Argument schema and validation.
//!
//! Each tool declares an ordered list of [`ArgSpec`]s. The same list drives
//! three things: validation of incoming arguments, placement of each value
//! in the outgoing request (path, query, filter, body, multipart), and the
//! JSON Schema advertised to MCP clients.

use crate::error::{GatewayError, GatewayResult};
use base64::Engine;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Value type of an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    /// JSON string.
    String,
    /// Integer; numeric strings are coerced.
    Integer,
    /// Boolean; "true"/"false" strings are coerced.
    Boolean,
    /// List of strings; a comma-separated string is split.
    StringList,
    /// List of integers; a comma-separated string is split and coerced.
    IntegerList,
    /// List of JSON objects (steps, custom field values, bulk items).
    ObjectList,
    /// Single JSON object.
    Object,
    /// Base64-encoded binary payload.
    Base64,
}

impl ArgType {
    fn describe(&self) -> &'static str {
        match self {
            ArgType::String => "a string",
            ArgType::Integer => "an integer",
            ArgType::Boolean => "a boolean",
            ArgType::StringList => "a list of strings",
            ArgType::IntegerList => "a list of integers",
            ArgType::ObjectList => "a list of objects",
            ArgType::Object => "an object",
            ArgType::Base64 => "a base64-encoded string",
        }
    }
}

/// Where a validated value ends up in the HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgLocation {
    /// Substituted into the named path placeholder.
    Path(&'static str),
    /// Plain query parameter.
    Query(&'static str),
    /// Bracketed filter query parameter: `filters[<name>]`.
    Filter(&'static str),
    /// JSON body field.
    Body(&'static str),
    /// Items of a bulk request; split into chunks by the batcher.
    Items,
    /// Page control (`limit`, `offset`, `max_results`) consumed by the paginator.
    Paging,
    /// File name of a multipart upload.
    FileName,
    /// Base64 content of a multipart upload.
    FileContent,
    /// MIME type of a multipart upload.
    FileMime,
}

/// Additional checks applied after type coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Value (or every list element) must be one of the given strings.
    OneOf(&'static [&'static str]),
    /// Integer value (or every list element) must be within `min..=max`.
    Range {
        /// Inclusive minimum.
        min: i64,
        /// Inclusive maximum.
        max: i64,
    },
    /// Strings must not be blank, lists must not be empty.
    NonEmpty,
}

/// One argument in a tool's schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgSpec {
    /// Argument name as seen by the MCP client.
    pub name: &'static str,
    /// Value type.
    pub ty: ArgType,
    /// Whether the argument must be present.
    pub required: bool,
    /// Placement in the HTTP request.
    pub location: ArgLocation,
    /// Human-readable description for the advertised schema.
    pub description: &'static str,
    /// Extra checks.
    pub constraints: Vec<Constraint>,
    /// Schema of each element of an object list. Fields not listed pass
    /// through unchecked.
    pub item_fields: Vec<ArgSpec>,
}

impl ArgSpec {
    fn new(name: &'static str, ty: ArgType, location: ArgLocation, description: &'static str) -> Self {
        Self {
            name,
            ty,
            required: false,
            location,
            description,
            constraints: Vec::new(),
            item_fields: Vec::new(),
        }
    }

    /// Required argument substituted into a path placeholder.
    pub fn path(
        name: &'static str,
        placeholder: &'static str,
        ty: ArgType,
        description: &'static str,
    ) -> Self {
        Self::new(name, ty, ArgLocation::Path(placeholder), description).required()
    }

    /// Optional JSON body field named like the argument.
    pub fn body(name: &'static str, ty: ArgType, description: &'static str) -> Self {
        Self::new(name, ty, ArgLocation::Body(name), description)
    }

    /// Optional query parameter named like the argument.
    pub fn query(name: &'static str, ty: ArgType, description: &'static str) -> Self {
        Self::new(name, ty, ArgLocation::Query(name), description)
    }

    /// Optional bracketed filter parameter.
    pub fn filter(
        name: &'static str,
        filter: &'static str,
        ty: ArgType,
        description: &'static str,
    ) -> Self {
        Self::new(name, ty, ArgLocation::Filter(filter), description)
    }

    /// Required list of bulk items.
    pub fn items(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ArgType::ObjectList, ArgLocation::Items, description)
            .required()
            .non_empty()
    }

    /// Page-control argument.
    pub fn paging(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ArgType::Integer, ArgLocation::Paging, description)
    }

    /// Argument at an explicit location.
    pub fn at(
        name: &'static str,
        ty: ArgType,
        location: ArgLocation,
        description: &'static str,
    ) -> Self {
        Self::new(name, ty, location, description)
    }

    /// Mark as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Send under a different body field name.
    pub fn field(mut self, key: &'static str) -> Self {
        if let ArgLocation::Body(_) = self.location {
            self.location = ArgLocation::Body(key);
        }
        self
    }

    /// Restrict to an enumerated set of values.
    pub fn one_of(mut self, values: &'static [&'static str]) -> Self {
        self.constraints.push(Constraint::OneOf(values));
        self
    }

    /// Restrict integers to an inclusive range.
    pub fn range(mut self, min: i64, max: i64) -> Self {
        self.constraints.push(Constraint::Range { min, max });
        self
    }

    /// Reject blank strings and empty lists.
    pub fn non_empty(mut self) -> Self {
        self.constraints.push(Constraint::NonEmpty);
        self
    }

    /// Check every element of an object list against `fields`.
    pub fn item_fields(mut self, fields: Vec<ArgSpec>) -> Self {
        self.item_fields = fields;
        self
    }

    /// JSON Schema fragment for this argument.
    pub fn json_schema(&self) -> Value {
        let mut schema = Map::new();
        match self.ty {
            ArgType::String => {
                schema.insert("type".into(), json!("string"));
            }
            ArgType::Base64 => {
                schema.insert("type".into(), json!("string"));
                schema.insert("contentEncoding".into(), json!("base64"));
            }
            ArgType::Integer => {
                schema.insert("type".into(), json!("integer"));
            }
            ArgType::Boolean => {
                schema.insert("type".into(), json!("boolean"));
            }
            ArgType::StringList => {
                schema.insert("type".into(), json!("array"));
                schema.insert("items".into(), json!({"type": "string"}));
            }
            ArgType::IntegerList => {
                schema.insert("type".into(), json!("array"));
                schema.insert("items".into(), json!({"type": "integer"}));
            }
            ArgType::ObjectList if !self.item_fields.is_empty() => {
                let (properties, required) = properties_of(&self.item_fields);
                schema.insert("type".into(), json!("array"));
                schema.insert(
                    "items".into(),
                    json!({"type": "object", "properties": properties, "required": required}),
                );
            }
            ArgType::ObjectList => {
                schema.insert("type".into(), json!("array"));
                schema.insert("items".into(), json!({"type": "object"}));
            }
            ArgType::Object => {
                schema.insert("type".into(), json!("object"));
            }
        }
        schema.insert("description".into(), json!(self.description));

        for constraint in &self.constraints {
            match constraint {
                Constraint::OneOf(values) => {
                    let target = match self.ty {
                        ArgType::StringList => schema
                            .get_mut("items")
                            .and_then(Value::as_object_mut),
                        _ => Some(&mut schema),
                    };
                    if let Some(target) = target {
                        target.insert("enum".into(), json!(values));
                    }
                }
                Constraint::Range { min, max } => {
                    let target = match self.ty {
                        ArgType::IntegerList => schema
                            .get_mut("items")
                            .and_then(Value::as_object_mut),
                        _ => Some(&mut schema),
                    };
                    if let Some(target) = target {
                        target.insert("minimum".into(), json!(min));
                        target.insert("maximum".into(), json!(max));
                    }
                }
                Constraint::NonEmpty => match self.ty {
                    ArgType::StringList | ArgType::IntegerList | ArgType::ObjectList => {
                        schema.insert("minItems".into(), json!(1));
                    }
                    _ => {
                        schema.insert("minLength".into(), json!(1));
                    }
                },
            }
        }

        Value::Object(schema)
    }

    /// Coerce and check a raw value against this spec.
    fn check(&self, raw: &Value) -> GatewayResult<Value> {
        let value = self.coerce(raw)?;
        for constraint in &self.constraints {
            self.apply(constraint, &value)?;
        }
        Ok(value)
    }

    fn mismatch(&self) -> GatewayError {
        GatewayError::validation(self.name, format!("expected {}", self.ty.describe()))
    }

    fn coerce(&self, raw: &Value) -> GatewayResult<Value> {
        match self.ty {
            ArgType::String => match raw {
                Value::String(_) => Ok(raw.clone()),
                _ => Err(self.mismatch()),
            },
            ArgType::Base64 => {
                let text = raw.as_str().ok_or_else(|| self.mismatch())?;
                base64::engine::general_purpose::STANDARD
                    .decode(text.trim())
                    .map_err(|e| GatewayError::validation(self.name, format!("invalid base64: {}", e)))?;
                Ok(Value::String(text.trim().to_string()))
            }
            ArgType::Integer => coerce_integer(raw)
                .map(Value::from)
                .ok_or_else(|| self.mismatch()),
            ArgType::Boolean => match raw {
                Value::Bool(_) => Ok(raw.clone()),
                Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
                Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
                _ => Err(self.mismatch()),
            },
            ArgType::StringList => {
                let items = split_list(raw).ok_or_else(|| self.mismatch())?;
                items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(s) => Ok(Value::String(s.trim().to_string())),
                        _ => Err(self.mismatch()),
                    })
                    .collect::<GatewayResult<Vec<_>>>()
                    .map(Value::Array)
            }
            ArgType::IntegerList => {
                let items = split_list(raw).ok_or_else(|| self.mismatch())?;
                items
                    .iter()
                    .map(|item| coerce_integer(item).map(Value::from).ok_or_else(|| self.mismatch()))
                    .collect::<GatewayResult<Vec<_>>>()
                    .map(Value::Array)
            }
            ArgType::ObjectList => match raw {
                Value::Array(items) if items.iter().all(Value::is_object) => items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| self.check_item(index, item))
                    .collect::<GatewayResult<Vec<_>>>()
                    .map(Value::Array),
                _ => Err(self.mismatch()),
            },
            ArgType::Object => match raw {
                Value::Object(_) => Ok(raw.clone()),
                _ => Err(self.mismatch()),
            },
        }
    }

    /// Check the listed fields of one list element. Errors name the field as
    /// `<list>[<index>].<field>`.
    fn check_item(&self, index: usize, item: &Value) -> GatewayResult<Value> {
        let mut checked = match item {
            Value::Object(fields) => fields.clone(),
            _ => return Err(self.mismatch()),
        };
        for spec in &self.item_fields {
            let path = format!("{}[{}].{}", self.name, index, spec.name);
            let value = match checked.get(spec.name).filter(|v| !v.is_null()) {
                Some(raw) => spec.check(raw).map_err(|err| match err {
                    GatewayError::Validation { message, .. } => {
                        GatewayError::validation(path, message)
                    }
                    other => other,
                })?,
                None if spec.required => {
                    return Err(GatewayError::validation(path, "is required"));
                }
                None => continue,
            };
            checked.insert(spec.name.to_string(), value);
        }
        Ok(Value::Object(checked))
    }

    fn apply(&self, constraint: &Constraint, value: &Value) -> GatewayResult<()> {
        let elements: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };

        match constraint {
            Constraint::OneOf(allowed) => {
                for element in elements {
                    let ok = element.as_str().map_or(false, |s| allowed.contains(&s));
                    if !ok {
                        return Err(GatewayError::validation(
                            self.name,
                            format!("must be one of: {}", allowed.join(", ")),
                        ));
                    }
                }
            }
            Constraint::Range { min, max } => {
                for element in elements {
                    let ok = element.as_i64().map_or(false, |n| n >= *min && n <= *max);
                    if !ok {
                        return Err(GatewayError::validation(
                            self.name,
                            format!("must be between {} and {}", min, max),
                        ));
                    }
                }
            }
            Constraint::NonEmpty => {
                let empty = match value {
                    Value::Array(items) => items.is_empty(),
                    Value::String(s) => s.trim().is_empty(),
                    _ => false,
                };
                if empty {
                    return Err(GatewayError::validation(self.name, "must not be empty"));
                }
            }
        }
        Ok(())
    }
}

fn coerce_integer(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn split_list(raw: &Value) -> Option<Vec<Value>> {
    match raw {
        Value::Array(items) => Some(items.clone()),
        Value::String(s) => Some(
            s.split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| Value::String(part.to_string()))
                .collect(),
        ),
        Value::Number(_) => Some(vec![raw.clone()]),
        _ => None,
    }
}

/// Arguments that passed validation, keyed by argument name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedArguments {
    values: BTreeMap<&'static str, Value>,
}

impl ValidatedArguments {
    /// Validated value of an argument, if supplied.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// String value of an argument.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Non-negative integer value of an argument.
    pub fn get_u64(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(Value::as_u64)
    }

    /// Whether the argument was supplied.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of supplied arguments.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no argument was supplied.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Validate raw arguments against an ordered schema.
///
/// Unknown names are rejected, `null` counts as absent, and each present
/// value is coerced and constrained by its spec.
pub fn validate_arguments(
    specs: &[ArgSpec],
    arguments: &Map<String, Value>,
) -> GatewayResult<ValidatedArguments> {
    if let Some(unknown) = arguments
        .keys()
        .find(|key| !specs.iter().any(|spec| spec.name == key.as_str()))
    {
        return Err(GatewayError::validation(unknown.as_str(), "unknown argument"));
    }

    let mut values = BTreeMap::new();
    for spec in specs {
        match arguments.get(spec.name).filter(|v| !v.is_null()) {
            Some(raw) => {
                values.insert(spec.name, spec.check(raw)?);
            }
            None if spec.required => {
                return Err(GatewayError::validation(spec.name, "is required"));
            }
            None => {}
        }
    }

    Ok(ValidatedArguments { values })
}

/// JSON Schema for a whole argument list.
pub fn input_schema(specs: &[ArgSpec]) -> Value {
    let (properties, required) = properties_of(specs);

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

fn properties_of(specs: &[ArgSpec]) -> (Map<String, Value>, Vec<&'static str>) {
    let properties = specs
        .iter()
        .map(|spec| (spec.name.to_string(), spec.json_schema()))
        .collect();
    let required = specs
        .iter()
        .filter(|spec| spec.required)
        .map(|spec| spec.name)
        .collect();
    (properties, required)
}
