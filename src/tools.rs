//! Tool contract, input schemas, and the closure-backed tool builder.
//!
//! A tool is anything implementing [`Tool`]: a name, a description, a JSON-schema-shaped
//! description of its input, and an async `execute` that turns the decoded input map into
//! text. Backends serialize the schema into their request format; the agent looks tools
//! up by exact name when the model asks for one.
//!
//! Two ways to define a tool:
//!
//! ```rust
//! use relay_agent::{tool, Error};
//!
//! // 1. Closure-backed, via the builder
//! let add = tool("add", "Add two numbers")
//!     .param("a", "number")
//!     .param("b", "number")
//!     .build(|input| async move {
//!         let a = input.get("a").and_then(|v| v.as_f64())
//!             .ok_or_else(|| Error::invalid_input("Parameter 'a' must be a number"))?;
//!         let b = input.get("b").and_then(|v| v.as_f64())
//!             .ok_or_else(|| Error::invalid_input("Parameter 'b' must be a number"))?;
//!         Ok(format!("{}", a + b))
//!     });
//! # let _ = add;
//! ```
//!
//! 2. A struct implementing [`Tool`] directly (see [`crate::builtin_tools`]).
//!
//! Tools validate their own input and fail with [`Error::InvalidInput`] or
//! [`Error::Tool`]; the agent converts any failure into an error tool-result message.

use crate::types::ToolInput;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A capability the model can invoke mid-conversation
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model uses to call the tool. Matched exactly.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn input_schema(&self) -> ToolInputSchema;

    /// Run the tool against the input decoded from the backend's tool call.
    async fn execute(&self, input: &ToolInput) -> Result<String>;
}

/// JSON-schema-shaped description of a tool's input object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolInputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: BTreeMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl ToolInputSchema {
    /// An empty `"object"` schema
    pub fn object() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    /// Add an optional property. Re-adding a name replaces the previous definition.
    pub fn property(mut self, name: impl Into<String>, schema: PropertySchema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Add a property and list it in `required`
    pub fn required_property(mut self, name: impl Into<String>, schema: PropertySchema) -> Self {
        let name = name.into();
        if !self.required.contains(&name) {
            self.required.push(name.clone());
        }
        self.properties.insert(name, schema);
        self
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({"type": "object"}))
    }
}

impl Default for ToolInputSchema {
    fn default() -> Self {
        Self::object()
    }
}

/// Schema of one input property
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub property_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl PropertySchema {
    pub fn new(property_type: impl Into<String>) -> Self {
        Self {
            property_type: property_type.into(),
            description: None,
            enum_values: None,
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::new("string").with_description(description)
    }

    pub fn integer(description: impl Into<String>) -> Self {
        Self::new("integer").with_description(description)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_enum<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }
}

/// Fetch a required string field from a tool input
pub fn required_str<'a>(input: &'a ToolInput, key: &str) -> Result<&'a str> {
    match input.get(key) {
        Some(serde_json::Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(Error::invalid_input(format!(
            "Parameter '{key}' must be a string, got {other}"
        ))),
        None => Err(Error::invalid_input(format!(
            "Missing required parameter '{key}'"
        ))),
    }
}

/// Fetch an optional integer field; absent or null yields `None`
pub fn optional_i64(input: &ToolInput, key: &str) -> Result<Option<i64>> {
    match input.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => value.as_i64().map(Some).ok_or_else(|| {
            Error::invalid_input(format!("Parameter '{key}' must be an integer, got {value}"))
        }),
    }
}

/// Boxed async handler backing a [`FnTool`]
pub type ToolHandler =
    Arc<dyn Fn(ToolInput) -> Pin<Box<dyn Future<Output = Result<String>> + Send>> + Send + Sync>;

/// A tool whose behavior is a closure. Built with [`tool`] / [`ToolBuilder`].
#[derive(Clone)]
pub struct FnTool {
    name: String,
    description: String,
    input_schema: ToolInputSchema,
    handler: ToolHandler,
}

impl FnTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: ToolInputSchema,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            handler: Arc::new(move |input| Box::pin(handler(input))),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> ToolInputSchema {
        self.input_schema.clone()
    }

    async fn execute(&self, input: &ToolInput) -> Result<String> {
        (self.handler)(input.clone()).await
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish()
    }
}

/// Map the loose type names accepted by [`ToolBuilder::param`] onto JSON Schema types.
/// Unknown names fall back to `"string"`.
fn normalize_type(type_str: &str) -> &'static str {
    match type_str {
        "string" | "str" => "string",
        "integer" | "int" | "i32" | "i64" | "u32" | "u64" => "integer",
        "number" | "float" | "f32" | "f64" => "number",
        "boolean" | "bool" => "boolean",
        "array" | "list" | "vec" => "array",
        "object" | "dict" | "map" => "object",
        _ => "string",
    }
}

/// Fluent builder for [`FnTool`]
pub struct ToolBuilder {
    name: String,
    description: String,
    schema: ToolInputSchema,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema: ToolInputSchema::object(),
        }
    }

    /// Replace the schema wholesale
    pub fn schema(mut self, schema: ToolInputSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Add a required parameter by type name (`"string"`, `"number"`, `"int"`, ...)
    pub fn param(mut self, name: &str, type_str: &str) -> Self {
        self.schema = self
            .schema
            .required_property(name, PropertySchema::new(normalize_type(type_str)));
        self
    }

    /// Add a required parameter with a description
    pub fn described_param(mut self, name: &str, type_str: &str, description: &str) -> Self {
        self.schema = self.schema.required_property(
            name,
            PropertySchema::new(normalize_type(type_str)).with_description(description),
        );
        self
    }

    /// Add a parameter the model may omit
    pub fn optional_param(mut self, name: &str, type_str: &str) -> Self {
        self.schema = self
            .schema
            .property(name, PropertySchema::new(normalize_type(type_str)));
        self
    }

    pub fn build<F, Fut>(self, handler: F) -> FnTool
    where
        F: Fn(ToolInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        FnTool::new(self.name, self.description, self.schema, handler)
    }
}

/// Start building a closure-backed tool
pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder::new(name, description)
}

/// Ordered, name-unique set of registered tools.
///
/// Registering a tool whose name is already taken replaces the old tool in its
/// original position.
#[derive(Clone, Default)]
pub struct Toolset {
    tools: Vec<Arc<dyn Tool>>,
}

impl Toolset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        match self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            Some(slot) => {
                log::debug!("Replacing registered tool '{}'", tool.name());
                *slot = tool;
            }
            None => self.tools.push(tool),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn as_slice(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for Toolset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
