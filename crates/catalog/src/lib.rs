use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use toolmesh_core_types::{MeshError, ToolSpec};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("tool already registered: {0}")]
    AlreadyRegistered(String),
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

impl From<CatalogError> for MeshError {
    fn from(value: CatalogError) -> Self {
        match value {
            CatalogError::AlreadyRegistered(name) => {
                MeshError::internal(format!("tool already registered: {name}"))
            }
            CatalogError::UnknownTool(name) => MeshError::UnknownTool(name),
        }
    }
}

/// Append-only catalog of tool metadata. Registration happens at startup;
/// there are no removal semantics.
#[derive(Default)]
pub struct ToolCatalog {
    tools: DashMap<String, Arc<ToolSpec>>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self {
            tools: DashMap::new(),
        }
    }

    pub fn register(&self, spec: ToolSpec) -> Result<(), CatalogError> {
        if self.tools.contains_key(&spec.name) {
            return Err(CatalogError::AlreadyRegistered(spec.name));
        }
        debug!(target: "catalog", tool = %spec.name, mode = ?spec.execution_mode, "tool registered");
        self.tools.insert(spec.name.clone(), Arc::new(spec));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<ToolSpec>> {
        self.tools.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn all(&self) -> Vec<Arc<ToolSpec>> {
        let mut specs: Vec<Arc<ToolSpec>> = self
            .tools
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Symmetric conflict check: true if either tool declares the other.
    pub fn has_conflict(&self, a: &str, b: &str) -> bool {
        let declares = |tool: &str, other: &str| {
            self.tools
                .get(tool)
                .map(|entry| entry.conflicts_with.iter().any(|c| c == other))
                .unwrap_or(false)
        };
        declares(a, b) || declares(b, a)
    }

    /// Declared dependencies of `name` not contained in `satisfied`.
    pub fn missing_dependencies(
        &self,
        name: &str,
        satisfied: &HashSet<String>,
    ) -> Result<Vec<String>, CatalogError> {
        let spec = self
            .get(name)
            .ok_or_else(|| CatalogError::UnknownTool(name.to_string()))?;
        Ok(spec
            .dependencies
            .iter()
            .filter(|dep| !satisfied.contains(*dep))
            .cloned()
            .collect())
    }

    /// Validate call arguments against the tool's declared input schema.
    ///
    /// Checks the `required` property list and primitive `type` tags of
    /// declared properties. Runs at plan submission so malformed calls are
    /// rejected before they enter the engine.
    pub fn validate_args(&self, name: &str, args: &Value) -> Result<(), MeshError> {
        let spec = self
            .get(name)
            .ok_or_else(|| MeshError::UnknownTool(name.to_string()))?;
        validate_against_schema(name, &spec.input_schema, args)
    }
}

fn validate_against_schema(tool: &str, schema: &Value, args: &Value) -> Result<(), MeshError> {
    let invalid = |reason: String| MeshError::InvalidArguments {
        tool: tool.to_string(),
        reason,
    };

    let properties = schema.get("properties").and_then(Value::as_object);
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    if required.is_empty() && properties.is_none() {
        return Ok(());
    }

    let object = match args {
        Value::Object(map) => map,
        Value::Null if required.is_empty() => return Ok(()),
        Value::Null => {
            return Err(invalid(format!(
                "missing required properties: {}",
                required.join(", ")
            )))
        }
        other => {
            return Err(invalid(format!(
                "expected an object, got {}",
                json_type_name(other)
            )))
        }
    };

    for field in &required {
        if !object.contains_key(*field) {
            return Err(invalid(format!("missing required property: {field}")));
        }
    }

    if let Some(props) = properties {
        for (field, value) in object {
            let Some(declared) = props.get(field).and_then(|p| p.get("type")) else {
                continue;
            };
            let Some(expected) = declared.as_str() else {
                continue;
            };
            if !matches_type(value, expected) {
                return Err(invalid(format!(
                    "property {field} should be {expected}, got {}",
                    json_type_name(value)
                )));
            }
        }
    }

    Ok(())
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use toolmesh_core_types::ExecutionMode;

    fn catalog_with(specs: Vec<ToolSpec>) -> ToolCatalog {
        let catalog = ToolCatalog::new();
        for spec in specs {
            catalog.register(spec).unwrap();
        }
        catalog
    }

    #[test]
    fn register_rejects_duplicates() {
        let catalog = ToolCatalog::new();
        catalog
            .register(ToolSpec::new("click", ExecutionMode::Serial))
            .unwrap();
        let err = catalog
            .register(ToolSpec::new("click", ExecutionMode::Serial))
            .unwrap_err();
        assert!(matches!(err, CatalogError::AlreadyRegistered(name) if name == "click"));
    }

    #[test]
    fn conflicts_are_symmetric() {
        let catalog = catalog_with(vec![
            ToolSpec::new("screenshot", ExecutionMode::Parallel).with_conflicts(["analyze"]),
            ToolSpec::new("analyze", ExecutionMode::Parallel),
        ]);

        assert!(catalog.has_conflict("screenshot", "analyze"));
        assert!(catalog.has_conflict("analyze", "screenshot"));
        assert!(!catalog.has_conflict("analyze", "analyze"));
    }

    #[test]
    fn missing_dependencies_filters_satisfied() {
        let catalog = catalog_with(vec![
            ToolSpec::new("analyze", ExecutionMode::Parallel)
                .with_dependencies(["fetchPage", "extract"]),
            ToolSpec::new("fetchPage", ExecutionMode::Parallel),
            ToolSpec::new("extract", ExecutionMode::Parallel),
        ]);

        let satisfied: HashSet<String> = ["fetchPage".to_string()].into_iter().collect();
        let missing = catalog.missing_dependencies("analyze", &satisfied).unwrap();
        assert_eq!(missing, vec!["extract".to_string()]);
    }

    #[test]
    fn missing_dependencies_unknown_tool_errors() {
        let catalog = ToolCatalog::new();
        let err = catalog
            .missing_dependencies("ghost", &HashSet::new())
            .unwrap_err();
        assert!(matches!(err, CatalogError::UnknownTool(name) if name == "ghost"));
    }

    #[test]
    fn validate_args_checks_required_and_types() {
        let catalog = catalog_with(vec![ToolSpec::new("navigate", ExecutionMode::Serial)
            .with_schema(json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string" },
                    "timeout": { "type": "integer" }
                },
                "required": ["url"]
            }))]);

        catalog
            .validate_args("navigate", &json!({ "url": "https://example.com" }))
            .unwrap();

        let missing = catalog.validate_args("navigate", &json!({})).unwrap_err();
        assert!(matches!(missing, MeshError::InvalidArguments { .. }));

        let wrong_type = catalog
            .validate_args("navigate", &json!({ "url": 42 }))
            .unwrap_err();
        assert!(matches!(wrong_type, MeshError::InvalidArguments { .. }));
    }

    #[test]
    fn validate_args_accepts_null_without_required() {
        let catalog = catalog_with(vec![ToolSpec::new("snapshot", ExecutionMode::Parallel)]);
        catalog
            .validate_args("snapshot", &Value::Null)
            .expect("schema without required fields accepts null args");
    }
}
