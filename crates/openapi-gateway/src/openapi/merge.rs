//! Merging backend OpenAPI documents into one combined document.
//!
//! Every merged section uses the same collision policy: the later backend in
//! registry order wins, and the overwrite is logged.

use crate::registry::{ServiceDescriptor, present};
use serde_json::{Map, Value, json};
use tracing::warn;

/// Component subsections present in every combined document.
pub const WELL_KNOWN_COMPONENTS: [&str; 4] = ["schemas", "responses", "parameters", "requestBodies"];

/// Path-item keys that hold operations.
const OPERATION_KEYS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Extension listing backends whose document could not be fetched.
pub const UNAVAILABLE_EXTENSION: &str = "x-gateway-unavailable";

/// Accumulates contributions from backend documents.
#[derive(Debug, Clone)]
pub struct DocumentMerger {
    paths: Map<String, Value>,
    components: Map<String, Value>,
    tags: Vec<Value>,
    security: Option<Value>,
    unavailable: Vec<String>,
}

impl Default for DocumentMerger {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentMerger {
    pub fn new() -> Self {
        let components = WELL_KNOWN_COMPONENTS
            .iter()
            .map(|k| (k.to_string(), Value::Object(Map::new())))
            .collect();
        Self {
            paths: Map::new(),
            components,
            tags: Vec::new(),
            security: None,
            unavailable: Vec::new(),
        }
    }

    /// Merge one backend's fetched document plus the security metadata from
    /// its descriptor.
    pub fn add_document(&mut self, service: &ServiceDescriptor, document: &Value) {
        if let Some(paths) = document.get("paths").and_then(Value::as_object) {
            self.add_paths(&service.name, paths);
        }
        if let Some(components) = document.get("components").and_then(Value::as_object) {
            self.add_components(&service.name, components);
        }
        if let Some(tags) = document.get("tags").and_then(Value::as_array) {
            self.add_tags(tags);
        }
        if let Some(security) = present(&service.security) {
            self.set_security(&service.name, security);
        }
        if let Some(schemes) = present(&service.security_schemes) {
            self.add_security_schemes(&service.name, schemes);
        }
    }

    /// Prefix every route with `/<service>`.
    pub fn add_paths(&mut self, service: &str, paths: &Map<String, Value>) {
        for (path, item) in paths {
            let prefixed = format!("/{service}{path}");
            if self.paths.insert(prefixed.clone(), item.clone()).is_some() {
                warn!(service, path = %prefixed, "path overwritten by later backend");
            }
        }
    }

    /// Merge component subsections by key. Any subsection name is accepted.
    pub fn add_components(&mut self, service: &str, components: &Map<String, Value>) {
        for (kind, entries) in components {
            let Some(entries) = entries.as_object() else {
                warn!(service, component = %kind, "ignoring non-object component section");
                continue;
            };
            self.merge_section(service, kind, entries);
        }
    }

    /// Append tags not already present, compared structurally.
    pub fn add_tags(&mut self, tags: &[Value]) {
        for tag in tags {
            if !self.tags.contains(tag) {
                self.tags.push(tag.clone());
            }
        }
    }

    pub fn set_security(&mut self, service: &str, security: &Value) {
        if self.security.replace(security.clone()).is_some() {
            warn!(service, "top-level security overwritten by later backend");
        }
    }

    /// Merge scheme definitions into `components.securitySchemes`.
    pub fn add_security_schemes(&mut self, service: &str, schemes: &Value) {
        match schemes.as_object() {
            Some(entries) => self.merge_section(service, "securitySchemes", entries),
            None => warn!(service, "ignoring non-object securitySchemes"),
        }
    }

    pub fn mark_unavailable(&mut self, service: &str) {
        self.unavailable.push(service.to_string());
    }

    fn merge_section(&mut self, service: &str, kind: &str, entries: &Map<String, Value>) {
        let section = self
            .components
            .entry(kind.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !section.is_object() {
            *section = Value::Object(Map::new());
        }
        let Some(section) = section.as_object_mut() else {
            return;
        };
        for (key, value) in entries {
            if section.insert(key.clone(), value.clone()).is_some() {
                warn!(service, component = %kind, key = %key, "component overwritten by later backend");
            }
        }
    }

    /// Assemble the combined document.
    pub fn finish(self, info: Value) -> Value {
        let mut doc = json!({
            "openapi": "3.1.0",
            "info": info,
            "paths": self.paths,
            "components": self.components,
            "tags": self.tags,
        });
        if let Some(security) = self.security {
            doc["security"] = security;
        }
        if !self.unavailable.is_empty() {
            doc[UNAVAILABLE_EXTENSION] = json!(self.unavailable);
        }
        doc
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parameter injection
// ─────────────────────────────────────────────────────────────────────────────

/// Gateway-key parameter with `schema.default` set to the shared secret.
/// `name` / `in` default to `gateway_key` / `query` when the descriptor omits
/// them.
pub fn gateway_parameter(descriptor: &Value, secret: &str) -> Value {
    let mut param = with_location_defaults(descriptor, "gateway_key");
    if let Some(obj) = param.as_object_mut() {
        let schema = obj
            .entry("schema")
            .or_insert_with(|| json!({ "type": "string" }));
        if !schema.is_object() {
            *schema = json!({ "type": "string" });
        }
        schema["default"] = Value::String(secret.to_string());
    }
    param
}

/// Advertised api-key parameter, `name` / `in` defaulting to `api_key` /
/// `query`.
pub fn api_key_parameter(descriptor: &Value) -> Value {
    with_location_defaults(descriptor, "api_key")
}

fn with_location_defaults(descriptor: &Value, default_name: &str) -> Value {
    let mut param = descriptor.clone();
    if let Some(obj) = param.as_object_mut() {
        obj.entry("name")
            .or_insert_with(|| Value::String(default_name.to_string()));
        obj.entry("in")
            .or_insert_with(|| Value::String("query".to_string()));
    }
    param
}

/// Append `extra` parameters to every operation of every path item, unless
/// the operation already declares one with the same `name` and `in`.
pub fn inject_parameters(paths: &mut Map<String, Value>, extra: &[Value]) {
    if extra.is_empty() {
        return;
    }
    for item in paths.values_mut() {
        let Some(item) = item.as_object_mut() else {
            continue;
        };
        for (method, operation) in item.iter_mut() {
            if !OPERATION_KEYS.contains(&method.as_str()) {
                continue;
            }
            let Some(operation) = operation.as_object_mut() else {
                continue;
            };
            let params = operation
                .entry("parameters")
                .or_insert_with(|| Value::Array(Vec::new()));
            let Some(params) = params.as_array_mut() else {
                continue;
            };
            for param in extra {
                if !params.iter().any(|p| same_location(p, param)) {
                    params.push(param.clone());
                }
            }
        }
    }
}

fn same_location(a: &Value, b: &Value) -> bool {
    let name = |v: &Value| v.get("name").and_then(Value::as_str).map(str::to_owned);
    let location = |v: &Value| v.get("in").and_then(Value::as_str).map(str::to_owned);
    name(a).is_some() && name(a) == name(b) && location(a) == location(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svc(name: &str) -> ServiceDescriptor {
        ServiceDescriptor::new(name, "http://x", "http://x/openapi.json")
    }

    fn doc_with_items(schema_name: &str) -> Value {
        json!({
            "paths": {"/items": {"get": {"responses": {"200": {"description": "ok"}}}}},
            "components": {"schemas": {schema_name: {"type": "object"}}},
            "tags": [{"name": "items"}]
        })
    }

    #[test]
    fn same_path_in_two_backends_does_not_collide() {
        let mut merger = DocumentMerger::new();
        merger.add_document(&svc("serviceA"), &doc_with_items("A"));
        merger.add_document(&svc("serviceB"), &doc_with_items("B"));
        let doc = merger.finish(json!({"title": "t", "version": "1"}));

        let paths = doc["paths"].as_object().unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths.contains_key("/serviceA/items"));
        assert!(paths.contains_key("/serviceB/items"));
    }

    #[test]
    fn well_known_components_always_present() {
        let doc = DocumentMerger::new().finish(json!({}));
        for kind in WELL_KNOWN_COMPONENTS {
            assert!(doc["components"][kind].is_object(), "{kind} missing");
        }
        assert!(doc.get("security").is_none());
        assert!(doc.get(UNAVAILABLE_EXTENSION).is_none());
    }

    #[test]
    fn later_backend_wins_component_collisions() {
        let mut merger = DocumentMerger::new();
        merger.add_components(
            "a",
            json!({"schemas": {"Item": {"title": "from a"}, "OnlyA": {}}})
                .as_object()
                .unwrap(),
        );
        merger.add_components(
            "b",
            json!({"schemas": {"Item": {"title": "from b"}}})
                .as_object()
                .unwrap(),
        );
        let doc = merger.finish(json!({}));
        assert_eq!(doc["components"]["schemas"]["Item"]["title"], "from b");
        assert!(doc["components"]["schemas"]["OnlyA"].is_object());
    }

    #[test]
    fn unknown_component_sections_are_kept() {
        let mut merger = DocumentMerger::new();
        merger.add_components(
            "a",
            json!({"headers": {"X-Rate": {"schema": {"type": "integer"}}}, "examples": "bogus"})
                .as_object()
                .unwrap(),
        );
        let doc = merger.finish(json!({}));
        assert!(doc["components"]["headers"]["X-Rate"].is_object());
        assert!(doc["components"].get("examples").is_none());
    }

    #[test]
    fn tags_are_deduplicated_structurally() {
        let mut merger = DocumentMerger::new();
        merger.add_tags(&[json!({"name": "items"}), json!({"name": "users"})]);
        merger.add_tags(&[
            json!({"name": "items"}),
            json!({"name": "items", "description": "differs"}),
        ]);
        let doc = merger.finish(json!({}));
        assert_eq!(doc["tags"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn security_comes_from_last_supplier() {
        let mut merger = DocumentMerger::new();
        merger.add_document(
            &svc("a")
                .with_security(json!([{"basic": []}]))
                .with_security_schemes(json!({"basic": {"type": "http", "scheme": "basic"}})),
            &json!({}),
        );
        merger.add_document(
            &svc("b")
                .with_security(json!([{"bearer": []}]))
                .with_security_schemes(json!({"bearer": {"type": "http", "scheme": "bearer"}})),
            &json!({}),
        );
        merger.add_document(&svc("c"), &json!({}));
        merger.add_document(&svc("d").with_security(Value::Null), &json!({}));
        let doc = merger.finish(json!({}));

        assert_eq!(doc["security"], json!([{"bearer": []}]));
        assert!(doc["components"]["securitySchemes"]["basic"].is_object());
        assert!(doc["components"]["securitySchemes"]["bearer"].is_object());
    }

    #[test]
    fn unavailable_backends_are_listed() {
        let mut merger = DocumentMerger::new();
        merger.mark_unavailable("down");
        let doc = merger.finish(json!({}));
        assert_eq!(doc[UNAVAILABLE_EXTENSION], json!(["down"]));
    }

    #[test]
    fn gateway_parameter_defaults_to_secret() {
        let param = gateway_parameter(&json!({"required": true}), "s3cret");
        assert_eq!(param["name"], "gateway_key");
        assert_eq!(param["in"], "query");
        assert_eq!(param["schema"]["default"], "s3cret");
        assert_eq!(param["schema"]["type"], "string");
    }

    #[test]
    fn injection_skips_existing_parameter_and_non_operations() {
        let mut paths = json!({
            "/items": {
                "summary": "items",
                "parameters": [{"name": "shared", "in": "query"}],
                "get": {"parameters": [{"name": "gateway_key", "in": "query"}]},
                "post": {},
                "put": {"parameters": [{"name": "gateway_key", "in": "header"}]}
            }
        })
        .as_object()
        .unwrap()
        .clone();
        let extra = vec![
            gateway_parameter(&json!({"name": "gateway_key", "in": "query"}), "k"),
            api_key_parameter(&json!({"schema": {"type": "string"}})),
        ];

        inject_parameters(&mut paths, &extra);
        inject_parameters(&mut paths, &extra);

        let item = &paths["/items"];
        let count = |op: &str, name: &str, loc: &str| {
            item[op]["parameters"]
                .as_array()
                .unwrap()
                .iter()
                .filter(|p| p["name"] == name && p["in"] == loc)
                .count()
        };
        assert_eq!(count("get", "gateway_key", "query"), 1);
        assert_eq!(count("post", "gateway_key", "query"), 1);
        assert_eq!(count("put", "gateway_key", "query"), 1);
        assert_eq!(count("put", "gateway_key", "header"), 1);
        assert_eq!(count("get", "api_key", "query"), 1);
        assert_eq!(item["parameters"].as_array().unwrap().len(), 1);
        assert_eq!(item["summary"], "items");
    }
}
