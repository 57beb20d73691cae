//! Placeholder resolution - `${task.field}` substitution
//!
//! Grammar: `${PATH}` where PATH is dot-separated segments of letters,
//! digits and underscores. The first segment names a results-map entry;
//! later segments walk record fields, object keys and array indices.
//!
//! Two substitution modes:
//! - a string that is exactly one placeholder resolves to the referenced
//!   value with its native type preserved
//! - a placeholder embedded among other characters substitutes the
//!   value's canonical text form; the result stays a string
//!
//! An unresolvable placeholder keeps its literal text. Task parameter
//! resolution is additionally scoped to the task's transitive
//! dependencies: a task never observes a sibling it does not depend on,
//! no matter how the frontier races.

use std::sync::LazyLock;

use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Map, Value};
use smallvec::SmallVec;
use std::sync::Arc;

use crate::store::DataStore;

/// Pre-compiled pattern for `${name}` / `${name.field.sub}` tokens
static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)*)\}").unwrap());

/// Names a resolution pass may read from the results map
///
/// `Everything` is for the output node, which runs after the frontier
/// drains and sees every completed task.
#[derive(Clone, Copy)]
enum Scope<'a> {
    Everything,
    Only(&'a FxHashSet<Arc<str>>),
}

impl Scope<'_> {
    fn permits(&self, name: &str) -> bool {
        match self {
            Scope::Everything => true,
            Scope::Only(visible) => visible.contains(name),
        }
    }
}

/// Resolve every placeholder inside a value tree
///
/// Containers recurse preserving kind and key/element order; scalars
/// other than strings pass through unchanged.
pub fn resolve_value(value: &Value, store: &DataStore) -> Value {
    resolve_value_with(value, store, Scope::Everything)
}

/// Resolve one string value against the full results map
pub fn resolve_str(template: &str, store: &DataStore) -> Value {
    resolve_str_with(template, store, Scope::Everything)
}

/// Resolve a task's parameter templates into a flat parameter bag
///
/// `visible` is the task's transitive dependency set (plus the input
/// node); anything outside it resolves as a miss.
pub fn resolve_params(
    vars: &Map<String, Value>,
    store: &DataStore,
    visible: &FxHashSet<Arc<str>>,
) -> FxHashMap<String, Value> {
    vars.iter()
        .map(|(k, v)| (k.clone(), resolve_value_with(v, store, Scope::Only(visible))))
        .collect()
}

fn resolve_value_with(value: &Value, store: &DataStore, scope: Scope<'_>) -> Value {
    match value {
        Value::String(s) => resolve_str_with(s, store, scope),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| resolve_value_with(v, store, scope))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value_with(v, store, scope)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn resolve_str_with(template: &str, store: &DataStore, scope: Scope<'_>) -> Value {
    // Fast path: nothing that can be a placeholder
    if !template.contains("${") {
        return Value::String(template.to_string());
    }

    // A string that is exactly `${PATH}` keeps the referenced value's
    // native type (number, list, map, bool, null)
    if let Some(caps) = PLACEHOLDER_RE.captures(template) {
        let m = caps.get(0).expect("capture 0 always present");
        if m.start() == 0 && m.end() == template.len() {
            return match lookup_path(&caps[1], store, scope) {
                Some(value) => value,
                None => Value::String(template.to_string()),
            };
        }
    }

    // Embedded placeholders: substitute the canonical text form of each
    let mut result = String::with_capacity(template.len() + 32);
    let mut last_end = 0;
    for caps in PLACEHOLDER_RE.captures_iter(template) {
        let m = caps.get(0).expect("capture 0 always present");
        result.push_str(&template[last_end..m.start()]);
        match lookup_path(&caps[1], store, scope) {
            Some(value) => result.push_str(&value_to_string(&value)),
            None => result.push_str(m.as_str()),
        }
        last_end = m.end();
    }
    result.push_str(&template[last_end..]);

    Value::String(result)
}

/// Look up a dot path against the results map
///
/// A bare `${task}` yields the task's `output` by convention.
fn lookup_path(path: &str, store: &DataStore, scope: Scope<'_>) -> Option<Value> {
    let mut parts = path.split('.');
    let name = parts.next()?;
    if !scope.permits(name) {
        return None;
    }
    let segments: SmallVec<[&str; 8]> = parts.collect();
    store.resolve_segments(name, &segments)
}

/// Canonical text form used for embedded substitution
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // Containers substitute as compact JSON
        other => other.to_string(),
    }
}

/// Extract every placeholder path in a template string
///
/// Example: `"x ${a.output} y ${b}"` → `["a.output", "b"]`.
pub fn extract_refs(template: &str) -> Vec<String> {
    PLACEHOLDER_RE
        .captures_iter(template)
        .map(|cap| cap[1].to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_with(entries: &[(&str, Value)]) -> DataStore {
        let store = DataStore::new();
        for (name, output) in entries {
            store.seed(Arc::from(*name), output.clone());
        }
        store
    }

    fn visible(names: &[&str]) -> FxHashSet<Arc<str>> {
        names.iter().map(|n| Arc::from(*n)).collect()
    }

    #[test]
    fn exact_placeholder_keeps_native_type() {
        let store = store_with(&[("a", json!(42)), ("b", json!([1, 2])), ("c", json!(true))]);

        assert_eq!(resolve_str("${a.output}", &store), json!(42));
        assert_eq!(resolve_str("${b.output}", &store), json!([1, 2]));
        assert_eq!(resolve_str("${c.output}", &store), json!(true));
    }

    #[test]
    fn bare_task_name_yields_output() {
        let store = store_with(&[("a", json!({"k": 1}))]);
        assert_eq!(resolve_str("${a}", &store), json!({"k": 1}));
    }

    #[test]
    fn embedded_placeholder_stringifies() {
        let store = store_with(&[("price", json!(89)), ("city", json!("Paris"))]);

        assert_eq!(
            resolve_str("Fly to ${city.output} for $${price.output}", &store),
            json!("Fly to Paris for $89")
        );
    }

    #[test]
    fn embedded_containers_render_compact_json() {
        let store = store_with(&[("data", json!({"x": 1}))]);
        assert_eq!(
            resolve_str("got ${data.output}!", &store),
            json!(r#"got {"x":1}!"#)
        );
    }

    #[test]
    fn nested_field_traversal() {
        let store = store_with(&[("flight", json!({"cheapest": {"price": 89}}))]);
        assert_eq!(resolve_str("${flight.cheapest.price}", &store), json!(89));
        assert_eq!(
            resolve_str("${flight.output.cheapest.price}", &store),
            json!(89)
        );
    }

    #[test]
    fn array_index_traversal() {
        let store = store_with(&[("list", json!({"items": ["a", "b", "c"]}))]);
        assert_eq!(resolve_str("${list.items.1}", &store), json!("b"));
    }

    #[test]
    fn record_fields_are_addressable() {
        let store = store_with(&[("a", json!("done"))]);
        assert_eq!(resolve_str("${a.status}", &store), json!("success"));
        assert_eq!(resolve_str("${a.attempts}", &store), json!(0));
    }

    #[test]
    fn missing_task_keeps_literal() {
        let store = store_with(&[]);
        assert_eq!(
            resolve_str("${ghost.output}", &store),
            json!("${ghost.output}")
        );
        assert_eq!(
            resolve_str("see ${ghost.output} here", &store),
            json!("see ${ghost.output} here")
        );
    }

    #[test]
    fn missing_field_keeps_literal() {
        let store = store_with(&[("a", json!({"x": 1}))]);
        assert_eq!(resolve_str("${a.y}", &store), json!("${a.y}"));
    }

    #[test]
    fn scalar_traversal_keeps_literal() {
        let store = store_with(&[("a", json!("plain text"))]);
        assert_eq!(
            resolve_str("${a.output.field}", &store),
            json!("${a.output.field}")
        );
    }

    #[test]
    fn container_recursion_preserves_shape() {
        let store = store_with(&[("a", json!(7))]);
        let template = json!({
            "n": "${a.output}",
            "list": ["${a.output}", "keep"],
            "nested": {"deep": "${a.output} units"}
        });

        let resolved = resolve_value(&template, &store);
        assert_eq!(
            resolved,
            json!({
                "n": 7,
                "list": [7, "keep"],
                "nested": {"deep": "7 units"}
            })
        );
    }

    #[test]
    fn resolution_is_idempotent() {
        let store = store_with(&[("a", json!({"text": "final"})), ("n", json!(3))]);
        let template = json!({
            "whole": "${a.output}",
            "partial": "count=${n.output}",
            "miss": "${ghost.output}"
        });

        let once = resolve_value(&template, &store);
        let twice = resolve_value(&once, &store);
        assert_eq!(once, twice);
    }

    #[test]
    fn null_and_bool_stringify_canonically() {
        let store = store_with(&[("a", json!(null)), ("b", json!(false))]);
        assert_eq!(resolve_str("v=${a.output}", &store), json!("v=null"));
        assert_eq!(resolve_str("v=${b.output}", &store), json!("v=false"));
        // Exact match keeps native null
        assert_eq!(resolve_str("${a.output}", &store), Value::Null);
    }

    #[test]
    fn resolve_params_flattens_map() {
        let store = store_with(&[("input", json!({"x": 2}))]);
        let mut vars = Map::new();
        vars.insert("n".to_string(), json!("${input.x}"));
        vars.insert("label".to_string(), json!("double of ${input.x}"));

        let params = resolve_params(&vars, &store, &visible(&["input"]));
        assert_eq!(params["n"], json!(2));
        assert_eq!(params["label"], json!("double of 2"));
    }

    #[test]
    fn params_outside_the_scope_resolve_as_misses() {
        // `sibling` is present and successful, but not in the visible
        // set - exactly the undeclared-dependency situation
        let store = store_with(&[("dep", json!(1)), ("sibling", json!(2))]);
        let mut vars = Map::new();
        vars.insert("ok".to_string(), json!("${dep.output}"));
        vars.insert("blocked".to_string(), json!("${sibling.output}"));

        let params = resolve_params(&vars, &store, &visible(&["dep"]));
        assert_eq!(params["ok"], json!(1));
        assert_eq!(params["blocked"], json!("${sibling.output}"));
    }

    #[test]
    fn extract_refs_lists_paths() {
        let refs = extract_refs("a ${x.output} b ${y.f.g} ${x}");
        assert_eq!(refs, vec!["x.output", "y.f.g", "x"]);
        assert!(extract_refs("no refs").is_empty());
    }

    #[test]
    fn malformed_tokens_left_alone() {
        let store = store_with(&[("a", json!(1))]);
        assert_eq!(resolve_str("${a..b}", &store), json!("${a..b}"));
        assert_eq!(resolve_str("${}", &store), json!("${}"));
        assert_eq!(resolve_str("$a.output", &store), json!("$a.output"));
        assert_eq!(resolve_str("${unclosed", &store), json!("${unclosed"));
    }
}
