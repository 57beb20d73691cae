//! Built-in function library
//!
//! Installed into every engine's registry at construction. Functions
//! take a flat parameter map and return a JSON value; anything beyond
//! that contract (which keys, which types) is between the workflow
//! author and the function.
//!
//! - text and data helpers: `text_process`, `calculate`,
//!   `string_to_json`, `json_to_string`, `data_merge`,
//!   `combine_outputs`, `data_flow_transform`
//! - parameter routing: `smart_parameter_pass`
//! - network: `http_request` plus the `http_request_get` /
//!   `http_request_post_json` shorthands
//! - LLM calls: `llm_api_call`, `llm_simple_call`, `llm_chat_call`
//!   (see `llm`)

mod llm;

pub use llm::{
    ChatMessage, ChatRequest, LlmClient, ModelCatalog, ModelConfig, Platform, DEFAULT_MODEL,
};

use std::sync::LazyLock;

use rustc_hash::FxHashSet;
use serde_json::{json, Map, Value};

use crate::config::{CONNECT_TIMEOUT, HTTP_TIMEOUT, REDIRECT_LIMIT};
use crate::error::WeftError;
use crate::registry::{FunctionRegistry, ParamMap};

/// Shared connection pool for the plain HTTP builtin
static HTTP: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(REDIRECT_LIMIT))
        .user_agent(concat!("weft/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("failed to build HTTP client")
});

/// Shared LLM client with the default model catalog
static LLM: LazyLock<LlmClient> = LazyLock::new(LlmClient::default);

/// Register every built-in function
pub fn install_builtins(registry: &FunctionRegistry) {
    registry.register("text_process", text_process);
    registry.register("calculate", calculate);
    registry.register("string_to_json", string_to_json);
    registry.register("json_to_string", json_to_string);
    registry.register("data_merge", data_merge);
    registry.register("combine_outputs", combine_outputs);
    registry.register("data_flow_transform", data_flow_transform);
    registry.register("http_request", http_request);
    registry.register("http_request_get", http_request_get);
    registry.register("http_request_post_json", http_request_post_json);
    registry.register("llm_api_call", llm_api_call);
    registry.register("llm_simple_call", llm_simple_call);
    registry.register("llm_chat_call", llm_chat_call);

    // Dispatches to other registered functions, so it keeps a handle to
    // the same table it lives in
    let table = registry.clone();
    registry.register("smart_parameter_pass", move |params| {
        smart_parameter_pass(table.clone(), params)
    });
}

// ═══════════════════════════════════════════════════════════════
// Parameter helpers
// ═══════════════════════════════════════════════════════════════

fn required_str(params: &ParamMap, func: &str, key: &str) -> Result<String, WeftError> {
    match params.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Ok(value_as_text(other)),
        None => Err(WeftError::MissingParameter {
            func: func.to_string(),
            param: key.to_string(),
        }),
    }
}

fn optional_str(params: &ParamMap, key: &str) -> Option<String> {
    params.get(key).map(value_as_text).filter(|s| !s.is_empty())
}

/// Canonical text form: strings verbatim, containers as compact JSON
fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════
// Text and data helpers
// ═══════════════════════════════════════════════════════════════

/// `{text, operation}` → upper / lower / reverse
async fn text_process(params: ParamMap) -> Result<Value, WeftError> {
    let text = required_str(&params, "text_process", "text")?;
    let operation = optional_str(&params, "operation").unwrap_or_else(|| "upper".to_string());

    let result = match operation.as_str() {
        "upper" => text.to_uppercase(),
        "lower" => text.to_lowercase(),
        "reverse" => text.chars().rev().collect(),
        _ => text,
    };
    Ok(Value::String(result))
}

/// `{expression}` → evaluated arithmetic result
async fn calculate(params: ParamMap) -> Result<Value, WeftError> {
    let expression = required_str(&params, "calculate", "expression")?;
    let result = eval_expression(&expression)?;

    // Keep whole results integral, like a hand calculator would
    if result.is_finite() && result.fract() == 0.0 && result.abs() < 9e15 {
        Ok(json!(result as i64))
    } else {
        Ok(json!(result))
    }
}

/// `{text}` → parsed JSON value
async fn string_to_json(params: ParamMap) -> Result<Value, WeftError> {
    let text = required_str(&params, "string_to_json", "text")?;
    serde_json::from_str(&text).map_err(|e| WeftError::BadParameter {
        func: "string_to_json".to_string(),
        param: "text".to_string(),
        reason: e.to_string(),
    })
}

/// `{value}` → pretty-printed JSON text
async fn json_to_string(params: ParamMap) -> Result<Value, WeftError> {
    let value = params
        .get("value")
        .ok_or_else(|| WeftError::MissingParameter {
            func: "json_to_string".to_string(),
            param: "value".to_string(),
        })?;
    Ok(Value::String(serde_json::to_string_pretty(value)?))
}

/// Merge every parameter into one object
async fn data_merge(params: ParamMap) -> Result<Value, WeftError> {
    let mut merged_data = Map::new();
    for (key, value) in &params {
        merged_data.insert(key.clone(), value.clone());
    }
    let total_count = merged_data.len();
    Ok(json!({ "merged_data": merged_data, "total_count": total_count }))
}

/// `{inputs: [..], separator?, prefix?, suffix?}` → joined string
///
/// Without `inputs`, every remaining parameter value is joined in key
/// order instead.
async fn combine_outputs(params: ParamMap) -> Result<Value, WeftError> {
    let separator = optional_str(&params, "separator").unwrap_or_else(|| "\n\n".to_string());
    let prefix = optional_str(&params, "prefix").unwrap_or_default();
    let suffix = optional_str(&params, "suffix").unwrap_or_default();

    let pieces: Vec<String> = match params.get("inputs") {
        Some(Value::Array(items)) => items.iter().map(value_as_text).collect(),
        Some(other) => vec![value_as_text(other)],
        None => {
            let mut entries: Vec<(&String, &Value)> = params
                .iter()
                .filter(|(k, _)| !matches!(k.as_str(), "separator" | "prefix" | "suffix"))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            entries.into_iter().map(|(_, v)| value_as_text(v)).collect()
        }
    };

    Ok(Value::String(format!(
        "{prefix}{}{suffix}",
        pieces.join(&separator)
    )))
}

/// `{inputs, transform_rules?}` → transformed data
///
/// Rules apply in order over the current item list:
/// - `{type: extract, field}` pulls one field out of each object
/// - `{type: format, template}` renders each item into `{data}`
/// - `{type: aggregate, method: join|count, separator?}` collapses the
///   list to one value
///
/// Rule kinds that would need a host callable (filter conditions) have
/// no declarative form; unknown kinds pass the data through untouched.
/// A single remaining item is returned bare, several as an array.
async fn data_flow_transform(params: ParamMap) -> Result<Value, WeftError> {
    let mut current: Vec<Value> = match params.get("inputs") {
        Some(Value::Array(items)) => items.clone(),
        Some(other) => vec![other.clone()],
        None => return Ok(json!({})),
    };

    if let Some(Value::Array(rules)) = params.get("transform_rules") {
        for rule in rules {
            match rule.get("type").and_then(Value::as_str).unwrap_or("") {
                "extract" => {
                    if let Some(field) = rule.get("field").and_then(Value::as_str) {
                        current = current
                            .iter()
                            .map(|item| match item {
                                Value::Object(map) => {
                                    map.get(field).cloned().unwrap_or_else(|| item.clone())
                                }
                                other => Value::String(value_as_text(other)),
                            })
                            .collect();
                    }
                }
                "format" => {
                    let template = rule
                        .get("template")
                        .and_then(Value::as_str)
                        .unwrap_or("{data}");
                    current = current
                        .iter()
                        .map(|item| {
                            Value::String(template.replace("{data}", &value_as_text(item)))
                        })
                        .collect();
                }
                "aggregate" => {
                    let method = rule.get("method").and_then(Value::as_str).unwrap_or("join");
                    if method == "count" {
                        current = vec![json!(current.len())];
                    } else {
                        let separator =
                            rule.get("separator").and_then(Value::as_str).unwrap_or("\n");
                        let joined = current
                            .iter()
                            .map(value_as_text)
                            .collect::<Vec<_>>()
                            .join(separator);
                        current = vec![Value::String(joined)];
                    }
                }
                _ => {}
            }
        }
    }

    Ok(if current.len() == 1 {
        current.pop().unwrap_or(Value::Null)
    } else {
        Value::Array(current)
    })
}

// ═══════════════════════════════════════════════════════════════
// Parameter routing
// ═══════════════════════════════════════════════════════════════

/// `{target_function?, parameter_mapping?, context_data?, ..}` →
/// rebuilt parameter bag, optionally fed straight into another function
///
/// `parameter_mapping` renames keys (`{source_key: target_key}`),
/// `context_data` merges in extra values, and any remaining parameter
/// passes through under its own name. When `target_function` names a
/// registered function the rebuilt bag is dispatched to it; otherwise
/// the bag itself is the result.
async fn smart_parameter_pass(
    registry: FunctionRegistry,
    params: ParamMap,
) -> Result<Value, WeftError> {
    const CONTROL_KEYS: [&str; 3] = ["target_function", "parameter_mapping", "context_data"];

    let mut target_params = ParamMap::default();
    let mut renamed: FxHashSet<&str> = FxHashSet::default();

    if let Some(Value::Object(mapping)) = params.get("parameter_mapping") {
        for (source, target) in mapping {
            if let (Some(value), Some(target_key)) = (params.get(source), target.as_str()) {
                target_params.insert(target_key.to_string(), value.clone());
                renamed.insert(source.as_str());
            }
        }
    }

    if let Some(Value::Object(context)) = params.get("context_data") {
        for (key, value) in context {
            target_params.insert(key.clone(), value.clone());
        }
    }

    for (key, value) in &params {
        if CONTROL_KEYS.contains(&key.as_str()) || renamed.contains(key.as_str()) {
            continue;
        }
        target_params
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }

    match optional_str(&params, "target_function") {
        Some(target) if registry.contains(&target) => {
            let func = registry.lookup(&target)?;
            (*func)(target_params).await
        }
        _ => Ok(serde_json::to_value(&target_params)?),
    }
}

// ═══════════════════════════════════════════════════════════════
// Network
// ═══════════════════════════════════════════════════════════════

/// `{url, method?, headers?, body?}` → response text
async fn http_request(params: ParamMap) -> Result<Value, WeftError> {
    let url = required_str(&params, "http_request", "url")?;
    let method = optional_str(&params, "method").unwrap_or_else(|| "GET".to_string());

    let mut builder = match method.to_uppercase().as_str() {
        "POST" => HTTP.post(&url),
        "PUT" => HTTP.put(&url),
        "DELETE" => HTTP.delete(&url),
        _ => HTTP.get(&url),
    };

    if let Some(Value::Object(headers)) = params.get("headers") {
        for (key, value) in headers {
            builder = builder.header(key, value_as_text(value));
        }
    }

    match params.get("body") {
        Some(body @ (Value::Object(_) | Value::Array(_))) => builder = builder.json(body),
        Some(body) => builder = builder.body(value_as_text(body)),
        None => {}
    }

    let response = builder.send().await.map_err(|e| WeftError::HttpError {
        message: e.to_string(),
    })?;

    let status = response.status();
    let text = response.text().await.map_err(|e| WeftError::HttpError {
        message: e.to_string(),
    })?;

    if !status.is_success() {
        return Err(WeftError::HttpError {
            message: format!("{status}: {text}"),
        });
    }
    Ok(Value::String(text))
}

/// GET shorthand over `http_request`
async fn http_request_get(mut params: ParamMap) -> Result<Value, WeftError> {
    params.insert("method".to_string(), json!("GET"));
    http_request(params).await
}

/// POST shorthand over `http_request`; `data` becomes the JSON body
async fn http_request_post_json(mut params: ParamMap) -> Result<Value, WeftError> {
    params.insert("method".to_string(), json!("POST"));
    if let Some(data) = params.remove("data") {
        params.insert("body".to_string(), data);
    }
    http_request(params).await
}

// ═══════════════════════════════════════════════════════════════
// LLM calls
// ═══════════════════════════════════════════════════════════════

fn chat_request_from_params(func: &str, params: &ParamMap) -> Result<ChatRequest, WeftError> {
    let model = optional_str(params, "model").unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let messages = if let Some(raw) = params.get("messages") {
        serde_json::from_value::<Vec<ChatMessage>>(raw.clone()).map_err(|e| {
            WeftError::BadParameter {
                func: func.to_string(),
                param: "messages".to_string(),
                reason: e.to_string(),
            }
        })?
    } else if let Some(prompt) = optional_str(params, "prompt") {
        vec![ChatMessage::user(prompt)]
    } else {
        return Err(WeftError::MissingParameter {
            func: func.to_string(),
            param: "prompt".to_string(),
        });
    };

    Ok(ChatRequest {
        model,
        messages,
        api_key: optional_str(params, "api_key"),
        api_url: optional_str(params, "api_url"),
        max_tokens: params
            .get("max_tokens")
            .and_then(Value::as_u64)
            .map(|n| n as u32),
        temperature: params.get("temperature").and_then(Value::as_f64),
    })
}

/// `{prompt|messages, model?, api_key?, api_url?, ...}` → completion text
async fn llm_api_call(params: ParamMap) -> Result<Value, WeftError> {
    let request = chat_request_from_params("llm_api_call", &params)?;
    let text = LLM.chat(request).await?;
    Ok(Value::String(text))
}

/// One-line LLM call with an offline fallback
///
/// For platforms that need an API key, a missing or placeholder key
/// yields a canned reply instead of a doomed network call.
async fn llm_simple_call(params: ParamMap) -> Result<Value, WeftError> {
    let input = optional_str(&params, "input")
        .or_else(|| optional_str(&params, "prompt"))
        .ok_or_else(|| WeftError::MissingParameter {
            func: "llm_simple_call".to_string(),
            param: "input".to_string(),
        })?;
    let model = optional_str(&params, "model").unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let api_key = optional_str(&params, "api_key");

    let config = LLM.catalog().get(&model);
    let key_is_placeholder = matches!(
        api_key.as_deref(),
        None | Some("your-api-key") | Some("demo-key")
    );
    if config.platform.requires_api_key() && key_is_placeholder {
        return Ok(Value::String(format!(
            "AI reply: understood input '{input}' (offline response; provide a real api_key)"
        )));
    }

    let request = ChatRequest {
        model,
        messages: vec![ChatMessage::user(input)],
        api_key,
        api_url: optional_str(&params, "api_url"),
        max_tokens: Some(500),
        temperature: Some(0.7),
    };
    Ok(Value::String(LLM.chat(request).await?))
}

/// `{messages, system_prompt?, model?, api_key?, ...}` → multi-turn chat
///
/// Like `llm_api_call` but prepends an optional system message to the
/// conversation.
async fn llm_chat_call(params: ParamMap) -> Result<Value, WeftError> {
    let mut request = chat_request_from_params("llm_chat_call", &params)?;
    if let Some(system) = optional_str(&params, "system_prompt") {
        request.messages.insert(0, ChatMessage::system(system));
    }
    Ok(Value::String(LLM.chat(request).await?))
}

// ═══════════════════════════════════════════════════════════════
// Arithmetic expression evaluator
// ═══════════════════════════════════════════════════════════════

/// Evaluate `+ - * / % ^` with parentheses and unary signs
///
/// Precedence (low to high): add/sub, mul/div/mod, unary sign, power.
/// Power is right-associative: `2^3^2 = 512`.
pub fn eval_expression(expression: &str) -> Result<f64, WeftError> {
    let mut parser = ExprParser {
        src: expression.as_bytes(),
        pos: 0,
    };
    let value = parser.expr().map_err(|reason| WeftError::InvalidExpression {
        expression: expression.to_string(),
        reason,
    })?;
    parser.skip_ws();
    if parser.pos != parser.src.len() {
        return Err(WeftError::InvalidExpression {
            expression: expression.to_string(),
            reason: format!("unexpected input at position {}", parser.pos),
        });
    }
    Ok(value)
}

struct ExprParser<'a> {
    src: &'a [u8],
    pos: usize,
}

impl ExprParser<'_> {
    fn skip_ws(&mut self) {
        while self.src.get(self.pos) == Some(&b' ') {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.src.get(self.pos).copied()
    }

    fn expr(&mut self) -> Result<f64, String> {
        let mut value = self.term()?;
        while let Some(op @ (b'+' | b'-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == b'+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, String> {
        let mut value = self.unary()?;
        while let Some(op @ (b'*' | b'/' | b'%')) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            match op {
                b'*' => value *= rhs,
                _ => {
                    if rhs == 0.0 {
                        return Err("division by zero".to_string());
                    }
                    value = if op == b'/' { value / rhs } else { value % rhs };
                }
            }
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some(b'-') => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some(b'+') => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, String> {
        let base = self.primary()?;
        if self.peek() == Some(b'^') {
            self.pos += 1;
            // Right-associative, and the exponent may carry a sign
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let value = self.expr()?;
                if self.peek() != Some(b')') {
                    return Err("missing closing parenthesis".to_string());
                }
                self.pos += 1;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => {
                let start = self.pos;
                while self
                    .src
                    .get(self.pos)
                    .is_some_and(|c| c.is_ascii_digit() || *c == b'.')
                {
                    self.pos += 1;
                }
                std::str::from_utf8(&self.src[start..self.pos])
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| "invalid number".to_string())
            }
            Some(c) => Err(format!("unexpected character '{}'", c as char)),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}
