//! Engine façade and built-in library, end to end

use serde_json::{json, Map, Value};
use weft::{Engine, ParamMap, TaskState, WeftError};

const PIPELINE_YAML: &str = r#"
metadata:
  name: shouty_math
  version: "1.0"
  description: uppercases a question and does some arithmetic
input:
  type: start
  name: input
  data:
    question: "what is six times seven?"
    expression: "6*7"
executors:
  - name: shout
    func: text_process
    custom_vars:
      text: "${input.question}"
      operation: upper
    depends_on: [input]
  - name: arithmetic
    func: calculate
    custom_vars:
      expression: "${input.expression}"
    depends_on: [input]
  - name: summary
    func: combine_outputs
    custom_vars:
      inputs: ["${shout.output}", "answer: ${arithmetic.output}"]
      separator: " | "
    depends_on: [shout, arithmetic]
output:
  type: end
  name: out
  data:
    summary: "${summary.output}"
    answer: "${arithmetic.output}"
"#;

#[tokio::test]
async fn builtin_pipeline_runs_from_the_engine() {
    let engine = Engine::new();
    let name = engine.load_yaml(PIPELINE_YAML).unwrap();
    assert_eq!(name, "shouty_math");

    let outcome = engine.run(&name, None).await.unwrap();
    assert!(outcome.all_succeeded());
    assert_eq!(outcome.output["answer"], json!(42));
    assert_eq!(
        outcome.output["summary"],
        json!("WHAT IS SIX TIMES SEVEN? | answer: 42")
    );
}

#[tokio::test]
async fn overrides_change_one_input_key() {
    let engine = Engine::new();
    engine.load_yaml(PIPELINE_YAML).unwrap();

    let mut overrides = Map::new();
    overrides.insert("expression".to_string(), json!("2^8"));
    let outcome = engine.run("shouty_math", Some(overrides)).await.unwrap();

    assert_eq!(outcome.output["answer"], json!(256));
    // Untouched keys keep their declared values
    assert!(outcome.output["summary"]
        .as_str()
        .unwrap()
        .contains("WHAT IS SIX TIMES SEVEN?"));
}

#[tokio::test]
async fn custom_functions_mix_with_builtins() {
    let engine = Engine::new();
    engine.register_function("triple", |params: ParamMap| async move {
        let n = params.get("n").and_then(Value::as_i64).unwrap_or(0);
        Ok(json!(n * 3))
    });

    engine
        .load_yaml(
            r#"
metadata: { name: mixed }
input: { type: start, name: input, data: { x: 5 } }
executors:
  - name: tripled
    func: triple
    custom_vars: { n: "${input.x}" }
    depends_on: [input]
  - name: merged
    func: data_merge
    custom_vars:
      tripled: "${tripled.output}"
      original: "${input.x}"
    depends_on: [tripled]
output: { type: end, name: out, data: { r: "${merged.output}" } }
"#,
        )
        .unwrap();

    let outcome = engine.run("mixed", None).await.unwrap();
    assert_eq!(outcome.output["r"]["merged_data"]["tripled"], json!(15));
    assert_eq!(outcome.output["r"]["merged_data"]["original"], json!(5));
    assert_eq!(outcome.output["r"]["total_count"], json!(2));
}

#[tokio::test]
async fn run_reports_unknown_function_before_dispatch() {
    let engine = Engine::new();
    engine
        .load_yaml(
            r#"
metadata: { name: broken }
input: { type: start, name: input, data: {} }
executors:
  - name: a
    func: not_a_builtin
output: { type: end, name: out, data: {} }
"#,
        )
        .unwrap();

    let err = engine.run("broken", None).await.unwrap_err();
    assert!(matches!(err, WeftError::UnknownFunction { func, .. } if func == "not_a_builtin"));
}

#[tokio::test]
async fn offline_llm_call_through_a_workflow() {
    let engine = Engine::new();
    engine
        .load_yaml(
            r#"
metadata: { name: offline_llm }
input: { type: start, name: input, data: { q: "hello there" } }
executors:
  - name: ask
    func: llm_simple_call
    custom_vars:
      input: "${input.q}"
      model: gpt-4o
      api_key: demo-key
    depends_on: [input]
output: { type: end, name: out, data: { reply: "${ask.output}" } }
"#,
        )
        .unwrap();

    let outcome = engine.run("offline_llm", None).await.unwrap();
    assert_eq!(outcome.tasks["ask"].state, TaskState::Success);
    let reply = outcome.output["reply"].as_str().unwrap();
    assert!(reply.contains("hello there"));
    assert!(reply.contains("offline response"));
}

#[tokio::test]
async fn workflow_table_round_trip() {
    let engine = Engine::new();
    assert!(engine.list_workflows().is_empty());

    engine.load_yaml(PIPELINE_YAML).unwrap();
    assert_eq!(engine.list_workflows(), vec!["shouty_math"]);

    let workflow = engine.get("shouty_math").unwrap();
    let outline = workflow.describe();
    assert_eq!(outline.nodes.len(), 5); // input + 3 tasks + output
    assert_eq!(outline.edges.len(), 4);
    assert_eq!(outline.description, "uppercases a question and does some arithmetic");
}
