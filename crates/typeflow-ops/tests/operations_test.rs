use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use typeflow_core::{
    EventBus, ExecutionEvent, JobId, Operation, OperationContext, OperationError, OperationEvent,
    OperationInput, RegistryError, Value,
};
use typeflow_ops::standard_registry;
use typeflow_runtime::{FlowRuntime, OperationRegistry, RuntimeConfig};

// Helper function to create a test context wired to a bus
fn create_test_context(event_bus: &EventBus, operation_id: &str) -> OperationContext {
    let mut ctx = OperationContext::detached(operation_id);
    ctx.events = event_bus.create_emitter(JobId::new_v4(), operation_id.to_string());
    ctx
}

fn registry() -> OperationRegistry {
    standard_registry().expect("standard operations register cleanly")
}

fn create(discriminant: &str, fields: serde_json::Value) -> Arc<dyn Operation> {
    registry().create(discriminant, fields).unwrap()
}

async fn perform(
    op: &Arc<dyn Operation>,
    input: OperationInput,
) -> Result<BTreeMap<String, Value>, OperationError> {
    let bus = EventBus::new(16);
    let ctx = create_test_context(&bus, op.id());
    op.perform(input, &ctx).await.map(|output| output.into_outputs())
}

#[tokio::test]
async fn test_arithmetic_kinds() {
    let cases = [
        ("Add", 5.0),
        ("Subtract", -1.0),
        ("Multiply", 6.0),
        ("Divide", 2.0 / 3.0),
        ("Exponentiate", 8.0),
    ];

    for (kind, expected) in cases {
        let op = create("arithmetic", json!({"id": "a", "kind": kind}));
        let outputs = perform(
            &op,
            OperationInput::new()
                .with_input("Input1", 2.0)
                .with_input("Input2", 3.0),
        )
        .await
        .unwrap();

        assert_eq!(outputs["Output"], Value::Number(expected), "kind {}", kind);
    }
}

#[tokio::test]
async fn test_arithmetic_rejects_unknown_kind() {
    let err = registry()
        .create("arithmetic", json!({"id": "a", "kind": "Modulo"}))
        .err().expect("expected create to fail");

    assert!(matches!(
        err,
        RegistryError::InvalidFields { discriminant, .. } if discriminant == "arithmetic"
    ));
}

#[tokio::test]
async fn test_offset_adds_amount() {
    let op = create("offset", json!({"id": "o", "amount": 2.5}));

    let outputs = perform(&op, OperationInput::new().with_input("Input", 1.0))
        .await
        .unwrap();

    assert_eq!(outputs["Output"], Value::Number(3.5));
    assert_eq!(op.config()["amount"], json!(2.5));
}

#[tokio::test]
async fn test_text_replace_literal_and_pattern() {
    let literal = create(
        "textReplace",
        json!({"id": "t", "pattern": "a.b", "replacement": "-"}),
    );
    let outputs = perform(&literal, OperationInput::new().with_input("Input", "a.b axb a.b"))
        .await
        .unwrap();
    assert_eq!(outputs["Output"], Value::from("- axb -"));

    let pattern = create(
        "textReplace",
        json!({"id": "t", "pattern": "/(\\w+)@(\\w+)/", "replacement": "$2 at $1"}),
    );
    let outputs = perform(&pattern, OperationInput::new().with_input("Input", "me@home"))
        .await
        .unwrap();
    assert_eq!(outputs["Output"], Value::from("home at me"));
}

#[tokio::test]
async fn test_text_replace_requires_pattern() {
    let err = registry()
        .create("textReplace", json!({"id": "t"}))
        .err().expect("expected create to fail");

    assert!(matches!(err, RegistryError::InvalidFields { .. }));
}

#[tokio::test]
async fn test_json_parse_and_stringify() {
    let parse = create("jsonParse", json!({"id": "p"}));
    let outputs = perform(&parse, OperationInput::new().with_input("Input", r#"{"a": [1, 2]}"#))
        .await
        .unwrap();
    assert_eq!(outputs["Output"], Value::Json(json!({"a": [1, 2]})));

    let err = perform(&parse, OperationInput::new().with_input("Input", "{nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, OperationError::ExecutionFailed(_)));

    let stringify = create("jsonStringify", json!({"id": "s"}));
    let outputs = perform(
        &stringify,
        OperationInput::new().with_input("Input", Value::Array(vec![Value::Integer(1), Value::from("x")])),
    )
    .await
    .unwrap();
    assert_eq!(outputs["Output"], Value::from(r#"[1,"x"]"#));
}

#[tokio::test]
async fn test_delay_passes_value_through() {
    let op = create("delay", json!({"id": "d", "milliseconds": 5}));

    let outputs = perform(&op, OperationInput::new().with_input("Value", "kept"))
        .await
        .unwrap();

    assert_eq!(outputs["Value"], Value::from("kept"));
}

#[tokio::test]
async fn test_delay_honours_cancellation() {
    let op = create("delay", json!({"id": "d", "milliseconds": 60_000}));
    let bus = EventBus::new(16);
    let ctx = create_test_context(&bus, "d");
    let token = ctx.cancellation.clone();
    let finished = Arc::new(AtomicBool::new(false));

    let handle = {
        let finished = finished.clone();
        tokio::spawn(async move {
            let result = op
                .perform(OperationInput::new().with_input("Value", 1i64), &ctx)
                .await;
            finished.store(true, Ordering::SeqCst);
            result
        })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!finished.load(Ordering::SeqCst));
    token.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("delay should stop when cancelled")
        .unwrap();
    assert!(matches!(result, Err(OperationError::Cancelled)));
}

#[tokio::test]
async fn test_debug_emits_value_event() {
    let op = create("debug", json!({"id": "dbg"}));
    let bus = EventBus::new(16);
    let mut events = bus.subscribe();
    let ctx = create_test_context(&bus, "dbg");

    let outputs = op
        .perform(OperationInput::new().with_input("Value", 42i64), &ctx)
        .await
        .unwrap()
        .into_outputs();
    assert_eq!(outputs["Value"], Value::Integer(42));

    match events.try_recv().unwrap() {
        ExecutionEvent::OperationEvent {
            operation_id,
            event: OperationEvent::Info { message },
            ..
        } => {
            assert_eq!(operation_id, "dbg");
            assert!(message.contains("42"), "message was {}", message);
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_catalogue_is_listed_with_metadata() {
    let registry = registry();

    for discriminant in [
        "arithmetic",
        "offset",
        "textReplace",
        "jsonParse",
        "jsonStringify",
        "delay",
        "debug",
        "workflowInput",
        "workflowOutput",
    ] {
        assert!(registry.contains(discriminant), "{} should be registered", discriminant);
    }
    assert_eq!(
        registry.metadata("arithmetic").map(|m| m.category),
        Some("arithmetic".to_string())
    );
}

#[tokio::test]
async fn test_register_all_twice_is_rejected() {
    let mut registry = registry();

    let err = typeflow_ops::register_all(&mut registry).unwrap_err();

    assert!(matches!(
        err,
        RegistryError::DuplicateDiscriminant { discriminant, .. } if discriminant == "arithmetic"
    ));
}

#[tokio::test]
async fn test_document_workflow_with_standard_operations() {
    let runtime = FlowRuntime::with_registry(Arc::new(registry()), RuntimeConfig::default());
    let graph = runtime
        .load_json(
            r#"{
                "operations": [
                    { "id": "x", "discriminant": "workflowInput", "name": "x", "type": "string" },
                    { "id": "y", "discriminant": "workflowInput", "name": "y", "type": "integer" },
                    { "id": "shift", "discriminant": "offset", "amount": 2 },
                    { "id": "times", "discriminant": "arithmetic", "kind": "Multiply" },
                    { "id": "out", "discriminant": "workflowOutput", "name": "product", "type": "integer" }
                ],
                "connections": [
                    { "source": { "operation": "x", "field": "Value" },
                      "target": { "operation": "shift", "field": "Input" } },
                    { "source": { "operation": "shift", "field": "Output" },
                      "target": { "operation": "times", "field": "Input1" } },
                    { "source": { "operation": "y", "field": "Value" },
                      "target": { "operation": "times", "field": "Input2" } },
                    { "source": { "operation": "times", "field": "Output" },
                      "target": { "operation": "out", "field": "Value" } }
                ]
            }"#,
        )
        .unwrap();

    let outputs = runtime
        .execute(
            &graph,
            BTreeMap::from([
                ("x".to_string(), Value::from("3")),
                ("y".to_string(), Value::Integer(4)),
            ]),
        )
        .await
        .unwrap();

    assert_eq!(outputs["product"], Value::Integer(20));
}

#[tokio::test]
async fn test_multiplexed_offset_over_a_list() {
    let runtime = FlowRuntime::with_registry(Arc::new(registry()), RuntimeConfig::default());
    let graph = runtime
        .load_json(
            r#"{
                "operations": [
                    { "id": "xs", "discriminant": "workflowInput", "name": "xs", "type": { "array": "number" } },
                    { "id": "shift", "discriminant": "offset", "amount": 10 },
                    { "id": "out", "discriminant": "workflowOutput", "name": "ys", "type": { "array": "number" } }
                ],
                "connections": [
                    { "source": { "operation": "xs", "field": "Value" },
                      "target": { "operation": "shift", "field": "Input" },
                      "multiplex": true },
                    { "source": { "operation": "shift", "field": "Output" },
                      "target": { "operation": "out", "field": "Value" } }
                ]
            }"#,
        )
        .unwrap();

    let outputs = runtime
        .execute(
            &graph,
            BTreeMap::from([(
                "xs".to_string(),
                Value::Array(vec![Value::Number(1.0), Value::Number(2.0)]),
            )]),
        )
        .await
        .unwrap();

    assert_eq!(
        outputs["ys"],
        Value::Array(vec![Value::Number(11.0), Value::Number(12.0)])
    );
}
