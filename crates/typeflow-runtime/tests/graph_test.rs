mod common;

use common::*;
use std::sync::Arc;
use typeflow_core::{GraphDefinitionError, Operation, TypeResolver, ValueType};
use typeflow_runtime::WorkflowGraph;

#[test]
fn test_cycle_is_rejected() {
    let result = WorkflowGraph::new(
        vec![
            op(TestOp::add_one("a")),
            op(TestOp::add_one("b")),
            op(TestOp::add_one("c")),
        ],
        vec![
            connect("a", "Output", "b", "Input"),
            connect("b", "Output", "c", "Input"),
            connect("c", "Output", "a", "Input"),
        ],
    );

    assert_eq!(
        result.unwrap_err(),
        GraphDefinitionError::Cycle {
            operations: vec!["a".to_string(), "b".to_string(), "c".to_string()],
        }
    );
}

#[test]
fn test_self_loop_is_rejected() {
    let result = WorkflowGraph::new(
        vec![op(TestOp::add_one("a"))],
        vec![connect("a", "Output", "a", "Input")],
    );

    assert!(matches!(
        result,
        Err(GraphDefinitionError::Cycle { operations }) if operations == vec!["a".to_string()]
    ));
}

#[test]
fn test_cycle_is_named_without_unrelated_operations() {
    let result = WorkflowGraph::new(
        vec![
            input("in", "x", ValueType::Number),
            op(TestOp::add_one("a")),
            op(TestOp::add_one("b").input("Extra", ValueType::Number)),
        ],
        vec![
            connect("in", "Value", "b", "Extra"),
            connect("a", "Output", "b", "Input"),
            connect("b", "Output", "a", "Input"),
        ],
    );

    match result {
        Err(GraphDefinitionError::Cycle { operations }) => {
            assert_eq!(operations, vec!["a".to_string(), "b".to_string()]);
        }
        other => panic!("expected a cycle error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_string_to_number_needs_a_rule() {
    let operations = vec![
        input("in", "text", ValueType::String),
        op(TestOp::add_one("n")),
    ];
    let connections = vec![connect("in", "Value", "n", "Input")];

    let err = WorkflowGraph::builder()
        .operations(operations.clone())
        .connections(connections.clone())
        .resolver(Arc::new(TypeResolver::empty()))
        .build()
        .unwrap_err();

    match err {
        GraphDefinitionError::IncompatibleTypes {
            source_type,
            target_type,
            connection,
        } => {
            assert_eq!(source_type, ValueType::String);
            assert_eq!(target_type, ValueType::Number);
            assert_eq!(connection, "in.Value -> n.Input");
        }
        other => panic!("unexpected error: {}", other),
    }

    // The default rules parse strings
    assert!(WorkflowGraph::new(operations, connections).is_ok());
}

#[test]
fn test_incompatible_types_with_default_rules() {
    let result = WorkflowGraph::new(
        vec![
            input("in", "bytes", ValueType::Bytes),
            op(TestOp::add_one("n")),
        ],
        vec![connect("in", "Value", "n", "Input")],
    );

    assert!(matches!(
        result,
        Err(GraphDefinitionError::IncompatibleTypes { .. })
    ));
}

#[test]
fn test_two_connections_to_one_field_are_rejected() {
    let result = WorkflowGraph::new(
        vec![
            input("x", "x", ValueType::Number),
            input("y", "y", ValueType::Number),
            op(TestOp::add_one("n")),
        ],
        vec![
            connect("x", "Value", "n", "Input"),
            connect("y", "Value", "n", "Input"),
        ],
    );

    assert_eq!(
        result.unwrap_err(),
        GraphDefinitionError::DuplicateTarget {
            operation: "n".to_string(),
            field: "Input".to_string(),
        }
    );
}

#[test]
fn test_multiplexed_connections_may_share_a_field() {
    let list = ValueType::array(ValueType::Number);
    let result = WorkflowGraph::new(
        vec![
            input("x", "x", list.clone()),
            input("y", "y", list),
            op(TestOp::add_one("n")),
        ],
        vec![
            connect("x", "Value", "n", "Input").multiplexed(),
            connect("y", "Value", "n", "Input").multiplexed(),
        ],
    );

    assert!(result.is_ok());
}

#[test]
fn test_multiplex_requires_an_array_source() {
    let result = WorkflowGraph::new(
        vec![input("x", "x", ValueType::Number), op(TestOp::add_one("n"))],
        vec![connect("x", "Value", "n", "Input").multiplexed()],
    );

    assert!(matches!(
        result,
        Err(GraphDefinitionError::MultiplexRequiresArray { source_type, .. })
            if source_type == ValueType::Number
    ));
}

#[test]
fn test_multiplexed_outputs_become_arrays() {
    let graph = WorkflowGraph::new(
        vec![
            input("x", "xs", ValueType::array(ValueType::Number)),
            op(TestOp::add_one("n")),
            output("out", "ys", ValueType::array(ValueType::Number)),
        ],
        vec![
            connect("x", "Value", "n", "Input").multiplexed(),
            connect("n", "Output", "out", "Value"),
        ],
    )
    .unwrap();

    assert!(graph.is_multiplexed("n"));
    assert_eq!(
        graph.effective_output_type("n", "Output"),
        Some(ValueType::array(ValueType::Number))
    );
}

#[test]
fn test_unknown_references_are_rejected() {
    let operations = || vec![input("1", "foo", ValueType::Integer), output("2", "bar", ValueType::Integer)];

    let err = WorkflowGraph::new(operations(), vec![connect("1", "Value", "3", "Value")]).unwrap_err();
    assert!(matches!(err, GraphDefinitionError::UnknownOperation { operation, .. } if operation == "3"));

    let err = WorkflowGraph::new(operations(), vec![connect("1", "Nope", "2", "Value")]).unwrap_err();
    assert_eq!(
        err,
        GraphDefinitionError::UnknownSourceField {
            operation: "1".to_string(),
            field: "Nope".to_string(),
        }
    );

    let err = WorkflowGraph::new(operations(), vec![connect("1", "Value", "2", "Nope")]).unwrap_err();
    assert_eq!(
        err,
        GraphDefinitionError::UnknownTargetField {
            operation: "2".to_string(),
            field: "Nope".to_string(),
        }
    );
}

#[test]
fn test_duplicate_operation_ids_are_rejected() {
    let err = WorkflowGraph::new(
        vec![op(TestOp::pass("a")), op(TestOp::pass("a"))],
        Vec::new(),
    )
    .unwrap_err();

    assert_eq!(
        err,
        GraphDefinitionError::DuplicateOperation {
            operation: "a".to_string()
        }
    );
}

#[test]
fn test_required_inputs_must_be_connected() {
    let err = WorkflowGraph::new(vec![op(TestOp::add_one("a"))], Vec::new()).unwrap_err();

    assert_eq!(
        err,
        GraphDefinitionError::UnboundInput {
            operation: "a".to_string(),
            field: "Input".to_string(),
        }
    );
}

#[test]
fn test_external_names_must_agree_on_type() {
    let err = WorkflowGraph::new(
        vec![
            input("1", "foo", ValueType::Integer),
            input("2", "foo", ValueType::String),
        ],
        Vec::new(),
    )
    .unwrap_err();

    assert!(matches!(err, GraphDefinitionError::ConflictingExternalField { name, .. } if name == "foo"));

    // Same name and type is a shared input
    let graph = WorkflowGraph::new(
        vec![
            input("1", "foo", ValueType::Integer),
            input("2", "foo", ValueType::Integer),
        ],
        Vec::new(),
    )
    .unwrap();
    assert_eq!(graph.input_shape().len(), 1);
}

#[test]
fn test_execution_order_respects_dependencies_then_declaration() {
    let graph = WorkflowGraph::new(
        vec![
            output("sink", "out", ValueType::Number),
            op(TestOp::add_one("step")),
            input("source", "in", ValueType::Number),
            op(TestOp::pass("loose").input("Unused", ValueType::Any)),
            input("other", "other", ValueType::Any),
        ],
        vec![
            connect("step", "Output", "sink", "Value"),
            connect("source", "Value", "step", "Input"),
            connect("other", "Value", "loose", "Input"),
            connect("other", "Value", "loose", "Unused"),
        ],
    )
    .unwrap();

    assert_eq!(
        graph.execution_order(),
        vec!["source", "step", "sink", "other", "loose"]
    );
    // Stable across calls
    assert_eq!(graph.execution_order(), graph.execution_order());
}

#[test]
fn test_graph_shape_is_union_of_boundary_operations() {
    let graph = WorkflowGraph::new(
        vec![
            input("1", "foo", ValueType::Integer),
            input("3", "baz", ValueType::String),
            output("2", "bar", ValueType::Integer),
        ],
        vec![connect("1", "Value", "2", "Value")],
    )
    .unwrap();

    let inputs: Vec<&str> = graph.input_shape().names().collect();
    assert_eq!(inputs, vec!["foo", "baz"]);
    assert_eq!(
        graph.input_shape().get("foo").map(|f| f.ty.clone()),
        Some(ValueType::Integer)
    );
    let outputs: Vec<&str> = graph.output_shape().names().collect();
    assert_eq!(outputs, vec!["bar"]);
}
