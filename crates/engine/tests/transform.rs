//! Compile parse trees and run them against documents.

use pretty_assertions::assert_eq;
use serde_json::json;
use whistle_compiler::tree::*;
use whistle_compiler::{compile, CompileOptions};
use whistle_engine::{EngineError, EngineOptions, Transformer};
use whistle_ir::{FieldMapping, MappingConfig, ProjectorDefinition, Source, Target, ValueSource};
use whistle_json::Value;

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

fn field(path: &str) -> TargetNode {
    TargetNode::Field {
        span: Span::default(),
        path: Some(Path::dotted(path)),
    }
}

fn var(name: &str) -> TargetNode {
    TargetNode::Var {
        span: Span::default(),
        path: Some(Path::dotted(name)),
    }
}

fn out(name: &str) -> TargetNode {
    TargetNode::Obj {
        span: Span::default(),
        name: name.to_string(),
    }
}

fn mapping(target: TargetNode, expression: Expression) -> Mapping {
    Mapping {
        span: Span::default(),
        target: Some(target),
        condition: None,
        expression: Some(expression),
    }
}

fn item(target: TargetNode, expression: Expression) -> BlockItem {
    BlockItem::Mapping(mapping(target, expression))
}

fn def(name: &str, args: &[&str], items: Vec<BlockItem>) -> RootItem {
    RootItem::ProjectorDef(ProjectorDef {
        span: Span::default(),
        name: Some(name.to_string()),
        args: args.iter().map(|a| a.to_string()).collect(),
        block: Some(Block {
            span: Span::default(),
            items,
        }),
    })
}

fn root_mapping(target: TargetNode, expression: Expression) -> RootItem {
    RootItem::Mapping(mapping(target, expression))
}

/// `$root.a.b`
fn root_input(fields: &[&str]) -> SourceNode {
    SourceNode::Input(InputNode {
        path: Some(Path {
            head: Some(PathHead::RootInput),
            segments: fields.iter().map(|f| PathSegment::Field(f.to_string())).collect(),
            ..Path::default()
        }),
        ..InputNode::default()
    })
}

fn dest(path: &str) -> Expression {
    Expression::Source(SourceNode::Input(InputNode {
        path: Some(Path::dotted(path)),
        dest: true,
        ..InputNode::default()
    }))
}

fn boolean(value: bool) -> SourceNode {
    SourceNode::ConstBool {
        span: Span::default(),
        value,
    }
}

fn program(items: Vec<RootItem>) -> MappingConfig {
    let root = Root {
        items,
        ..Root::default()
    };
    compile(&root, &CompileOptions::default()).unwrap()
}

fn run(config: MappingConfig, input: serde_json::Value) -> Result<Value, EngineError> {
    run_with(config, input, EngineOptions::default())
}

fn run_with(
    config: MappingConfig,
    input: serde_json::Value,
    options: EngineOptions,
) -> Result<Value, EngineError> {
    Transformer::new(config, options)?.transform(&Value::from(input))
}

// ──────────────────────────────────────────────
// Programs
// ──────────────────────────────────────────────

#[test]
fn projector_result_lands_in_top_level_object() {
    // def f(a) { x: a + 1 }  out r: f(5)
    let config = program(vec![
        def(
            "f",
            &["a"],
            vec![item(
                field("x"),
                Expression::binary("+", Expression::input("a"), Expression::num("1")),
            )],
        ),
        root_mapping(out("r"), Expression::call("f", vec![SourceNode::num("5")])),
    ]);
    assert_eq!(
        run(config, json!({})).unwrap(),
        Value::from(json!({"r": [{"x": 6}]}))
    );
}

#[test]
fn root_reads_input_fields_and_vars() {
    // var v: $root.a  total: v + 1  out o: v
    let config = program(vec![
        root_mapping(var("v"), Expression::Source(root_input(&["a"]))),
        root_mapping(
            field("total"),
            Expression::binary("+", Expression::input("v"), Expression::num("1")),
        ),
        root_mapping(out("o"), Expression::input("v")),
    ]);
    assert_eq!(
        run(config, json!({"a": 3})).unwrap(),
        Value::from(json!({"total": 4, "o": [3]}))
    );
}

#[test]
fn if_else_selects_one_branch() {
    // def f(c) { if c { a: 1 } else { b: 2 } }  out r: f(true)  out r: f(false)
    let conditional = BlockItem::Conditional(ConditionBlock {
        span: Span::default(),
        condition: Some(Expression::input("c")),
        then: Some(Block {
            span: Span::default(),
            items: vec![item(field("a"), Expression::num("1"))],
        }),
        otherwise: Some(Block {
            span: Span::default(),
            items: vec![item(field("b"), Expression::num("2"))],
        }),
    });
    let config = program(vec![
        def("f", &["c"], vec![conditional]),
        root_mapping(out("r"), Expression::call("f", vec![boolean(true)])),
        root_mapping(out("r"), Expression::call("f", vec![boolean(false)])),
    ]);
    assert_eq!(
        run(config, json!({})).unwrap(),
        Value::from(json!({"r": [{"a": 1}, {"b": 2}]}))
    );
}

#[test]
fn filter_keeps_matching_elements() {
    // def f(arr, min) { x: arr[where $.v > min] }  out r: f($root.items, 1)
    let predicate = Expression::binary(">", Expression::input("$.v"), Expression::input("min"));
    let filtered = SourceNode::Input(InputNode {
        path: Some(Path::dotted("arr")),
        filter: Some(Box::new(predicate)),
        ..InputNode::default()
    });
    let config = program(vec![
        def(
            "f",
            &["arr", "min"],
            vec![item(field("x"), Expression::Source(filtered))],
        ),
        root_mapping(
            out("r"),
            Expression::call("f", vec![root_input(&["items"]), SourceNode::num("1")]),
        ),
    ]);
    let input = json!({"items": [{"v": 1}, {"v": 2}, {"v": 3}]});
    assert_eq!(
        run(config, input).unwrap(),
        Value::from(json!({"r": [{"x": [{"v": 2}, {"v": 3}]}]}))
    );
}

#[test]
fn anonymous_block_reads_enclosing_arguments() {
    // def f(a) { x: { y: a } }  out r: f(7)
    let anon = Expression::AnonBlock {
        span: Span::default(),
        block: Some(Block {
            span: Span::default(),
            items: vec![item(field("y"), Expression::input("a"))],
        }),
    };
    let config = program(vec![
        def("f", &["a"], vec![item(field("x"), anon)]),
        root_mapping(out("r"), Expression::call("f", vec![SourceNode::num("7")])),
    ]);
    assert_eq!(
        run(config, json!({})).unwrap(),
        Value::from(json!({"r": [{"x": {"y": 7}}]}))
    );
}

#[test]
fn post_process_wraps_the_merged_output() {
    // def wrap(doc) { wrapped: doc }  a: 1  out o: 2  post wrap
    let mut root = Root {
        items: vec![
            def("wrap", &["doc"], vec![item(field("wrapped"), Expression::input("doc"))]),
            root_mapping(field("a"), Expression::num("1")),
            root_mapping(out("o"), Expression::num("2")),
        ],
        ..Root::default()
    };
    root.post_process = Some(PostProcessNode::Name {
        span: Span::default(),
        name: "wrap".into(),
    });
    let config = compile(&root, &CompileOptions::default()).unwrap();
    assert_eq!(
        run(config, json!({})).unwrap(),
        Value::from(json!({"wrapped": {"a": 1, "o": [2]}}))
    );
}

#[test]
fn unbounded_recursion_exceeds_stack_depth() {
    // def f(n) { x: f(n) }  out r: f(1)
    let config = program(vec![
        def(
            "f",
            &["n"],
            vec![item(field("x"), Expression::call("f", vec![SourceNode::input("n")]))],
        ),
        root_mapping(out("r"), Expression::call("f", vec![SourceNode::num("1")])),
    ]);
    let options = EngineOptions {
        max_stack_depth: 50,
        ..EngineOptions::default()
    };
    let err = run_with(config, json!({}), options).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("stack depth exceeded 50"), "{message}");
    assert!(message.contains("f: 51"), "{message}");
}

#[test]
fn mapping_errors_name_index_and_projector() {
    // def f(s) { a: 1; b: s - 1 }  out r: f("x")
    let config = program(vec![
        def(
            "f",
            &["s"],
            vec![
                item(field("a"), Expression::num("1")),
                item(
                    field("b"),
                    Expression::binary("-", Expression::input("s"), Expression::num("1")),
                ),
            ],
        ),
        root_mapping(
            out("r"),
            Expression::call(
                "f",
                vec![SourceNode::ConstStr {
                    span: Span::default(),
                    text: "\"x\"".into(),
                }],
            ),
        ),
    ]);
    let message = run(config, json!({})).unwrap_err().to_string();
    assert!(
        message.contains("error processing field mapping 1 in projector f"),
        "{message}"
    );
    assert!(message.contains("$Sub"), "{message}");
}

// ──────────────────────────────────────────────
// Appending writes and built-in limits
// ──────────────────────────────────────────────

/// `a[].b` gets `$ListOf(1, 2)` whole; `c[].d` gets one slot per element of
/// the iterated `xs[]`. The root writes the projector result to `r`.
fn append_program() -> MappingConfig {
    let list_of = ValueSource {
        source: Some(Source::ConstNum(1.0)),
        projector: "$ListOf".into(),
        additional_arg: vec![ValueSource::from_source(Source::ConstNum(2.0))],
    };
    let appends = ProjectorDefinition {
        name: "appends".into(),
        mapping: vec![
            FieldMapping::new(Target::Field("a[].b".into()), list_of),
            FieldMapping::new(
                Target::Field("c[].d".into()),
                ValueSource::from_source(Source::from_input(1, "xs[]")),
            ),
        ],
        meta: None,
    };
    let call = ValueSource {
        source: Some(Source::from_input(1, "")),
        projector: "appends".into(),
        additional_arg: Vec::new(),
    };
    MappingConfig {
        projector: vec![appends],
        root_mapping: vec![FieldMapping::new(Target::Field("r".into()), call)],
        post_process: None,
    }
}

#[test]
fn append_unpacks_only_iterated_sources() {
    let expected = Value::from(json!({
        "r": {"a": [{"b": [1, 2]}], "c": [{"d": 1}, {"d": 2}]}
    }));
    let input = json!({"xs": [1, 2]});
    assert_eq!(run(append_program(), input.clone()).unwrap(), expected);

    let options = EngineOptions {
        parallel: true,
        ..EngineOptions::default()
    };
    assert_eq!(run_with(append_program(), input, options).unwrap(), expected);
}

#[test]
fn range_with_unbounded_ends_fails() {
    let transformer =
        Transformer::new(MappingConfig::default(), EngineOptions::default()).unwrap();
    let infinite = transformer
        .project("$Range", vec![Value::Num(0.0), Value::Num(f64::INFINITY)])
        .unwrap_err()
        .to_string();
    assert!(infinite.contains("error calling $Range"), "{infinite}");
    assert!(infinite.contains("must be finite"), "{infinite}");

    let huge = 9_007_199_254_740_992.0;
    let imprecise = transformer
        .project("$Range", vec![Value::Num(huge), Value::Num(huge + 4.0)])
        .unwrap_err();
    assert!(imprecise.to_string().contains("exceed"), "{imprecise}");

    assert_eq!(
        transformer
            .project("$Range", vec![Value::Num(1.0), Value::Num(4.0)])
            .unwrap(),
        Value::from(json!([1, 2, 3]))
    );
}

// ──────────────────────────────────────────────
// Parallel evaluation
// ──────────────────────────────────────────────

/// A body mixing destination reads, vars, appends and conditionals.
fn summary_program() -> MappingConfig {
    let flagged = BlockItem::Conditional(ConditionBlock {
        span: Span::default(),
        condition: Some(Expression::input("p.flag")),
        then: Some(Block {
            span: Span::default(),
            items: vec![item(field("flagged"), Expression::string("\"yes\""))],
        }),
        otherwise: Some(Block {
            span: Span::default(),
            items: vec![item(field("flagged"), Expression::string("\"no\""))],
        }),
    });
    let append = |path: &str| TargetNode::Field {
        span: Span::default(),
        path: Some(Path::dotted(path).with_array_mod()),
    };
    program(vec![
        def(
            "summary",
            &["p"],
            vec![
                item(field("first"), Expression::input("p.a")),
                item(
                    field("second"),
                    Expression::binary("+", dest("first"), Expression::num("1")),
                ),
                item(
                    var("acc"),
                    Expression::binary("*", Expression::input("p.a"), Expression::num("2")),
                ),
                item(field("doubled"), Expression::input("acc")),
                item(append("items"), Expression::input("p.a")),
                item(append("items"), Expression::input("p.b")),
                flagged,
                item(
                    field("third"),
                    Expression::binary("+", dest("second"), Expression::input("acc")),
                ),
            ],
        ),
        root_mapping(out("r"), Expression::call("summary", vec![root_input(&[])])),
        root_mapping(field("s"), Expression::call("summary", vec![root_input(&[])])),
        root_mapping(field("t"), Expression::num("1")),
    ])
}

#[test]
fn parallel_evaluation_matches_sequential() {
    let input = json!({"a": 2, "b": 5, "flag": true});
    let sequential = run(summary_program(), input.clone()).unwrap();
    let expected_summary = json!({
        "first": 2,
        "second": 3,
        "doubled": 4,
        "items": [2, 5],
        "flagged": "yes",
        "third": 7
    });
    assert_eq!(
        sequential,
        Value::from(json!({"r": [expected_summary.clone()], "s": expected_summary, "t": 1}))
    );

    let options = EngineOptions {
        parallel: true,
        ..EngineOptions::default()
    };
    for _ in 0..20 {
        let parallel = run_with(summary_program(), input.clone(), options).unwrap();
        assert_eq!(parallel, sequential);
    }
}

#[test]
fn parallel_errors_are_reported_like_sequential() {
    let input = json!({"a": "x", "b": 5, "flag": false});
    let sequential = run(summary_program(), input.clone()).unwrap_err();
    let options = EngineOptions {
        parallel: true,
        ..EngineOptions::default()
    };
    let parallel = run_with(summary_program(), input, options).unwrap_err();
    assert_eq!(parallel.to_string(), sequential.to_string());
}
