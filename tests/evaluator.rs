//! End-to-end tests for the runtime evaluator: dispatch, objects, matchers,
//! ejectors, try/finally, and slot/binding severities. Driven through
//! `driver::eval_monte`/`eval_to_pair` so each test exercises the full
//! pipeline, not just `eval::eval_expr` in isolation.

use caplang::{
    ast,
    driver::{eval_monte, eval_to_pair, Env},
    error::{EvalError, RunError},
    limits::EvalLimits,
    value::{any_guard, Binding, Value},
};

fn call(recv: ast::Expr, verb: &str, args: Vec<ast::Expr>) -> ast::Expr {
    ast::Expr::Call { recv: Box::new(recv), verb: verb.to_string(), args, named_args: Vec::new() }
}

fn noun(name: &str) -> ast::Expr {
    ast::Expr::Noun(name.to_string())
}

fn int(n: i64) -> ast::Expr {
    ast::Expr::Int(n.into())
}

fn final_def(name: &str, rvalue: ast::Expr) -> ast::Expr {
    ast::Expr::Def {
        patt: ast::Patt::Final { name: name.into(), sigil: ast::Sigil::Noun, guard: None },
        ejector: None,
        rvalue: Box::new(rvalue),
    }
}

fn var_def(name: &str, rvalue: ast::Expr) -> ast::Expr {
    ast::Expr::Def {
        patt: ast::Patt::Var { name: name.into(), sigil: ast::Sigil::Noun, guard: None },
        ejector: None,
        rvalue: Box::new(rvalue),
    }
}

fn patt(name: &str) -> ast::Patt {
    ast::Patt::Final { name: name.into(), sigil: ast::Sigil::Noun, guard: None }
}

fn run(expr: ast::Expr) -> Value {
    eval_monte(expr, &Env::default(), EvalLimits::unlimited()).unwrap()
}

#[test]
fn int_arithmetic_dispatches_through_recv_named() {
    let expr = call(int(1), "add", vec![int(2)]);
    assert_eq!(run(expr), Value::Int(3));
}

#[test]
fn if_picks_the_consequent_when_the_test_is_true() {
    let expr = ast::Expr::If {
        test: Box::new(call(int(1), "aboveZero", vec![])),
        cons: Box::new(ast::Expr::Str("yes".into())),
        alt: Box::new(ast::Expr::Str("no".into())),
    };
    assert_eq!(run(expr), Value::str("yes"));
}

#[test]
fn a_final_def_is_visible_to_later_statements_in_the_same_sequence() {
    let expr = ast::Expr::Seq(vec![final_def("x", int(5)), call(noun("x"), "add", vec![int(1)])]);
    assert_eq!(run(expr), Value::Int(6));
}

#[test]
fn assigning_through_a_var_def_replaces_the_value() {
    let expr = ast::Expr::Seq(vec![
        var_def("x", int(5)),
        ast::Expr::Assign { name: "x".into(), value: Box::new(int(10)) },
        noun("x"),
    ]);
    assert_eq!(run(expr), Value::Int(10));
}

#[test]
fn first_class_binding_round_trips_through_get_get() {
    // `&&y` yields a Binding; Binding.get() yields a Slot; Slot.get() yields
    // the underlying value.
    let expr = ast::Expr::Seq(vec![
        final_def("y", int(5)),
        call(call(ast::Expr::Binding("y".into()), "get", vec![]), "get", vec![]),
    ]);
    assert_eq!(run(expr), Value::Int(5));
}

fn factorial_object() -> ast::Expr {
    ast::Expr::Object {
        doc: None,
        patt: patt("fact"),
        auditors: Vec::new(),
        methods: vec![ast::Method {
            doc: None,
            verb: "apply".to_string(),
            patts: vec![patt("n")],
            named_patts: Vec::new(),
            guard: None,
            body: Box::new(ast::Expr::If {
                test: Box::new(call(noun("n"), "aboveZero", vec![])),
                cons: Box::new(call(
                    noun("n"),
                    "multiply",
                    vec![call(noun("fact"), "apply", vec![call(noun("n"), "subtract", vec![int(1)])])],
                )),
                alt: Box::new(int(1)),
            }),
        }],
        matchers: Vec::new(),
    }
}

#[test]
fn an_object_can_call_itself_by_its_own_bound_name() {
    let expr = ast::Expr::Seq(vec![final_def("fact", factorial_object()), call(noun("fact"), "apply", vec![int(5)])]);
    assert_eq!(run(expr), Value::Int(120));
}

#[test]
fn recursion_beyond_the_configured_depth_is_a_resource_error() {
    let expr = ast::Expr::Seq(vec![final_def("fact", factorial_object()), call(noun("fact"), "apply", vec![int(50)])]);
    let err = eval_monte(expr, &Env::default(), EvalLimits::with_max_depth(3)).unwrap_err();
    assert!(matches!(err, EvalError::Run(RunError::ResourceExceeded { .. })), "expected a resource error, got {err}");
}

#[test]
fn a_matcher_handles_a_verb_with_no_matching_method() {
    let obj = ast::Expr::Object {
        doc: None,
        patt: patt("catcher"),
        auditors: Vec::new(),
        methods: Vec::new(),
        matchers: vec![ast::Matcher {
            patt: ast::Patt::List(vec![patt("verb"), patt("args")]),
            body: Box::new(noun("verb")),
        }],
    };
    let expr = ast::Expr::Seq(vec![final_def("catcher", obj), call(noun("catcher"), "whatever", vec![int(1), int(2)])]);
    assert_eq!(run(expr), Value::str("whatever"));
}

#[test]
fn dispatching_an_unhandled_verb_is_a_thrown_exception_naming_the_object() {
    let obj = ast::Expr::Object {
        doc: None,
        patt: patt("empty"),
        auditors: Vec::new(),
        methods: Vec::new(),
        matchers: Vec::new(),
    };
    let expr = ast::Expr::Seq(vec![final_def("empty", obj), call(noun("empty"), "run", vec![])]);
    let err = eval_monte(expr, &Env::default(), EvalLimits::unlimited()).unwrap_err();
    match err {
        EvalError::Run(RunError::Thrown(t)) => {
            let message = t.payload.to_string();
            assert!(message.contains("does not respond to run/0"), "unexpected message: {message}");
        }
        other => panic!("expected a thrown exception, got {other}"),
    }
}

#[test]
fn a_named_argument_falls_back_to_its_default_when_omitted() {
    let obj = ast::Expr::Object {
        doc: None,
        patt: patt("greeter"),
        auditors: Vec::new(),
        methods: vec![ast::Method {
            doc: None,
            verb: "greet".to_string(),
            patts: vec![patt("name")],
            named_patts: vec![ast::NamedPatt {
                key: Box::new(ast::Expr::Str("greeting".into())),
                patt: patt("greeting"),
                default: Some(Box::new(ast::Expr::Str("hi".into()))),
            }],
            guard: None,
            body: Box::new(call(noun("greeting"), "add", vec![noun("name")])),
        }],
        matchers: Vec::new(),
    };
    let expr = ast::Expr::Seq(vec![final_def("greeter", obj), call(noun("greeter"), "greet", vec![ast::Expr::Str("Bob".into())])]);
    assert_eq!(run(expr), Value::str("hiBob"));
}

#[test]
fn a_supplied_named_argument_overrides_its_default() {
    let obj = ast::Expr::Object {
        doc: None,
        patt: patt("greeter"),
        auditors: Vec::new(),
        methods: vec![ast::Method {
            doc: None,
            verb: "greet".to_string(),
            patts: vec![patt("name")],
            named_patts: vec![ast::NamedPatt {
                key: Box::new(ast::Expr::Str("greeting".into())),
                patt: patt("greeting"),
                default: Some(Box::new(ast::Expr::Str("hi".into()))),
            }],
            guard: None,
            body: Box::new(call(noun("greeting"), "add", vec![noun("name")])),
        }],
        matchers: Vec::new(),
    };
    let expr = ast::Expr::Seq(vec![
        final_def("greeter", obj),
        ast::Expr::Call {
            recv: Box::new(noun("greeter")),
            verb: "greet".to_string(),
            args: vec![ast::Expr::Str("Bob".into())],
            named_args: vec![ast::NamedArg {
                key: Box::new(ast::Expr::Str("greeting".into())),
                value: Box::new(ast::Expr::Str("hey".into())),
            }],
        },
    ]);
    assert_eq!(run(expr), Value::str("heyBob"));
}

#[test]
fn an_escape_without_firing_its_ejector_returns_the_body_value() {
    let expr = ast::Expr::EscapeOnly { patt: patt("ej"), body: Box::new(int(7)) };
    assert_eq!(run(expr), Value::Int(7));
}

#[test]
fn firing_an_ejector_short_circuits_to_its_escape_value() {
    let expr = ast::Expr::EscapeOnly { patt: patt("ej"), body: Box::new(call(noun("ej"), "run", vec![int(5)])) };
    assert_eq!(run(expr), Value::Int(5));
}

#[test]
fn an_escape_catch_clause_receives_the_ejected_value() {
    let expr = ast::Expr::Escape {
        ej_patt: patt("ej"),
        ej_body: Box::new(call(noun("ej"), "run", vec![int(5)])),
        catch_patt: patt("v"),
        catch_body: Box::new(call(noun("v"), "add", vec![int(1)])),
    };
    assert_eq!(run(expr), Value::Int(6));
}

#[test]
fn firing_a_disabled_ejector_after_its_escape_returns_is_a_thrown_exception() {
    // The ejector escapes the `EscapeOnly` normally, so by the time it is
    // fired a second time it has already been disabled.
    let expr = ast::Expr::Seq(vec![
        final_def("ej", ast::Expr::EscapeOnly { patt: patt("inner"), body: Box::new(noun("inner")) }),
        call(noun("ej"), "run", vec![int(1)]),
    ]);
    let err = eval_monte(expr, &Env::default(), EvalLimits::unlimited()).unwrap_err();
    assert!(matches!(err, EvalError::Run(RunError::Thrown(_))), "expected a thrown exception, got {err}");
}

#[test]
fn finally_runs_its_cleanup_block_and_yields_the_body_value() {
    let expr = ast::Expr::Finally { body: Box::new(int(1)), at_last: Box::new(int(2)) };
    assert_eq!(run(expr), Value::Int(1));
}

#[test]
fn finally_propagates_a_failure_from_its_cleanup_block_over_a_successful_body() {
    let expr = ast::Expr::Finally {
        body: Box::new(int(1)),
        at_last: Box::new(call(int(1), "add", vec![ast::Expr::Str("x".into())])),
    };
    let err = eval_monte(expr, &Env::default(), EvalLimits::unlimited()).unwrap_err();
    assert!(matches!(err, EvalError::Run(RunError::Thrown(_))), "expected the cleanup failure to win, got {err}");
}

#[test]
fn try_catch_binds_the_thrown_payload() {
    let expr = ast::Expr::Try {
        body: Box::new(call(int(1), "add", vec![ast::Expr::Str("x".into())])),
        catch_patt: patt("e"),
        catch_body: Box::new(noun("e")),
    };
    match run(expr) {
        Value::Str(s) => assert!(s.contains("expected an Int argument"), "unexpected message: {s}"),
        other => panic!("expected a Str payload, got {other:?}"),
    }
}

#[test]
fn a_top_level_def_survives_into_the_returned_environment() {
    let expr = ast::Expr::Seq(vec![final_def("x", int(3)), noun("x")]);
    let (value, env) = eval_to_pair(expr, &Env::default(), EvalLimits::unlimited()).unwrap();
    assert_eq!(value, Value::Int(3));
    assert_eq!(env.get("x").unwrap().get(), Value::Int(3));
}

#[test]
fn an_audited_object_is_coerced_through_its_declared_auditor() {
    let mut env = Env::default();
    env.insert("Any".to_string(), Binding::final_binding(any_guard(), any_guard()));
    let obj = ast::Expr::Object {
        doc: None,
        patt: patt("widget"),
        auditors: vec![noun("Any")],
        methods: Vec::new(),
        matchers: Vec::new(),
    };
    let value = eval_monte(obj, &env, EvalLimits::unlimited()).unwrap();
    assert_eq!(value.type_name(), "Object");
}

#[test]
fn an_audited_object_with_extra_auditors_checks_all_of_them() {
    // "Any" is the guard auditor (auditors[0]); "AlsoChecks" is a rest
    // auditor consulted pass/fail only, never given the chance to
    // transform the result.
    let mut env = Env::default();
    env.insert("Any".to_string(), Binding::final_binding(any_guard(), any_guard()));
    env.insert("AlsoChecks".to_string(), Binding::final_binding(any_guard(), any_guard()));
    let obj = ast::Expr::Object {
        doc: None,
        patt: patt("widget"),
        auditors: vec![noun("Any"), noun("AlsoChecks")],
        methods: Vec::new(),
        matchers: Vec::new(),
    };
    let value = eval_monte(obj, &env, EvalLimits::unlimited()).unwrap();
    assert_eq!(value.type_name(), "Object");
}
