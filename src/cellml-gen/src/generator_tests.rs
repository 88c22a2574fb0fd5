// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use crate::common::{ErrorCode, ErrorKind};
use crate::datamodel::{Component, Connection, Model, Variable, VariableMap};
use crate::generator::{Generator, ModelType};
use crate::profile::{MathFn, Profile};

const CONSTANTS: [&str; 7] = ["a", "b", "c", "d", "e", "f", "g"];

fn math(body: &str) -> String {
    format!(r#"<math xmlns="http://www.w3.org/1998/Math/MathML">{body}</math>"#)
}

fn ci(name: &str) -> String {
    format!("<ci>{name}</ci>")
}

fn apply(op: &str, args: &[&str]) -> String {
    format!("<apply><{op}/>{}</apply>", args.concat())
}

fn connect(c1: &str, c2: &str, names: &[&str]) -> Connection {
    Connection {
        component_1: c1.to_owned(),
        component_2: c2.to_owned(),
        variables: names
            .iter()
            .map(|n| VariableMap {
                variable_1: n.to_string(),
                variable_2: n.to_string(),
            })
            .collect(),
    }
}

/// An "env" component holding initialized constants a..g, and a "main"
/// component solving `x = <expr>` over them.  a..g take variables[0..6]
/// and x takes variables[7].
fn expression_model(expr: &str) -> Model {
    let mut env = Component::new("env");
    let mut main = Component::new("main");
    for (i, name) in CONSTANTS.iter().enumerate() {
        env.variables
            .push(Variable::with_initial_value(name, &format!("{}.0", i + 1)));
        main.variables.push(Variable::new(name));
    }
    main.variables.push(Variable::new("x"));
    main.math = Some(math(&apply("eq", &[&ci("x"), expr])));

    let mut model = Model::new("expressions");
    model.components.push(env);
    model.components.push(main);
    model.connections.push(connect("env", "main", &CONSTANTS));
    model
}

fn generate_with(profile: Profile, model: &Model) -> Generator {
    let mut generator = Generator::new(profile);
    generator.process_model(model);
    generator
}

fn assert_expression(profile: Profile, expr: &str, expected: &str) {
    let generator = generate_with(profile, &expression_model(expr));
    assert_eq!(0, generator.error_count(), "{:?}", generator.errors());
    assert_eq!(
        format!("variables[7] = {}{}\n", expected, generator.profile().command_separator),
        generator.compute_constant_equations()
    );
}

#[test]
fn test_associative_sum_has_no_parens() {
    let sum = apply("plus", &[&ci("a"), &ci("b"), &ci("c"), &ci("d"), &ci("e")]);
    assert_expression(
        Profile::c(),
        &sum,
        "variables[0]+variables[1]+variables[2]+variables[3]+variables[4]",
    );
}

#[test]
fn test_relational_and_minus_under_times() {
    let expr = apply(
        "times",
        &[
            &apply("lt", &[&ci("a"), &ci("b")]),
            &apply("minus", &[&ci("c"), &ci("d")]),
        ],
    );
    assert_expression(
        Profile::c(),
        &expr,
        "(variables[0] < variables[1])*(variables[2]-variables[3])",
    );
}

#[test]
fn test_unary_minus_operands() {
    let expr = apply(
        "times",
        &[&apply("minus", &[&ci("a")]), &apply("gt", &[&ci("b"), &ci("c")])],
    );
    assert_expression(
        Profile::c(),
        &expr,
        "-variables[0]*(variables[1] > variables[2])",
    );

    let expr = apply(
        "and",
        &[&apply("minus", &[&ci("a")]), &apply("gt", &[&ci("b"), &ci("c")])],
    );
    assert_expression(
        Profile::c(),
        &expr,
        "-variables[0] && (variables[1] > variables[2])",
    );
}

#[test]
fn test_power_under_logical() {
    let expr = apply(
        "and",
        &[
            &apply("power", &[&ci("a"), &ci("b")]),
            &apply("gt", &[&ci("c"), &ci("d")]),
        ],
    );
    assert_expression(
        Profile::c(),
        &expr,
        "pow(variables[0], variables[1]) && (variables[2] > variables[3])",
    );
    // with an infix power operator the power is wrapped too
    assert_expression(
        Profile::python(),
        &expr,
        "(variables[0]**variables[1]) and (variables[2] > variables[3])",
    );
}

#[test]
fn test_root_with_relational_operands() {
    let expr = format!(
        "<apply><root/><degree>{}</degree>{}</apply>",
        apply("gt", &[&ci("c"), &ci("d")]),
        apply("lt", &[&ci("a"), &ci("b")])
    );
    assert_expression(
        Profile::c(),
        &expr,
        "pow(variables[0] < variables[1], 1.0/variables[2] > variables[3])",
    );
}

#[test]
fn test_piecewise_without_otherwise() {
    let expr = format!(
        "<piecewise><piece>{}{}</piece></piecewise>",
        ci("a"),
        apply("gt", &[&ci("a"), &ci("b")])
    );
    assert_expression(
        Profile::c(),
        &expr,
        "(variables[0] > variables[1])?variables[0]:sqrt(-1.0)",
    );
    assert_expression(
        Profile::python(),
        &expr,
        "variables[0] if variables[0] > variables[1] else nan",
    );
}

#[test]
fn test_variadic_min() {
    let expr = apply("min", &[&ci("a"), &ci("b"), &ci("c"), &ci("d"), &ci("e")]);
    assert_expression(
        Profile::c(),
        &expr,
        "min(variables[0], variables[1], variables[2], variables[3], variables[4])",
    );

    let generator = generate_with(Profile::c(), &expression_model(&expr));
    assert_eq!(
        vec![MathFn::Min],
        generator.needed_math_functions().into_iter().collect::<Vec<_>>()
    );
    assert!(generator.needed_math_methods().starts_with("double min(double x, double y)"));

    // python has min built in, so nothing needs defining
    let generator = generate_with(Profile::python(), &expression_model(&expr));
    assert_eq!("", generator.needed_math_methods());
}

#[test]
fn test_logical_nesting() {
    let expr = apply(
        "or",
        &[&apply("and", &[&ci("a"), &ci("b")]), &ci("c")],
    );
    assert_expression(
        Profile::c(),
        &expr,
        "(variables[0] && variables[1]) || variables[2]",
    );

    let expr = apply("and", &[&ci("a"), &ci("b"), &ci("c")]);
    assert_expression(
        Profile::c(),
        &expr,
        "variables[0] && variables[1] && variables[2]",
    );
}

#[test]
fn test_helper_definitions_are_collected() {
    let expr = apply(
        "plus",
        &[
            &apply("sec", &[&ci("a")]),
            &apply("power", &[&ci("b"), "<cn>2</cn>"]),
            &apply("factorial", &[&ci("c")]),
        ],
    );
    let generator = generate_with(Profile::c(), &expression_model(&expr));
    assert_eq!(
        "variables[7] = sec(variables[0])+sqr(variables[1])+fact(variables[2]);\n",
        generator.compute_constant_equations()
    );
    assert_eq!(
        vec![MathFn::Factorial, MathFn::Square, MathFn::Sec],
        generator.needed_math_functions().into_iter().collect::<Vec<_>>()
    );
    let methods = generator.needed_math_methods();
    let fact = methods.find("double fact").unwrap();
    let sqr = methods.find("double sqr").unwrap();
    let sec = methods.find("double sec").unwrap();
    assert!(fact < sqr && sqr < sec);
    assert!(methods.contains("}\n\ndouble sqr"));
}

#[test]
fn test_true_constants_go_to_initializer() {
    let generator = generate_with(Profile::c(), &expression_model("<cn>42</cn>"));
    assert_eq!(0, generator.error_count());
    assert_eq!("", generator.compute_constant_equations());
    let init = generator.initialize_variables();
    let lines: Vec<_> = init.lines().collect();
    assert_eq!(8, lines.len());
    assert_eq!("variables[0] = 1.0;", lines[0]);
    assert_eq!("variables[6] = 7.0;", lines[6]);
    assert_eq!("variables[7] = 42;", lines[7]);
    assert_eq!(ModelType::Algebraic, generator.model_type());
    assert_eq!(8, generator.variable_count());
    assert_eq!(0, generator.state_count());
}

#[test]
fn test_empty_model() {
    let generator = generate_with(Profile::c(), &Model::new("empty"));
    assert_eq!(0, generator.error_count());
    assert_eq!(0, generator.state_count());
    assert_eq!(0, generator.variable_count());
    assert_eq!(ModelType::Algebraic, generator.model_type());
    assert_eq!("", generator.initialize_variables());
    assert_eq!("", generator.compute_constant_equations());
    assert_eq!("", generator.compute_rate_equations());
    assert_eq!("", generator.compute_algebraic_equations());
    assert_eq!("", generator.needed_math_methods());
}

#[test]
fn test_unprocessed_generator() {
    let generator = Generator::default();
    assert_eq!(ModelType::Unknown, generator.model_type());
    assert_eq!(0, generator.error_count());
    assert_eq!("", generator.initialize_variables());
}

fn decay_model() -> Model {
    // dx/dt = 5.0, x(0) = 3.0
    let mut main = Component::new("main");
    main.variables.push(Variable::new("t"));
    main.variables.push(Variable::with_initial_value("x", "3.0"));
    main.math = Some(math(&apply(
        "eq",
        &[
            &format!("<apply><diff/><bvar>{}</bvar>{}</apply>", ci("t"), ci("x")),
            "<cn>5.0</cn>",
        ],
    )));
    let mut model = Model::new("decay");
    model.components.push(main);
    model
}

#[test]
fn test_single_state() {
    let generator = generate_with(Profile::c(), &decay_model());
    assert_eq!(0, generator.error_count(), "{:?}", generator.errors());
    assert_eq!(ModelType::Ode, generator.model_type());
    assert_eq!(1, generator.state_count());
    assert_eq!(1, generator.rate_count());
    assert_eq!(0, generator.variable_count());
    assert_eq!(Some("t"), generator.variable_of_integration());
    assert_eq!("states[0] = 3.0;\n", generator.initialize_variables());
    assert_eq!("rates[0] = 5.0;\n", generator.compute_rate_equations());
    assert_eq!("", generator.compute_algebraic_equations());

    let generator = generate_with(Profile::python(), &decay_model());
    assert_eq!("rates[0] = 5.0\n", generator.compute_rate_equations());
}

#[test]
fn test_ode_with_algebraic() {
    // dx/dt = -k*x, y = x*t, with k a constant
    let mut main = Component::new("main");
    main.variables.push(Variable::new("t"));
    main.variables.push(Variable::with_initial_value("x", "1.0"));
    main.variables.push(Variable::with_initial_value("k", "0.5"));
    main.variables.push(Variable::new("y"));
    main.math = Some(math(&format!(
        "{}{}",
        apply("eq", &[&ci("y"), &apply("times", &[&ci("x"), &ci("t")])]),
        apply(
            "eq",
            &[
                &format!("<apply><diff/><bvar>{}</bvar>{}</apply>", ci("t"), ci("x")),
                &apply("times", &[&apply("minus", &[&ci("k")]), &ci("x")]),
            ]
        )
    )));
    let mut model = Model::new("ode");
    model.components.push(main);

    let generator = generate_with(Profile::c(), &model);
    assert_eq!(0, generator.error_count(), "{:?}", generator.errors());
    assert_eq!(1, generator.state_count());
    assert_eq!(2, generator.variable_count());
    // constants are numbered before anything is computed, so k takes
    // variables[0] even though y was seen first
    assert_eq!(
        "states[0] = 1.0;\nvariables[0] = 0.5;\n",
        generator.initialize_variables()
    );
    assert_eq!(
        "rates[0] = -variables[0]*states[0];\n",
        generator.compute_rate_equations()
    );
    assert_eq!(
        "variables[1] = states[0]*voi;\n",
        generator.compute_algebraic_equations()
    );
}

#[test]
fn test_run_is_idempotent_and_resets() {
    let sum = apply("plus", &[&ci("a"), &ci("b")]);
    let model = expression_model(&sum);

    let mut generator = Generator::default();
    generator.process_model(&model);
    let first = (
        generator.initialize_variables(),
        generator.compute_constant_equations(),
    );
    generator.process_model(&model);
    let second = (
        generator.initialize_variables(),
        generator.compute_constant_equations(),
    );
    assert_eq!(first, second);

    // a different model on the same instance looks like a fresh one
    generator.process_model(&decay_model());
    let fresh = generate_with(Profile::c(), &decay_model());
    assert_eq!(fresh.initialize_variables(), generator.initialize_variables());
    assert_eq!(fresh.compute_rate_equations(), generator.compute_rate_equations());
    assert_eq!("", generator.compute_constant_equations());
}

#[test]
fn test_connection_direction_does_not_matter() {
    let expr = apply("times", &[&ci("a"), &ci("g")]);
    let model = expression_model(&expr);

    let mut reversed = model.clone();
    let mut names = CONSTANTS.to_vec();
    names.reverse();
    reversed.connections = names
        .iter()
        .map(|name| connect("main", "env", &[name]))
        .collect();

    let g1 = generate_with(Profile::c(), &model);
    let g2 = generate_with(Profile::c(), &reversed);
    assert_eq!(g1.initialize_variables(), g2.initialize_variables());
    assert_eq!(
        g1.compute_constant_equations(),
        g2.compute_constant_equations()
    );
}

#[test]
fn test_errors_suppress_code() {
    let mut model = decay_model();
    model.components[0].variables[0].initial_value = Some("0.0".to_owned());

    let generator = generate_with(Profile::c(), &model);
    assert_eq!(1, generator.error_count());
    let err = generator.error(0).unwrap();
    assert_eq!(ErrorKind::Generator, err.kind);
    assert_eq!(ErrorCode::InitializedIntegrationVariable, err.code);
    assert_eq!(
        "Variable 't' in component 'main' of model 'decay' cannot be both a variable of integration and initialised.",
        err.description()
    );
    assert_eq!(ModelType::Unknown, generator.model_type());
    assert_eq!(0, generator.state_count());
    assert_eq!("", generator.initialize_variables());
    assert_eq!("", generator.compute_rate_equations());
}

#[test]
fn test_bad_math_is_an_import_error() {
    let mut model = decay_model();
    model.components[0].math = Some("<math><apply>".to_owned());
    let generator = generate_with(Profile::c(), &model);
    assert_eq!(1, generator.error_count());
    assert_eq!(ErrorKind::Import, generator.error(0).unwrap().kind);
}

#[test]
fn test_reading_a_computed_constant_is_algebraic() {
    // a = 1.0, b = a*2.0, neither initialized
    let mut main = Component::new("main");
    main.variables.push(Variable::new("a"));
    main.variables.push(Variable::new("b"));
    main.math = Some(math(&format!(
        "{}{}",
        apply("eq", &[&ci("a"), "<cn>1.0</cn>"]),
        apply("eq", &[&ci("b"), &apply("times", &[&ci("a"), "<cn>2.0</cn>"])])
    )));
    let mut model = Model::new("computed");
    model.components.push(main);

    let generator = generate_with(Profile::c(), &model);
    assert_eq!(0, generator.error_count(), "{:?}", generator.errors());
    assert_eq!(2, generator.variable_count());
    assert_eq!("variables[0] = 1.0;\n", generator.initialize_variables());
    assert_eq!("", generator.compute_constant_equations());
    assert_eq!(
        "variables[1] = variables[0]*2.0;\n",
        generator.compute_algebraic_equations()
    );
}

fn diff(bvar: &str, var: &str, rate: &str) -> String {
    apply(
        "eq",
        &[
            &format!("<apply><diff/><bvar>{}</bvar>{}</apply>", ci(bvar), ci(var)),
            rate,
        ],
    )
}

#[test]
fn test_initialized_integration_variable_is_never_bound() {
    // both derivatives are taken over the initialized t, and each one
    // reports it
    let mut main = Component::new("main");
    main.variables.push(Variable::with_initial_value("t", "0.0"));
    main.variables.push(Variable::with_initial_value("x", "3.0"));
    main.variables.push(Variable::with_initial_value("y", "1.0"));
    main.math = Some(math(&format!(
        "{}{}",
        diff("t", "x", "<cn>5.0</cn>"),
        diff("t", "y", "<cn>2.0</cn>")
    )));
    let mut model = Model::new("twice");
    model.components.push(main);

    let generator = generate_with(Profile::c(), &model);
    assert_eq!(2, generator.error_count(), "{:?}", generator.errors());
    for err in generator.errors() {
        assert_eq!(ErrorCode::InitializedIntegrationVariable, err.code);
    }
}

#[test]
fn test_integration_variable_after_initialized_candidate() {
    // the initialized t is rejected, leaving s free to be bound.  Had t
    // been bound, s would add a second error for the clash.
    let mut main = Component::new("main");
    main.variables.push(Variable::with_initial_value("t", "0.0"));
    main.variables.push(Variable::new("s"));
    main.variables.push(Variable::with_initial_value("x", "3.0"));
    main.variables.push(Variable::with_initial_value("y", "1.0"));
    main.math = Some(math(&format!(
        "{}{}",
        diff("t", "x", "<cn>5.0</cn>"),
        diff("s", "y", "<cn>2.0</cn>")
    )));
    let mut model = Model::new("two");
    model.components.push(main);

    let generator = generate_with(Profile::c(), &model);
    assert_eq!(1, generator.error_count(), "{:?}", generator.errors());
    let err = generator.error(0).unwrap();
    assert_eq!(ErrorCode::InitializedIntegrationVariable, err.code);
    assert_eq!(
        "Variable 't' in component 'main' of model 'two' cannot be both a variable of integration and initialised.",
        err.description()
    );
}

/// Components "a" and "b" share `k` through a connection and `b`
/// solves `y = k*2.0`.  `holder` names the component that initializes
/// `k`, and `b_first` swaps the component order.
fn shared_constant_model(holder: &str, b_first: bool) -> Model {
    let mut a = Component::new("a");
    let mut b = Component::new("b");
    for component in [&mut a, &mut b] {
        let k = if component.name == holder {
            Variable::with_initial_value("k", "2.0")
        } else {
            Variable::new("k")
        };
        component.variables.push(k);
    }
    b.variables.push(Variable::new("y"));
    b.math = Some(math(&apply(
        "eq",
        &[&ci("y"), &apply("times", &[&ci("k"), "<cn>2.0</cn>"])],
    )));

    let mut model = Model::new("shared");
    if b_first {
        model.components.push(b);
        model.components.push(a);
    } else {
        model.components.push(a);
        model.components.push(b);
    }
    model.connections.push(connect("a", "b", &["k"]));
    model
}

#[test]
fn test_component_order_does_not_matter() {
    for holder in ["a", "b"] {
        for b_first in [false, true] {
            let model = shared_constant_model(holder, b_first);
            let generator = generate_with(Profile::c(), &model);
            let case = format!("holder {holder}, b first {b_first}");
            assert_eq!(0, generator.error_count(), "{case}: {:?}", generator.errors());
            assert_eq!(2, generator.variable_count(), "{case}");
            assert_eq!(
                "variables[0] = 2.0;\n",
                generator.initialize_variables(),
                "{case}"
            );
            assert_eq!(
                "variables[1] = variables[0]*2.0;\n",
                generator.compute_constant_equations(),
                "{case}"
            );
            assert_eq!("", generator.compute_algebraic_equations(), "{case}");
        }
    }
}
