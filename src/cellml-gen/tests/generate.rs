// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fs::File;
use std::io::BufReader;

use cellml_gen::cellml;
use cellml_gen::datamodel::Model;
use cellml_gen::{ErrorCode, ErrorKind, Generator, MathFn, ModelType, Profile};

fn load_model(name: &str) -> Model {
    let path = format!("{}/tests/models/{}", env!("CARGO_MANIFEST_DIR"), name);
    let f = File::open(&path).unwrap_or_else(|err| panic!("open {path}: {err}"));
    let mut f = BufReader::new(f);
    cellml::model_from_reader(&mut f).unwrap()
}

fn generate(profile: Profile, name: &str) -> Generator {
    let model = load_model(name);
    let mut generator = Generator::new(profile);
    generator.process_model(&model);
    generator
}

fn descriptions(generator: &Generator) -> Vec<&str> {
    generator.errors().iter().map(|e| e.description()).collect()
}

fn assert_no_code(generator: &Generator) {
    assert_eq!(ModelType::Unknown, generator.model_type());
    assert_eq!(0, generator.state_count());
    assert_eq!(0, generator.variable_count());
    assert_eq!("", generator.initialize_variables());
    assert_eq!("", generator.compute_constant_equations());
    assert_eq!("", generator.compute_rate_equations());
    assert_eq!("", generator.compute_algebraic_equations());
    assert_eq!("", generator.needed_math_methods());
}

const VAN_DER_POL_RATES: &str = "rates[0] = states[1];\n\
    rates[1] = variables[0]*(1.0-sqr(states[0]))*states[1]-states[0];\n";

#[test]
fn test_van_der_pol() {
    let generator = generate(Profile::c(), "van_der_pol.cellml");

    assert_eq!(0, generator.error_count());
    assert_eq!(ModelType::Ode, generator.model_type());
    assert_eq!(2, generator.state_count());
    assert_eq!(2, generator.rate_count());
    assert_eq!(1, generator.variable_count());
    assert_eq!(2, generator.equation_count());
    assert_eq!(Some("time"), generator.variable_of_integration());

    assert_eq!(
        "states[0] = -2.0;\nstates[1] = 0.0;\nvariables[0] = 1.0;\n",
        generator.initialize_variables()
    );
    assert_eq!("", generator.compute_constant_equations());
    assert_eq!(VAN_DER_POL_RATES, generator.compute_rate_equations());
    assert_eq!("", generator.compute_algebraic_equations());

    assert_eq!(
        vec![MathFn::Square],
        generator.needed_math_functions().into_iter().collect::<Vec<_>>()
    );
    assert_eq!(
        "double sqr(double x)\n{\n    return x*x;\n}\n",
        generator.needed_math_methods()
    );
}

#[test]
fn test_van_der_pol_python() {
    let generator = generate(Profile::python(), "van_der_pol.cellml");

    assert_eq!(0, generator.error_count());
    assert_eq!(
        "states[0] = -2.0\nstates[1] = 0.0\nvariables[0] = 1.0\n",
        generator.initialize_variables()
    );
    assert_eq!(
        "rates[0] = states[1]\nrates[1] = variables[0]*(1.0-sqr(states[0]))*states[1]-states[0]\n",
        generator.compute_rate_equations()
    );
    assert_eq!("def sqr(x):\n    return x*x\n", generator.needed_math_methods());
}

#[test]
fn test_cellml_1_1_matches_2_0() {
    // the same system split over three components, wired up with 1.1
    // groups and connections
    let generator = generate(Profile::c(), "van_der_pol_1_1.cellml");

    assert_eq!(0, generator.error_count());
    assert_eq!(ModelType::Ode, generator.model_type());
    assert_eq!(2, generator.state_count());
    assert_eq!(1, generator.variable_count());
    assert_eq!(Some("time"), generator.variable_of_integration());
    assert_eq!(
        "states[0] = -2.0;\nstates[1] = 0.0;\nvariables[0] = 1.0;\n",
        generator.initialize_variables()
    );
    assert_eq!(VAN_DER_POL_RATES, generator.compute_rate_equations());
}

#[test]
fn test_algebraic_model() {
    let generator = generate(Profile::c(), "algebraic.cellml");

    assert_eq!(0, generator.error_count());
    assert_eq!(ModelType::Algebraic, generator.model_type());
    assert_eq!(0, generator.state_count());
    assert_eq!(4, generator.variable_count());
    assert_eq!(3, generator.equation_count());
    assert_eq!(None, generator.variable_of_integration());

    // `half` needs nothing but a literal, so it is folded into the
    // initializer
    assert_eq!(
        "variables[0] = 3.0;\nvariables[2] = 0.5;\n",
        generator.initialize_variables()
    );
    // `flag` reads the computed `area`, so it is recomputed with the
    // algebraic equations rather than once with the constants
    assert_eq!(
        "variables[1] = 3.14159265358979*sqr(variables[0]);\n",
        generator.compute_constant_equations()
    );
    assert_eq!("", generator.compute_rate_equations());
    assert_eq!(
        "variables[3] = (variables[1] > 10.0)?1.0:0.0;\n",
        generator.compute_algebraic_equations()
    );
}

#[test]
fn test_algebraic_model_python() {
    let generator = generate(Profile::python(), "algebraic.cellml");

    assert_eq!(
        "variables[1] = pi*sqr(variables[0])\n",
        generator.compute_constant_equations()
    );
    assert_eq!(
        "variables[3] = 1.0 if variables[1] > 10.0 else 0.0\n",
        generator.compute_algebraic_equations()
    );
}

#[test]
fn test_two_integration_variables() {
    let generator = generate(Profile::c(), "two_integration_variables.cellml");

    assert_eq!(1, generator.error_count());
    let err = generator.error(0).unwrap();
    assert_eq!(ErrorKind::Generator, err.kind);
    assert_eq!(ErrorCode::MultipleIntegrationVariables, err.code);
    assert_eq!(
        vec![
            "Variable 'time' in component 'main' of model 'two_integration_variables' and \
             variable 'other_time' in component 'sub' of model 'two_integration_variables' \
             cannot both be a variable of integration."
        ],
        descriptions(&generator)
    );
    assert_no_code(&generator);
}

#[test]
fn test_second_order_differential() {
    let generator = generate(Profile::c(), "second_order.cellml");

    assert_eq!(1, generator.error_count());
    assert_eq!(
        ErrorCode::NonFirstOrderDifferential,
        generator.error(0).unwrap().code
    );
    assert_eq!(
        vec![
            "The differential equation for variable 'x' in component 'main' of model \
             'second_order' must be of the first order."
        ],
        descriptions(&generator)
    );
    assert_no_code(&generator);
}

#[test]
fn test_equivalent_variables_initialized_twice() {
    let generator = generate(Profile::c(), "initialized_twice.cellml");

    assert_eq!(1, generator.error_count());
    assert_eq!(
        ErrorCode::ConflictingInitialValues,
        generator.error(0).unwrap().code
    );
    assert_eq!(
        vec![
            "Variable 'x' in component 'sub' of model 'initialized_twice' and variable 'x' \
             in component 'main' of model 'initialized_twice' are equivalent and cannot \
             therefore both be initialised."
        ],
        descriptions(&generator)
    );
    assert_no_code(&generator);
}

#[test]
fn test_unsolved_variables() {
    let generator = generate(Profile::c(), "unsolved.cellml");

    assert_eq!(2, generator.error_count());
    assert_eq!(ErrorCode::UninitializedState, generator.error(0).unwrap().code);
    assert_eq!(
        ErrorCode::UnderconstrainedVariable,
        generator.error(1).unwrap().code
    );
    assert_eq!(
        vec![
            "Variable 'x' in component 'main' of model 'unsolved' is used in an ODE, but it \
             is not initialised.",
            "Variable 'y' in component 'main' of model 'unsolved' is of unknown type.",
        ],
        descriptions(&generator)
    );
    assert_no_code(&generator);
    assert!(generator.error(2).is_none());
}

#[test]
fn test_reprocessing_replaces_errors() {
    let mut generator = generate(Profile::c(), "unsolved.cellml");
    assert_eq!(2, generator.error_count());

    generator.process_model(&load_model("van_der_pol.cellml"));
    assert_eq!(0, generator.error_count());
    assert_eq!(ModelType::Ode, generator.model_type());
    assert_eq!(VAN_DER_POL_RATES, generator.compute_rate_equations());
}
