// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Property-based tests for causalization and code generation.

use proptest::prelude::*;

use crate::ast::{Ast, AstKind};
use crate::causalize::{Counters, assign_constant_indices, causalize};
use crate::datamodel::{Component, Model, Variable};
use crate::equation::Equation;
use crate::generator::Generator;
use crate::profile::Profile;
use crate::variable::{DeclId, Declarations, Registry};

const NAMES: [&str; 5] = ["a", "b", "c", "d", "e"];

fn leaf_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::sample::select(NAMES.to_vec()).prop_map(|n| format!("<ci>{n}</ci>")),
        (1u32..100).prop_map(|n| format!("<cn>{n}</cn>")),
    ]
}

fn expr_strategy() -> impl Strategy<Value = String> {
    leaf_strategy().prop_recursive(4, 32, 4, |inner| {
        (
            prop::sample::select(vec![
                "plus", "minus", "times", "divide", "power", "lt", "and", "or", "max",
            ]),
            prop::collection::vec(inner, 2..5),
        )
            .prop_map(|(op, args)| format!("<apply><{op}/>{}</apply>", args.concat()))
    })
}

fn model_for(expr: &str) -> Model {
    let mut main = Component::new("main");
    for (i, name) in NAMES.iter().enumerate() {
        main.variables
            .push(Variable::with_initial_value(name, &format!("{i}.5")));
    }
    main.variables.push(Variable::new("x"));
    main.math = Some(format!(
        r#"<math xmlns="http://www.w3.org/1998/Math/MathML"><apply><eq/><ci>x</ci>{expr}</apply></math>"#
    ));
    let mut model = Model::new("prop");
    model.components.push(main);
    model
}

fn blocks(generator: &Generator) -> [String; 5] {
    [
        generator.initialize_variables(),
        generator.compute_constant_equations(),
        generator.compute_rate_equations(),
        generator.compute_algebraic_equations(),
        generator.needed_math_methods(),
    ]
}

fn balanced(text: &str) -> bool {
    let mut depth = 0i64;
    for c in text.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn generation_is_idempotent(expr in expr_strategy()) {
        let model = model_for(&expr);
        let mut generator = Generator::new(Profile::c());
        generator.process_model(&model);
        prop_assert_eq!(0, generator.error_count());
        let first = blocks(&generator);

        generator.process_model(&model);
        prop_assert_eq!(first.clone(), blocks(&generator));

        let mut fresh = Generator::new(Profile::c());
        fresh.process_model(&model);
        prop_assert_eq!(first, blocks(&fresh));
    }

    #[test]
    fn rendered_parens_balance(expr in expr_strategy()) {
        for profile in [Profile::c(), Profile::python()] {
            let mut generator = Generator::new(profile);
            generator.process_model(&model_for(&expr));
            let code = generator.compute_constant_equations() + &generator.initialize_variables();
            prop_assert!(balanced(&code), "unbalanced: {}", code);
        }
    }

    #[test]
    fn associative_chains_are_not_parenthesized(
        names in prop::sample::subsequence(NAMES.to_vec(), 2..=5).prop_shuffle(),
        op in prop::sample::select(vec![("plus", "+"), ("times", "*")]),
    ) {
        let args: Vec<String> = names.iter().map(|n| format!("<ci>{n}</ci>")).collect();
        let expr = format!("<apply><{}/>{}</apply>", op.0, args.concat());
        let mut generator = Generator::new(Profile::c());
        generator.process_model(&model_for(&expr));

        let code = generator.compute_constant_equations();
        prop_assert!(!code.contains('('), "{}", code);
        prop_assert_eq!(names.len() - 1, code.matches(op.1).count());
    }

    #[test]
    fn orders_are_contiguous(
        order in (2usize..12).prop_flat_map(|n| Just((1..n).collect::<Vec<_>>()).prop_shuffle())
    ) {
        // v0 is initialized and vi = f(v(i-1)), with the equations
        // shuffled
        let n = order.len() + 1;
        let mut component = Component::new("main");
        component.variables.push(Variable::with_initial_value("v0", "1"));
        for i in 1..n {
            component.variables.push(Variable::new(&format!("v{i}")));
        }
        let mut model = Model::new("chain");
        model.components.push(component);

        let decls = Declarations::new(&model);
        let mut registry = Registry::new();
        let ids: Vec<_> = (0..n).map(|i| registry.intern(&decls, DeclId(i))).collect();

        let mut equations: Vec<Equation> = order
            .iter()
            .map(|i| {
                let mut eqn = Equation::new(Ast::new(AstKind::Eq));
                eqn.add_variable(ids[*i]);
                eqn.add_variable(ids[*i - 1]);
                eqn
            })
            .collect();

        let mut counters = Counters::default();
        assign_constant_indices(&mut registry, &mut counters);
        let resolved = causalize(&mut equations, &mut registry, &mut counters);
        prop_assert_eq!(n - 1, resolved);

        let mut orders: Vec<usize> = equations.iter().map(|e| e.order).collect();
        orders.sort_unstable();
        prop_assert_eq!((1..n).collect::<Vec<_>>(), orders);

        // indices are handed out once each, in resolution order
        let mut indices: Vec<usize> = ids.iter().filter_map(|id| registry.get(*id).index).collect();
        indices.sort_unstable();
        prop_assert_eq!((0..n).collect::<Vec<_>>(), indices);
    }
}
