// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Role discovery and causalization: decides which equation computes
//! which variable, and in what order.

use tracing::{debug, trace};

use crate::ast::{Ast, AstKind, VariableRef};
use crate::common::Error;
use crate::equation::{Constancy, Equation, EquationKind};
use crate::gen_err;
use crate::variable::{Declarations, Registry, Role};

/// Index and order counters for one run.  State and variable indices
/// are independent numbering spaces; orders start at 1.
#[cfg_attr(feature = "debug-derive", derive(Debug))]
#[derive(Default)]
pub struct Counters {
    pub states: usize,
    pub variables: usize,
    pub orders: usize,
}

impl Counters {
    fn next_state(&mut self) -> usize {
        self.states += 1;
        self.states - 1
    }

    fn next_variable(&mut self) -> usize {
        self.variables += 1;
        self.variables - 1
    }

    fn next_order(&mut self) -> usize {
        self.orders += 1;
        self.orders
    }
}

/// Finds the integration variable and the states of the model by
/// looking at every differential in `ast`, checking that each is first
/// order.
pub fn discover_differentials(
    ast: &Ast,
    decls: &Declarations,
    registry: &mut Registry,
    integration_variable: &mut Option<VariableRef>,
    errors: &mut Vec<Error>,
) {
    ast.visit(&mut |node| {
        if node.kind != AstKind::Diff {
            return;
        }
        let bvar = node.left().filter(|n| n.kind == AstKind::Bvar);
        let dependent = node.right().and_then(|n| n.variable);

        if let Some(bound) = bvar.and_then(|b| b.left()).and_then(|n| n.variable) {
            bind_integration_variable(bound, decls, registry, integration_variable, errors);
        }

        let degree = bvar
            .and_then(|b| b.right())
            .filter(|n| n.kind == AstKind::Degree)
            .and_then(|n| n.left())
            .filter(|n| n.kind == AstKind::Cn);
        if let (Some(degree), Some(dependent)) = (degree, dependent) {
            let value = degree
                .value
                .as_deref()
                .and_then(|v| v.trim().parse::<f64>().ok());
            if value != Some(1.0) {
                errors.push(gen_err!(
                    NonFirstOrderDifferential,
                    format!(
                        "The differential equation for variable {} must be of the first order.",
                        decls.describe(dependent.decl)
                    )
                ));
            }
        }

        if let Some(dependent) = dependent {
            registry.get_mut(dependent.var).make_state();
        }
    });
}

fn bind_integration_variable(
    bound: VariableRef,
    decls: &Declarations,
    registry: &mut Registry,
    integration_variable: &mut Option<VariableRef>,
    errors: &mut Vec<Error>,
) {
    // the role is set even on conflict, so the variable is not also
    // reported as being of unknown type
    registry.get_mut(bound.var).make_integration_variable();

    match *integration_variable {
        // an initialized candidate is reported and left unbound
        None => {
            let canonical = registry.get(bound.var).decl;
            if decls.get(canonical).is_initialized() {
                errors.push(gen_err!(
                    InitializedIntegrationVariable,
                    format!(
                        "Variable {} cannot be both a variable of integration and initialised.",
                        decls.describe(canonical)
                    )
                ));
            } else {
                *integration_variable = Some(bound);
            }
        }
        Some(existing) if existing.var != bound.var => {
            errors.push(gen_err!(
                MultipleIntegrationVariables,
                format!(
                    "Variable {} and variable {} cannot both be a variable of integration.",
                    decls.describe(existing.decl),
                    decls.describe(bound.decl)
                )
            ));
        }
        Some(_) => {}
    }
}

/// Constants never need an equation to justify their index, so they
/// are numbered up front in registry order.
pub fn assign_constant_indices(registry: &mut Registry, counters: &mut Counters) {
    for id in registry.ids() {
        let record = registry.get_mut(id);
        if record.role == Role::Constant && record.index.is_none() {
            record.index = Some(counters.next_variable());
        }
    }
}

fn is_known(registry: &Registry, var: crate::variable::VarId, ode: bool) -> bool {
    let record = registry.get(var);
    if record.computed || record.role == Role::IntegrationVariable {
        return true;
    }
    !ode && matches!(record.role, Role::State | Role::Constant)
}

/// Tries to resolve a single equation, returning true if it was given
/// an order on this call.
pub fn resolve(equation: &mut Equation, registry: &mut Registry, counters: &mut Counters) -> bool {
    if equation.is_resolved() {
        return false;
    }

    // one remaining reference that something else already solved: a
    // second equation for a known variable
    if let Some(var) = equation.sole_reference() {
        if registry.get(var).role != Role::Unknown {
            debug!(var = var.0, "skipping over-constrained equation");
            return false;
        }
    }

    let roles: Vec<Role> = equation.references().map(|v| registry.get(v).role).collect();
    for role in roles.into_iter() {
        equation.observe(role);
    }

    equation.variables.retain(|v| !is_known(registry, *v, false));
    equation.ode_variables.retain(|v| !is_known(registry, *v, true));

    let var = match equation.sole_reference() {
        Some(var) => var,
        None => return false,
    };

    let record = registry.get_mut(var);
    if record.role == Role::Unknown {
        record.role = match equation.constancy {
            Constancy::TrueConstant => Role::ComputedTrueConstant,
            Constancy::VariableBasedConstant => Role::ComputedVariableBasedConstant,
            Constancy::NonConstant => Role::Algebraic,
        };
    }
    if !record.role.is_computable() {
        return false;
    }

    let (index, kind) = match record.role {
        Role::State => (counters.next_state(), EquationKind::Rate),
        Role::ComputedTrueConstant => (counters.next_variable(), EquationKind::TrueConstant),
        Role::ComputedVariableBasedConstant => (
            counters.next_variable(),
            EquationKind::VariableBasedConstant,
        ),
        _ => (counters.next_variable(), EquationKind::Algebraic),
    };
    record.index = Some(index);
    record.computed = true;
    equation.kind = kind;
    equation.order = counters.next_order();

    trace!(
        var = var.0,
        index,
        order = equation.order,
        ?kind,
        "equation resolved"
    );

    true
}

/// Runs `resolve` over every equation until a whole pass makes no
/// progress.  Returns the number of equations ordered.
pub fn causalize(
    equations: &mut [Equation],
    registry: &mut Registry,
    counters: &mut Counters,
) -> usize {
    let mut resolved = 0;
    let mut pass = 0;
    loop {
        pass += 1;
        let mut progress = 0;
        for equation in equations.iter_mut() {
            if resolve(equation, registry, counters) {
                progress += 1;
            }
        }
        debug!(pass, progress, "causalization pass");
        if progress == 0 {
            break;
        }
        resolved += progress;
    }
    resolved
}

/// Reports every variable left without a valid role.
pub fn check_roles(registry: &Registry, decls: &Declarations) -> Vec<Error> {
    let mut errors = vec![];
    for (_, record) in registry.iter() {
        match record.role {
            Role::Unknown => errors.push(gen_err!(
                UnderconstrainedVariable,
                format!("Variable {} is of unknown type.", decls.describe(record.decl))
            )),
            Role::ShouldBeState => errors.push(gen_err!(
                UninitializedState,
                format!(
                    "Variable {} is used in an ODE, but it is not initialised.",
                    decls.describe(record.decl)
                )
            )),
            _ => {}
        }
    }
    errors
}

#[cfg(test)]
use crate::variable::VarId;

#[cfg(test)]
fn setup(names: &[(&str, Option<&str>)]) -> (Declarations, Registry, Vec<VarId>) {
    use crate::datamodel::{Component, Model, Variable};

    let mut component = Component::new("main");
    for (name, init) in names.iter() {
        component.variables.push(match init {
            Some(init) => Variable::with_initial_value(name, init),
            None => Variable::new(name),
        });
    }
    let mut model = Model::new("m");
    model.components.push(component);
    let decls = Declarations::new(&model);
    let mut registry = Registry::new();
    let ids = (0..names.len())
        .map(|i| registry.intern(&decls, crate::variable::DeclId(i)))
        .collect();
    (decls, registry, ids)
}

#[cfg(test)]
fn equation(plain: &[VarId], ode: &[VarId]) -> Equation {
    let mut eqn = Equation::new(Ast::new(AstKind::Eq));
    for v in plain {
        eqn.add_variable(*v);
    }
    for v in ode {
        eqn.add_ode_variable(*v);
    }
    eqn
}

#[test]
fn test_chain_of_constants() {
    // c = b * 2, b = a + 1, a initialized
    let (decls, mut registry, ids) = setup(&[("a", Some("1.0")), ("b", None), ("c", None)]);
    let (a, b, c) = (ids[0], ids[1], ids[2]);
    let mut counters = Counters::default();
    assign_constant_indices(&mut registry, &mut counters);
    assert_eq!(Some(0), registry.get(a).index);

    let mut eqns = vec![equation(&[c, b], &[]), equation(&[b, a], &[])];
    assert_eq!(2, causalize(&mut eqns, &mut registry, &mut counters));

    // b is solved in the first pass, c in the second.  c reads the
    // computed b, so it has to be recomputed along with it.
    assert_eq!(2, eqns[0].order);
    assert_eq!(1, eqns[1].order);
    assert_eq!(EquationKind::VariableBasedConstant, eqns[1].kind);
    assert_eq!(EquationKind::Algebraic, eqns[0].kind);
    assert_eq!(Role::ComputedVariableBasedConstant, registry.get(b).role);
    assert_eq!(Role::Algebraic, registry.get(c).role);
    assert_eq!(Some(1), registry.get(b).index);
    assert_eq!(Some(2), registry.get(c).index);
    assert!(check_roles(&registry, &decls).is_empty());
}

#[test]
fn test_constancy_follows_referenced_roles() {
    // p = 1, q = a, r = p, s = q, with only a initialized
    let (decls, mut registry, ids) = setup(&[
        ("a", Some("2.0")),
        ("p", None),
        ("q", None),
        ("r", None),
        ("s", None),
    ]);
    let (a, p, q, r, s) = (ids[0], ids[1], ids[2], ids[3], ids[4]);
    let mut counters = Counters::default();
    assign_constant_indices(&mut registry, &mut counters);

    let mut eqns = vec![
        equation(&[p], &[]),
        equation(&[q, a], &[]),
        equation(&[r, p], &[]),
        equation(&[s, q], &[]),
    ];
    assert_eq!(4, causalize(&mut eqns, &mut registry, &mut counters));

    let kinds: Vec<_> = eqns.iter().map(|eqn| eqn.kind).collect();
    assert_eq!(
        vec![
            EquationKind::TrueConstant,
            EquationKind::VariableBasedConstant,
            EquationKind::Algebraic,
            EquationKind::Algebraic,
        ],
        kinds
    );
    assert_eq!(Role::ComputedTrueConstant, registry.get(p).role);
    assert_eq!(Role::ComputedVariableBasedConstant, registry.get(q).role);
    assert_eq!(Role::Algebraic, registry.get(r).role);
    assert_eq!(Role::Algebraic, registry.get(s).role);
    assert!(check_roles(&registry, &decls).is_empty());
}

#[test]
fn test_true_constant_and_algebraic() {
    let (decls, mut registry, ids) = setup(&[("t", None), ("k", None), ("y", None)]);
    let (t, k, y) = (ids[0], ids[1], ids[2]);
    registry.get_mut(t).make_integration_variable();
    let mut counters = Counters::default();

    // k = 3, y = k * t
    let mut eqns = vec![equation(&[y, k, t], &[]), equation(&[k], &[])];
    assert_eq!(2, causalize(&mut eqns, &mut registry, &mut counters));
    assert_eq!(EquationKind::TrueConstant, eqns[1].kind);
    assert_eq!(EquationKind::Algebraic, eqns[0].kind);
    assert_eq!(Role::Algebraic, registry.get(y).role);
    assert!(check_roles(&registry, &decls).is_empty());
}

#[test]
fn test_rate_equation() {
    let (_decls, mut registry, ids) = setup(&[("t", None), ("x", Some("3.0"))]);
    let (t, x) = (ids[0], ids[1]);
    registry.get_mut(t).make_integration_variable();
    registry.get_mut(x).make_state();
    let mut counters = Counters::default();
    assign_constant_indices(&mut registry, &mut counters);

    let mut eqns = vec![equation(&[], &[t, x])];
    assert_eq!(1, causalize(&mut eqns, &mut registry, &mut counters));
    assert_eq!(EquationKind::Rate, eqns[0].kind);
    assert_eq!(Some(0), registry.get(x).index);
    assert_eq!(0, counters.variables);
}

#[test]
fn test_over_constrained_equation_is_skipped() {
    let (_decls, mut registry, ids) = setup(&[("a", None)]);
    let a = ids[0];
    let mut counters = Counters::default();

    let mut eqns = vec![equation(&[a], &[]), equation(&[a], &[])];
    assert_eq!(1, causalize(&mut eqns, &mut registry, &mut counters));
    assert_eq!(1, eqns[0].order);
    assert_eq!(0, eqns[1].order);
    assert_eq!(EquationKind::Unknown, eqns[1].kind);
}

#[test]
fn test_underconstrained() {
    let (decls, mut registry, ids) = setup(&[("a", None), ("b", None), ("x", None)]);
    registry.get_mut(ids[2]).make_state();
    let mut counters = Counters::default();

    let mut eqns = vec![equation(&ids[..2], &[])];
    assert_eq!(0, causalize(&mut eqns, &mut registry, &mut counters));
    let errors = check_roles(&registry, &decls);
    let details: Vec<_> = errors.iter().map(|e| e.description().to_owned()).collect();
    assert_eq!(
        vec![
            "Variable 'a' in component 'main' of model 'm' is of unknown type.",
            "Variable 'b' in component 'main' of model 'm' is of unknown type.",
            "Variable 'x' in component 'main' of model 'm' is used in an ODE, but it is not initialised.",
        ],
        details
    );
}
