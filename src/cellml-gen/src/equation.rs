// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use crate::ast::Ast;
use crate::variable::{Role, VarId};

/// How constant an equation is, ordered from least to most constant so
/// that downgrades are a `min`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Constancy {
    NonConstant,
    VariableBasedConstant,
    TrueConstant,
}

impl Constancy {
    /// The most constant an equation can be while it references a
    /// variable with `role`.
    /// Only initialized constants keep an equation computable once;
    /// anything solved by another equation makes it algebraic.
    pub fn bound_for(role: Role) -> Constancy {
        match role {
            Role::Unknown => Constancy::TrueConstant,
            Role::Constant => Constancy::VariableBasedConstant,
            Role::ShouldBeState
            | Role::IntegrationVariable
            | Role::State
            | Role::ComputedTrueConstant
            | Role::ComputedVariableBasedConstant
            | Role::Algebraic => Constancy::NonConstant,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EquationKind {
    Unknown,
    TrueConstant,
    VariableBasedConstant,
    Rate,
    Algebraic,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Equation {
    pub ast: Ast,
    /// Plain references still unresolved, in first-seen order.
    pub variables: Vec<VarId>,
    /// References that are the subject (or the bound variable) of a
    /// differential.
    pub ode_variables: Vec<VarId>,
    pub constancy: Constancy,
    pub kind: EquationKind,
    /// Evaluation order, 0 until the equation is resolved.
    pub order: usize,
}

fn push_unique(list: &mut Vec<VarId>, var: VarId) {
    if !list.contains(&var) {
        list.push(var);
    }
}

impl Equation {
    pub fn new(ast: Ast) -> Self {
        Equation {
            ast,
            variables: vec![],
            ode_variables: vec![],
            constancy: Constancy::TrueConstant,
            kind: EquationKind::Unknown,
            order: 0,
        }
    }

    pub fn add_variable(&mut self, var: VarId) {
        push_unique(&mut self.variables, var);
    }

    pub fn add_ode_variable(&mut self, var: VarId) {
        push_unique(&mut self.ode_variables, var);
    }

    pub fn reference_count(&self) -> usize {
        self.variables.len() + self.ode_variables.len()
    }

    pub fn references(&self) -> impl Iterator<Item = VarId> + '_ {
        self.variables
            .iter()
            .chain(self.ode_variables.iter())
            .copied()
    }

    /// The sole remaining reference, if exactly one is left.
    pub fn sole_reference(&self) -> Option<VarId> {
        if self.reference_count() == 1 {
            self.references().next()
        } else {
            None
        }
    }

    pub fn observe(&mut self, role: Role) {
        self.constancy = self.constancy.min(Constancy::bound_for(role));
    }

    pub fn is_resolved(&self) -> bool {
        self.order != 0
    }
}

#[test]
fn test_references_deduplicate() {
    use crate::ast::AstKind;

    let mut eqn = Equation::new(Ast::new(AstKind::Eq));
    eqn.add_variable(VarId(3));
    eqn.add_variable(VarId(1));
    eqn.add_variable(VarId(3));
    eqn.add_ode_variable(VarId(1));
    assert_eq!(vec![VarId(3), VarId(1)], eqn.variables);
    assert_eq!(3, eqn.reference_count());
    assert_eq!(None, eqn.sole_reference());

    eqn.variables.clear();
    assert_eq!(Some(VarId(1)), eqn.sole_reference());
}

#[test]
fn test_constancy_only_downgrades() {
    use crate::ast::AstKind;

    let mut eqn = Equation::new(Ast::new(AstKind::Eq));
    eqn.observe(Role::Unknown);
    assert_eq!(Constancy::TrueConstant, eqn.constancy);
    eqn.observe(Role::Constant);
    assert_eq!(Constancy::VariableBasedConstant, eqn.constancy);
    eqn.observe(Role::Unknown);
    assert_eq!(Constancy::VariableBasedConstant, eqn.constancy);
    eqn.observe(Role::State);
    assert_eq!(Constancy::NonConstant, eqn.constancy);
    eqn.observe(Role::ComputedTrueConstant);
    assert_eq!(Constancy::NonConstant, eqn.constancy);
}

#[test]
fn test_constancy_bounds() {
    assert_eq!(Constancy::TrueConstant, Constancy::bound_for(Role::Unknown));
    assert_eq!(
        Constancy::VariableBasedConstant,
        Constancy::bound_for(Role::Constant)
    );
    for role in [
        Role::ComputedTrueConstant,
        Role::ComputedVariableBasedConstant,
        Role::Algebraic,
        Role::State,
        Role::ShouldBeState,
        Role::IntegrationVariable,
    ] {
        assert_eq!(Constancy::NonConstant, Constancy::bound_for(role));
    }
}
