// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::BTreeSet;

use tracing::{debug, instrument, warn};

use crate::ast::VariableRef;
use crate::builder::build_equations;
use crate::causalize::{
    Counters, assign_constant_indices, causalize, check_roles, discover_differentials,
};
use crate::codegen::{Rendered, render, variable_name};
use crate::common::Error;
use crate::datamodel::{Component, Model};
use crate::equation::{Equation, EquationKind};
use crate::gen_err;
use crate::profile::{MathFn, Profile};
use crate::variable::{Declarations, Registry, Role};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModelType {
    Unknown,
    Algebraic,
    Ode,
}

/// Everything derived from one model.  Thrown away and rebuilt on every
/// call to `process_model`.
struct Run {
    decls: Declarations,
    registry: Registry,
    equations: Vec<Equation>,
    integration_variable: Option<VariableRef>,
    errors: Vec<Error>,
}

impl Run {
    fn new(model: &Model) -> Self {
        Run {
            decls: Declarations::new(model),
            registry: Registry::new(),
            equations: vec![],
            integration_variable: None,
            errors: vec![],
        }
    }

    fn process_component(&mut self, component: &Component, component_id: &mut usize) {
        let id = *component_id;
        *component_id += 1;

        if let Some(ref math) = component.math {
            match build_equations(math, id, &self.decls, &mut self.registry) {
                Ok(equations) => self.equations.extend(equations),
                Err(err) => {
                    warn!(component = %component.name, %err, "unable to read math");
                    self.errors.push(err);
                }
            }
        }

        for variable in component.variables.iter() {
            let decl = match self.decls.lookup(id, &variable.name) {
                Some(decl) => decl,
                None => continue,
            };
            let var = self.registry.intern(&self.decls, decl);
            let record = self.registry.get_mut(var);
            let held = record.decl;
            let initialized = self.decls.get(decl).is_initialized();
            if initialized && !self.decls.get(held).is_initialized() {
                record.set_declaration(decl, true);
            } else if held != decl && initialized {
                self.errors.push(gen_err!(
                    ConflictingInitialValues,
                    format!(
                        "Variable {} and variable {} are equivalent and cannot therefore both be initialised.",
                        self.decls.describe(decl),
                        self.decls.describe(held)
                    )
                ));
            }
        }

        for child in component.children.iter() {
            self.process_component(child, component_id);
        }
    }
}

/// Turns a model into code for the target described by a `Profile`.
///
/// `process_model` does all of the work; the remaining methods are
/// queries over its result.  Code blocks are empty whenever the model
/// had errors.
pub struct Generator {
    profile: Profile,
    run: Option<Run>,
}

impl Default for Generator {
    fn default() -> Self {
        Generator::new(Profile::c())
    }
}

impl Generator {
    pub fn new(profile: Profile) -> Self {
        Generator { profile, run: None }
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn set_profile(&mut self, profile: Profile) {
        self.profile = profile;
    }

    #[instrument(skip_all, fields(model = %model.name))]
    pub fn process_model(&mut self, model: &Model) {
        let mut run = Run::new(model);

        let mut component_id = 0;
        for component in model.components.iter() {
            run.process_component(component, &mut component_id);
        }

        if run.errors.is_empty() {
            let Run {
                ref decls,
                ref mut registry,
                ref equations,
                ref mut integration_variable,
                ref mut errors,
                ..
            } = run;
            for equation in equations.iter() {
                discover_differentials(
                    &equation.ast,
                    decls,
                    registry,
                    integration_variable,
                    errors,
                );
            }
        }

        let mut counters = Counters::default();
        assign_constant_indices(&mut run.registry, &mut counters);

        if run.errors.is_empty() {
            let resolved = causalize(&mut run.equations, &mut run.registry, &mut counters);
            debug!(
                equations = run.equations.len(),
                resolved,
                variables = run.registry.len(),
                "causalized"
            );
        }

        if run.errors.is_empty() {
            let errors = check_roles(&run.registry, &run.decls);
            run.errors.extend(errors);
        }

        self.run = Some(run);
    }

    pub fn errors(&self) -> &[Error] {
        match self.run {
            Some(ref run) => &run.errors,
            None => &[],
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors().len()
    }

    pub fn error(&self, index: usize) -> Option<&Error> {
        self.errors().get(index)
    }

    /// The run's state, but only when it produced a usable model.
    fn valid_run(&self) -> Option<&Run> {
        self.run.as_ref().filter(|run| run.errors.is_empty())
    }

    pub fn model_type(&self) -> ModelType {
        match self.valid_run() {
            None => ModelType::Unknown,
            Some(run) if run.integration_variable.is_some() => ModelType::Ode,
            Some(_) => ModelType::Algebraic,
        }
    }

    fn count_roles(&self, f: impl Fn(Role) -> bool) -> usize {
        match self.valid_run() {
            Some(run) => run.registry.iter().filter(|(_, v)| f(v.role)).count(),
            None => 0,
        }
    }

    pub fn state_count(&self) -> usize {
        self.count_roles(|role| role == Role::State)
    }

    pub fn rate_count(&self) -> usize {
        self.state_count()
    }

    pub fn variable_count(&self) -> usize {
        self.count_roles(Role::is_variable_slot)
    }

    pub fn equation_count(&self) -> usize {
        self.run.as_ref().map(|run| run.equations.len()).unwrap_or(0)
    }

    /// Name of the integration variable, as declared where it was first
    /// bound.
    pub fn variable_of_integration(&self) -> Option<&str> {
        let run = self.valid_run()?;
        let voi = run.integration_variable?;
        Some(run.decls.get(voi.decl).name.as_str())
    }

    /// Resolved equations of `kind`, in evaluation order.
    fn ordered(&self, kind: EquationKind) -> Vec<&Equation> {
        let run = match self.valid_run() {
            Some(run) => run,
            None => return vec![],
        };
        let mut equations: Vec<&Equation> = run
            .equations
            .iter()
            .filter(|eqn| eqn.kind == kind && eqn.is_resolved())
            .collect();
        equations.sort_by_key(|eqn| eqn.order);
        equations
    }

    fn render(&self, equation: &Equation) -> Rendered {
        match self.valid_run() {
            Some(run) => render(&equation.ast, &self.profile, &run.registry),
            None => Rendered::default(),
        }
    }

    fn statement(&self, code: &str) -> String {
        format!("{}{}\n", code, self.profile.command_separator)
    }

    fn block(&self, kind: EquationKind) -> String {
        self.ordered(kind)
            .into_iter()
            .map(|eqn| self.statement(&self.render(eqn).code))
            .collect()
    }

    /// Initial values of states and constants, then the true-constant
    /// equations.
    pub fn initialize_variables(&self) -> String {
        let run = match self.valid_run() {
            Some(run) => run,
            None => return String::new(),
        };

        let mut code = String::new();
        for (id, record) in run.registry.iter() {
            if !matches!(record.role, Role::State | Role::Constant) {
                continue;
            }
            let value = run
                .decls
                .get(record.decl)
                .initial_value
                .as_deref()
                .unwrap_or_default()
                .trim();
            let lvalue = variable_name(&self.profile, &run.registry, id, false);
            code.push_str(&self.statement(&format!(
                "{}{}{}",
                lvalue, self.profile.assignment, value
            )));
        }
        code.push_str(&self.block(EquationKind::TrueConstant));

        code
    }

    pub fn compute_constant_equations(&self) -> String {
        self.block(EquationKind::VariableBasedConstant)
    }

    pub fn compute_rate_equations(&self) -> String {
        self.block(EquationKind::Rate)
    }

    pub fn compute_algebraic_equations(&self) -> String {
        self.block(EquationKind::Algebraic)
    }

    /// Helper functions used by any emitted equation.
    pub fn needed_math_functions(&self) -> BTreeSet<MathFn> {
        let run = match self.valid_run() {
            Some(run) => run,
            None => return BTreeSet::new(),
        };
        run.equations
            .iter()
            .filter(|eqn| eqn.is_resolved())
            .flat_map(|eqn| self.render(eqn).needs)
            .collect()
    }

    /// Definitions for the helpers in `needed_math_functions` that the
    /// profile provides, separated by blank lines.
    pub fn needed_math_methods(&self) -> String {
        self.needed_math_functions()
            .iter()
            .filter_map(|f| self.profile.helpers.get(f))
            .map(|def| def.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
