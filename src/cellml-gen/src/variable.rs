// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Variable identity and roles.
//!
//! `Declarations` flattens every variable declared anywhere in the
//! component tree and partitions them into equivalence classes using
//! the model's connections.  `Registry` then holds one record per
//! class, created the first time any member of the class is seen.

use std::collections::HashMap;

use tracing::warn;

use crate::datamodel::{Component, Model};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclId(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Unknown,
    ShouldBeState,
    IntegrationVariable,
    State,
    Constant,
    ComputedTrueConstant,
    ComputedVariableBasedConstant,
    Algebraic,
}

impl Role {
    /// Roles which are solved by an equation and so take an index when
    /// that equation is ordered.
    pub fn is_computable(self) -> bool {
        matches!(
            self,
            Role::State
                | Role::ComputedTrueConstant
                | Role::ComputedVariableBasedConstant
                | Role::Algebraic
        )
    }

    /// Roles that occupy a slot in the shared variables array.
    pub fn is_variable_slot(self) -> bool {
        matches!(
            self,
            Role::Constant
                | Role::ComputedTrueConstant
                | Role::ComputedVariableBasedConstant
                | Role::Algebraic
        )
    }
}

#[cfg_attr(feature = "debug-derive", derive(Debug))]
#[derive(Clone, PartialEq, Eq)]
pub struct Declaration {
    pub component: usize,
    pub name: String,
    pub initial_value: Option<String>,
}

impl Declaration {
    pub fn is_initialized(&self) -> bool {
        self.initial_value
            .as_deref()
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false)
    }
}

#[cfg_attr(feature = "debug-derive", derive(Debug))]
pub struct Declarations {
    model_name: String,
    components: Vec<String>,
    decls: Vec<Declaration>,
    by_name: HashMap<(usize, String), DeclId>,
    // equivalence class id for each declaration, indexed by DeclId
    classes: Vec<usize>,
}

fn find_root(parents: &mut [usize], mut i: usize) -> usize {
    while parents[i] != i {
        parents[i] = parents[parents[i]];
        i = parents[i];
    }
    i
}

impl Declarations {
    pub fn new(model: &Model) -> Self {
        let mut decls = Declarations {
            model_name: model.name.clone(),
            components: vec![],
            decls: vec![],
            by_name: HashMap::new(),
            classes: vec![],
        };
        for component in model.components.iter() {
            decls.add_component(component);
        }

        let mut parents: Vec<usize> = (0..decls.decls.len()).collect();
        for connection in model.connections.iter() {
            let c1 = decls.component_id(&connection.component_1);
            let c2 = decls.component_id(&connection.component_2);
            let (c1, c2) = match (c1, c2) {
                (Some(c1), Some(c2)) => (c1, c2),
                _ => {
                    warn!(
                        component_1 = %connection.component_1,
                        component_2 = %connection.component_2,
                        "connection between unknown components ignored"
                    );
                    continue;
                }
            };
            for map in connection.variables.iter() {
                match (
                    decls.lookup(c1, &map.variable_1),
                    decls.lookup(c2, &map.variable_2),
                ) {
                    (Some(a), Some(b)) => {
                        let a = find_root(&mut parents, a.0);
                        let b = find_root(&mut parents, b.0);
                        // the earlier declaration is always the root, so
                        // classes do not depend on connection order
                        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
                        parents[hi] = lo;
                    }
                    _ => warn!(
                        variable_1 = %map.variable_1,
                        variable_2 = %map.variable_2,
                        "mapping between unknown variables ignored"
                    ),
                }
            }
        }
        decls.classes = (0..parents.len())
            .map(|i| find_root(&mut parents, i))
            .collect();

        decls
    }

    fn add_component(&mut self, component: &Component) {
        let id = self.components.len();
        self.components.push(component.name.clone());
        for var in component.variables.iter() {
            let decl = DeclId(self.decls.len());
            self.decls.push(Declaration {
                component: id,
                name: var.name.clone(),
                initial_value: var.initial_value.clone(),
            });
            self.by_name.entry((id, var.name.clone())).or_insert(decl);
        }
        for child in component.children.iter() {
            self.add_component(child);
        }
    }

    /// Component ids follow a depth-first walk of the component tree,
    /// the same order the generator visits components in.
    pub fn component_id(&self, name: &str) -> Option<usize> {
        self.components.iter().position(|c| c == name)
    }

    pub fn lookup(&self, component: usize, name: &str) -> Option<DeclId> {
        self.by_name.get(&(component, name.to_owned())).copied()
    }

    pub fn get(&self, decl: DeclId) -> &Declaration {
        &self.decls[decl.0]
    }

    pub fn component_name(&self, component: usize) -> &str {
        &self.components[component]
    }

    pub fn class(&self, decl: DeclId) -> usize {
        self.classes[decl.0]
    }

    /// "'x' in component 'main' of model 'm'", the way diagnostics
    /// name a variable.
    pub fn describe(&self, decl: DeclId) -> String {
        let d = self.get(decl);
        format!(
            "'{}' in component '{}' of model '{}'",
            d.name,
            self.component_name(d.component),
            self.model_name
        )
    }
}

#[cfg_attr(feature = "debug-derive", derive(Debug))]
#[derive(Clone, PartialEq, Eq)]
pub struct VariableRecord {
    /// The declaration standing in for the whole equivalence class.
    /// Replaced by an initialized member if one turns up later.
    pub decl: DeclId,
    pub role: Role,
    pub index: Option<usize>,
    pub computed: bool,
}

impl VariableRecord {
    pub fn set_declaration(&mut self, decl: DeclId, initialized: bool) {
        self.decl = decl;
        if initialized {
            self.role = match self.role {
                Role::Unknown => Role::Constant,
                Role::ShouldBeState => Role::State,
                role => role,
            };
        }
    }

    pub fn make_state(&mut self) {
        self.role = match self.role {
            Role::Unknown => Role::ShouldBeState,
            Role::Constant => Role::State,
            role => role,
        };
    }

    pub fn make_integration_variable(&mut self) {
        self.role = Role::IntegrationVariable;
    }
}

#[cfg_attr(feature = "debug-derive", derive(Debug))]
#[derive(Default)]
pub struct Registry {
    vars: Vec<VariableRecord>,
    by_class: HashMap<usize, VarId>,
}

impl Registry {
    pub fn new() -> Self {
        Default::default()
    }

    /// The canonical record for `decl`, created on first sight of any
    /// member of its equivalence class.
    pub fn intern(&mut self, decls: &Declarations, decl: DeclId) -> VarId {
        let class = decls.class(decl);
        if let Some(id) = self.by_class.get(&class) {
            return *id;
        }

        let id = VarId(self.vars.len());
        let mut record = VariableRecord {
            decl,
            role: Role::Unknown,
            index: None,
            computed: false,
        };
        record.set_declaration(decl, decls.get(decl).is_initialized());
        self.vars.push(record);
        self.by_class.insert(class, id);

        id
    }

    pub fn get(&self, id: VarId) -> &VariableRecord {
        &self.vars[id.0]
    }

    pub fn get_mut(&mut self, id: VarId) -> &mut VariableRecord {
        &mut self.vars[id.0]
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Records in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (VarId, &VariableRecord)> {
        self.vars.iter().enumerate().map(|(i, v)| (VarId(i), v))
    }

    pub fn ids(&self) -> impl Iterator<Item = VarId> + use<> {
        (0..self.vars.len()).map(VarId)
    }
}

#[cfg(test)]
fn connected_model() -> Model {
    use crate::datamodel::{Connection, Variable, VariableMap};

    let mut main = Component::new("main");
    main.variables.push(Variable::new("x"));
    main.variables.push(Variable::new("y"));
    let mut sub = Component::new("sub");
    sub.variables.push(Variable::with_initial_value("x", "1.0"));
    main.children.push(sub);
    let mut other = Component::new("other");
    other.variables.push(Variable::new("z"));

    let mut model = Model::new("m");
    model.components.push(main);
    model.components.push(other);
    model.connections.push(Connection {
        component_1: "other".to_owned(),
        component_2: "sub".to_owned(),
        variables: vec![VariableMap {
            variable_1: "z".to_owned(),
            variable_2: "x".to_owned(),
        }],
    });
    model.connections.push(Connection {
        component_1: "main".to_owned(),
        component_2: "sub".to_owned(),
        variables: vec![VariableMap {
            variable_1: "x".to_owned(),
            variable_2: "x".to_owned(),
        }],
    });
    model
}

#[test]
fn test_equivalence_is_transitive() {
    let decls = Declarations::new(&connected_model());
    let main = decls.component_id("main").unwrap();
    let sub = decls.component_id("sub").unwrap();
    let other = decls.component_id("other").unwrap();
    assert_eq!(vec![0, 1, 2], vec![main, sub, other]);

    let main_x = decls.lookup(main, "x").unwrap();
    let other_z = decls.lookup(other, "z").unwrap();
    let main_y = decls.lookup(main, "y").unwrap();
    assert_eq!(decls.class(main_x), decls.class(other_z));
    assert_ne!(decls.class(main_x), decls.class(main_y));
    assert_eq!(
        "'z' in component 'other' of model 'm'",
        decls.describe(other_z)
    );
}

#[test]
fn test_registry_interns_by_class() {
    let decls = Declarations::new(&connected_model());
    let mut registry = Registry::new();

    let other_z = decls.lookup(2, "z").unwrap();
    let sub_x = decls.lookup(1, "x").unwrap();
    let a = registry.intern(&decls, other_z);
    let b = registry.intern(&decls, sub_x);
    assert_eq!(a, b);
    assert_eq!(1, registry.len());
    // the first declaration seen stands in for the class
    assert_eq!(other_z, registry.get(a).decl);
    assert_eq!(Role::Unknown, registry.get(a).role);

    let c = registry.intern(&decls, sub_x);
    assert_eq!(a, c);
}

#[test]
fn test_role_transitions() {
    let mut record = VariableRecord {
        decl: DeclId(0),
        role: Role::Unknown,
        index: None,
        computed: false,
    };
    record.make_state();
    assert_eq!(Role::ShouldBeState, record.role);
    record.make_state();
    assert_eq!(Role::ShouldBeState, record.role);
    record.set_declaration(DeclId(1), true);
    assert_eq!(Role::State, record.role);
    assert_eq!(DeclId(1), record.decl);

    let mut record = VariableRecord {
        decl: DeclId(0),
        role: Role::Unknown,
        index: None,
        computed: false,
    };
    record.set_declaration(DeclId(0), false);
    assert_eq!(Role::Unknown, record.role);
    record.set_declaration(DeclId(0), true);
    assert_eq!(Role::Constant, record.role);
    record.make_state();
    assert_eq!(Role::State, record.role);
    record.make_integration_variable();
    assert_eq!(Role::IntegrationVariable, record.role);
    record.set_declaration(DeclId(0), true);
    assert_eq!(Role::IntegrationVariable, record.role);
}
