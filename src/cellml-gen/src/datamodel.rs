// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Plain, read-only records describing a model: the component
//! encapsulation tree, the variables each component declares, and the
//! connections that make variables in different components equivalent.

use serde::{Deserialize, Serialize};

#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_value: Option<String>,
}

impl Variable {
    pub fn new(name: &str) -> Self {
        Variable {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    pub fn with_initial_value(name: &str, initial_value: &str) -> Self {
        Variable {
            name: name.to_owned(),
            initial_value: Some(initial_value.to_owned()),
            ..Default::default()
        }
    }

    /// Empty initial values are treated the same as missing ones.
    pub fn is_initialized(&self) -> bool {
        self.initial_value
            .as_deref()
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false)
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    #[serde(default)]
    pub variables: Vec<Variable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub math: Option<String>,
    #[serde(default)]
    pub children: Vec<Component>,
}

impl Component {
    pub fn new(name: &str) -> Self {
        Component {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    pub fn get_variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct VariableMap {
    pub variable_1: String,
    pub variable_2: String,
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct Connection {
    pub component_1: String,
    pub component_2: String,
    #[serde(default)]
    pub variables: Vec<VariableMap>,
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl Model {
    pub fn new(name: &str) -> Self {
        Model {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    /// Depth-first search of the encapsulation tree.
    pub fn get_component(&self, name: &str) -> Option<&Component> {
        fn find<'a>(components: &'a [Component], name: &str) -> Option<&'a Component> {
            for component in components.iter() {
                if component.name == name {
                    return Some(component);
                }
                if let Some(found) = find(&component.children, name) {
                    return Some(found);
                }
            }
            None
        }

        find(&self.components, name)
    }
}

#[test]
fn test_variable_is_initialized() {
    assert!(!Variable::new("x").is_initialized());
    assert!(Variable::with_initial_value("x", "3.0").is_initialized());
    assert!(!Variable::with_initial_value("x", "  ").is_initialized());
}

#[test]
fn test_get_component() {
    let mut parent = Component::new("parent");
    parent.children.push(Component::new("child"));
    let mut model = Model::new("m");
    model.components.push(parent);
    model.components.push(Component::new("sibling"));

    assert_eq!("child", model.get_component("child").unwrap().name);
    assert_eq!("sibling", model.get_component("sibling").unwrap().name);
    assert!(model.get_component("missing").is_none());
}

#[test]
fn test_json_defaults() {
    let model: Model = serde_json::from_str(
        r#"{"name": "m", "components": [{"name": "c", "variables": [{"name": "x", "initial_value": "1"}]}]}"#,
    )
    .unwrap();
    assert_eq!(1, model.components.len());
    assert!(model.connections.is_empty());
    assert!(model.components[0].variables[0].is_initialized());
    assert!(model.components[0].math.is_none());
}
