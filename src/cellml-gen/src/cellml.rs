// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Reads CellML 1.0, 1.1 and 2.0 documents into `datamodel::Model`.
//! Units and imports are not interpreted.

use std::collections::{HashMap, HashSet};
use std::io::{BufRead, Read};

use crate::common::Result;
use crate::datamodel::{Component, Connection, Model, Variable, VariableMap};
use crate::import_err;
use crate::xml::{self, Element, MATHML_NS, Node};

fn is_cellml(element: &Element, name: &str) -> bool {
    element.name == name && !element.is_mathml()
}

fn required_attr<'a>(element: &'a Element, name: &str) -> Result<&'a str> {
    match element.attribute(name) {
        Some(value) => Ok(value),
        None => import_err!(
            XmlDeserialization,
            format!("<{}> is missing its '{}' attribute", element.name, name)
        ),
    }
}

fn read_variable(element: &Element) -> Result<Variable> {
    Ok(Variable {
        name: required_attr(element, "name")?.to_owned(),
        units: element.attribute("units").map(|u| u.to_owned()),
        initial_value: element.attribute("initial_value").map(|v| v.to_owned()),
    })
}

/// CellML 1.x allows several <math> blocks per component; they are
/// merged into a single one.
fn read_math(maths: &[&Element]) -> Result<Option<String>> {
    match maths {
        [] => Ok(None),
        [math] => math.to_markup().map(Some),
        _ => {
            let merged = Element {
                prefix: None,
                name: "math".to_owned(),
                namespace: Some(MATHML_NS.to_owned()),
                attributes: vec![],
                children: maths
                    .iter()
                    .flat_map(|math| math.mathml_elements())
                    .map(|el| Node::Element(el.clone()))
                    .collect(),
            };
            merged.to_markup().map(Some)
        }
    }
}

fn read_component(element: &Element) -> Result<Component> {
    let mut component = Component::new(required_attr(element, "name")?);
    let mut maths = vec![];
    for child in element.elements() {
        if child.is(MATHML_NS, "math") {
            maths.push(child);
        } else if is_cellml(child, "variable") {
            component.variables.push(read_variable(child)?);
        }
    }
    component.math = read_math(&maths)?;

    Ok(component)
}

fn read_connection(element: &Element) -> Result<Connection> {
    let mut connection = Connection::default();

    // CellML 2.0 puts the component names on the connection itself,
    // 1.x uses a <map_components> child.
    if let (Some(c1), Some(c2)) = (
        element.attribute("component_1"),
        element.attribute("component_2"),
    ) {
        connection.component_1 = c1.to_owned();
        connection.component_2 = c2.to_owned();
    }

    for child in element.elements() {
        if is_cellml(child, "map_components") {
            connection.component_1 = required_attr(child, "component_1")?.to_owned();
            connection.component_2 = required_attr(child, "component_2")?.to_owned();
        } else if is_cellml(child, "map_variables") {
            connection.variables.push(VariableMap {
                variable_1: required_attr(child, "variable_1")?.to_owned(),
                variable_2: required_attr(child, "variable_2")?.to_owned(),
            });
        }
    }

    if connection.component_1.is_empty() || connection.component_2.is_empty() {
        return import_err!(
            XmlDeserialization,
            "connection does not name the components it maps".to_owned()
        );
    }

    Ok(connection)
}

fn read_component_refs(
    element: &Element,
    parent: Option<&str>,
    edges: &mut Vec<(String, String)>,
) -> Result<()> {
    for child in element.elements() {
        if !is_cellml(child, "component_ref") {
            continue;
        }
        let name = required_attr(child, "component")?;
        if let Some(parent) = parent {
            edges.push((parent.to_owned(), name.to_owned()));
        }
        read_component_refs(child, Some(name), edges)?;
    }
    Ok(())
}

fn is_encapsulation_group(element: &Element) -> bool {
    is_cellml(element, "group")
        && element.elements().any(|child| {
            is_cellml(child, "relationship_ref")
                && child.attribute("relationship") == Some("encapsulation")
        })
}

fn build_tree(
    name: &str,
    components: &mut HashMap<String, Component>,
    children: &HashMap<String, Vec<String>>,
) -> Option<Component> {
    let mut component = components.remove(name)?;
    if let Some(child_names) = children.get(name) {
        for child_name in child_names.iter() {
            if let Some(child) = build_tree(child_name, components, children) {
                component.children.push(child);
            }
        }
    }
    Some(component)
}

pub fn model_from_str(source: &str) -> Result<Model> {
    let root = xml::parse(source)?;
    if !is_cellml(&root, "model") {
        return import_err!(
            XmlDeserialization,
            format!("expected a <model> root element, not <{}>", root.name)
        );
    }

    let mut model = Model::new(root.attribute("name").unwrap_or_default());

    let mut order: Vec<String> = vec![];
    let mut components: HashMap<String, Component> = HashMap::new();
    let mut edges: Vec<(String, String)> = vec![];

    for child in root.elements() {
        if is_cellml(child, "component") {
            let component = read_component(child)?;
            order.push(component.name.clone());
            components.insert(component.name.clone(), component);
        } else if is_cellml(child, "connection") {
            model.connections.push(read_connection(child)?);
        } else if is_cellml(child, "encapsulation") || is_encapsulation_group(child) {
            read_component_refs(child, None, &mut edges)?;
        }
    }

    let mut children: HashMap<String, Vec<String>> = HashMap::new();
    let mut encapsulated: HashSet<String> = HashSet::new();
    for (parent, child) in edges.into_iter() {
        for name in [&parent, &child] {
            if !components.contains_key(name) {
                return import_err!(
                    UnknownComponent,
                    format!("encapsulation refers to unknown component '{name}'")
                );
            }
        }
        encapsulated.insert(child.clone());
        children.entry(parent).or_default().push(child);
    }

    for connection in model.connections.iter() {
        let (c1, c2) = match (
            components.get(&connection.component_1),
            components.get(&connection.component_2),
        ) {
            (Some(c1), Some(c2)) => (c1, c2),
            (None, _) | (_, None) => {
                return import_err!(
                    UnknownComponent,
                    format!(
                        "connection between '{}' and '{}' refers to an unknown component",
                        connection.component_1, connection.component_2
                    )
                );
            }
        };
        for map in connection.variables.iter() {
            for (component, name) in [(c1, &map.variable_1), (c2, &map.variable_2)] {
                if component.get_variable(name).is_none() {
                    return import_err!(
                        UnknownVariable,
                        format!(
                            "connection refers to unknown variable '{}' in component '{}'",
                            name, component.name
                        )
                    );
                }
            }
        }
    }

    for name in order.iter().filter(|name| !encapsulated.contains(*name)) {
        if let Some(component) = build_tree(name, &mut components, &children) {
            model.components.push(component);
        }
    }

    Ok(model)
}

pub fn model_from_reader(reader: &mut dyn BufRead) -> Result<Model> {
    let mut source = String::new();
    if let Err(err) = reader.read_to_string(&mut source) {
        return import_err!(XmlDeserialization, err.to_string());
    }
    model_from_str(&source)
}

#[cfg(test)]
const CELLML_2_MODEL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<model xmlns="http://www.cellml.org/cellml/2.0#" name="nested">
  <component name="main">
    <variable name="time" units="second" interface="public_and_private"/>
    <variable name="x" units="dimensionless" initial_value="3.0" interface="public_and_private"/>
    <math xmlns="http://www.w3.org/1998/Math/MathML" xmlns:cellml="http://www.cellml.org/cellml/2.0#">
      <apply><eq/>
        <apply><diff/><bvar><ci>time</ci></bvar><ci>x</ci></apply>
        <cn cellml:units="dimensionless">5.0</cn>
      </apply>
    </math>
  </component>
  <component name="sub">
    <variable name="time" units="second" interface="public"/>
  </component>
  <component name="other"/>
  <encapsulation>
    <component_ref component="main">
      <component_ref component="sub"/>
    </component_ref>
  </encapsulation>
  <connection component_1="main" component_2="sub">
    <map_variables variable_1="time" variable_2="time"/>
  </connection>
</model>
"#;

#[test]
fn test_read_cellml_2() {
    let model = model_from_str(CELLML_2_MODEL).unwrap();
    assert_eq!("nested", model.name);

    let names: Vec<_> = model.components.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(vec!["main", "other"], names);

    let main = &model.components[0];
    assert_eq!(1, main.children.len());
    assert_eq!("sub", main.children[0].name);
    assert_eq!(
        Some("3.0"),
        main.get_variable("x").unwrap().initial_value.as_deref()
    );
    assert_eq!(
        Some("second"),
        main.get_variable("time").unwrap().units.as_deref()
    );

    let math = xml::parse(main.math.as_deref().unwrap()).unwrap();
    assert!(math.is(MATHML_NS, "math"));
    assert_eq!(1, math.mathml_elements().count());

    assert_eq!(1, model.connections.len());
    assert_eq!("main", model.connections[0].component_1);
    assert_eq!("time", model.connections[0].variables[0].variable_2);
}

#[test]
fn test_read_cellml_1_1() {
    let source = r#"<model xmlns="http://www.cellml.org/cellml/1.1#" name="old">
  <component name="a">
    <variable name="v" initial_value="1"/>
    <math xmlns="http://www.w3.org/1998/Math/MathML"><apply><eq/><ci>w</ci><cn>1</cn></apply></math>
    <math xmlns="http://www.w3.org/1998/Math/MathML"><apply><eq/><ci>z</ci><cn>2</cn></apply></math>
  </component>
  <component name="b">
    <variable name="v"/>
  </component>
  <group>
    <relationship_ref relationship="encapsulation"/>
    <component_ref component="b"><component_ref component="a"/></component_ref>
  </group>
  <connection>
    <map_components component_1="a" component_2="b"/>
    <map_variables variable_1="v" variable_2="v"/>
  </connection>
</model>"#;
    let model = model_from_str(source).unwrap();
    assert_eq!(1, model.components.len());
    assert_eq!("b", model.components[0].name);
    assert_eq!("a", model.components[0].children[0].name);

    let a = &model.components[0].children[0];
    let math = xml::parse(a.math.as_deref().unwrap()).unwrap();
    assert_eq!(2, math.mathml_elements().count());

    assert_eq!("a", model.connections[0].component_1);
    assert_eq!("b", model.connections[0].component_2);
}

#[test]
fn test_read_errors() {
    assert!(model_from_str("<component name='x'/>").is_err());

    let err = model_from_str(
        r#"<model name="m"><connection component_1="a" component_2="b"/></model>"#,
    )
    .unwrap_err();
    assert_eq!(crate::common::ErrorCode::UnknownComponent, err.code);

    let err = model_from_str(r#"<model name="m"><component/></model>"#).unwrap_err();
    assert_eq!(crate::common::ErrorCode::XmlDeserialization, err.code);

    let err = model_from_str(
        r#"<model name="m">
  <component name="a"><variable name="v"/></component>
  <component name="b"/>
  <connection component_1="a" component_2="b"><map_variables variable_1="v" variable_2="v"/></connection>
</model>"#,
    )
    .unwrap_err();
    assert_eq!(crate::common::ErrorCode::UnknownVariable, err.code);
    assert_eq!(
        Some("connection refers to unknown variable 'v' in component 'b'"),
        err.details.as_deref()
    );
}
