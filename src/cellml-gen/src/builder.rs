// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Builds expression trees from MathML content markup.
//!
//! Instead of keeping parent pointers in the tree, the ancestry a node
//! needs (is this `eq` a whole equation, is this `ci` an operand of
//! `diff`) is threaded down through `Context` while descending.

use std::collections::HashMap;

use lazy_static::lazy_static;
use tracing::{debug, warn};

use crate::ast::{Ast, AstKind, VariableRef};
use crate::common::Result;
use crate::equation::Equation;
use crate::import_err;
use crate::variable::{Declarations, Registry};
use crate::xml::{self, Element, MATHML_NS, Node};

lazy_static! {
    static ref OPERATORS: HashMap<&'static str, AstKind> = {
        use AstKind::*;
        let mut m = HashMap::new();
        m.insert("neq", Neq);
        m.insert("lt", Lt);
        m.insert("leq", Leq);
        m.insert("gt", Gt);
        m.insert("geq", Geq);
        m.insert("and", And);
        m.insert("or", Or);
        m.insert("xor", Xor);
        m.insert("not", Not);
        m.insert("plus", Plus);
        m.insert("minus", Minus);
        m.insert("times", Times);
        m.insert("divide", Divide);
        m.insert("power", Power);
        m.insert("root", Root);
        m.insert("abs", Abs);
        m.insert("exp", Exp);
        m.insert("ln", Ln);
        m.insert("log", Log);
        m.insert("ceiling", Ceiling);
        m.insert("floor", Floor);
        m.insert("factorial", Factorial);
        m.insert("min", Min);
        m.insert("max", Max);
        m.insert("gcd", Gcd);
        m.insert("lcm", Lcm);
        m.insert("rem", Rem);
        m.insert("diff", Diff);
        m.insert("sin", Sin);
        m.insert("cos", Cos);
        m.insert("tan", Tan);
        m.insert("sec", Sec);
        m.insert("csc", Csc);
        m.insert("cot", Cot);
        m.insert("sinh", Sinh);
        m.insert("cosh", Cosh);
        m.insert("tanh", Tanh);
        m.insert("sech", Sech);
        m.insert("csch", Csch);
        m.insert("coth", Coth);
        m.insert("arcsin", Asin);
        m.insert("arccos", Acos);
        m.insert("arctan", Atan);
        m.insert("arcsec", Asec);
        m.insert("arccsc", Acsc);
        m.insert("arccot", Acot);
        m.insert("arcsinh", Asinh);
        m.insert("arccosh", Acosh);
        m.insert("arctanh", Atanh);
        m.insert("arcsech", Asech);
        m.insert("arccsch", Acsch);
        m.insert("arccoth", Acoth);
        m.insert("true", True);
        m.insert("false", False);
        m.insert("exponentiale", E);
        m.insert("pi", Pi);
        m.insert("infinity", Inf);
        m.insert("notanumber", Nan);
        m
    };
}

#[derive(Copy, Clone, Default)]
struct Context {
    /// The node is a direct child of <math>.
    top_level: bool,
    /// The node is an operand of an apply whose operator is diff, or
    /// sits in the bvar of one.
    diff_operand: bool,
}

struct Builder<'a> {
    decls: &'a Declarations,
    registry: &'a mut Registry,
    component: usize,
    variables: Vec<VariableRef>,
    ode_variables: Vec<VariableRef>,
    /// Elements of the current statement that could not become a node.
    /// Any entry here drops the whole statement.
    rejected: Vec<String>,
}

/// The literal text of a `cn`.  Numbers split by `<sep/>` are only
/// understood in e-notation, where `1<sep/>3` reads as `1e3`.
fn number(element: &Element) -> Option<String> {
    let mut parts = vec![];
    let mut current = String::new();
    for child in element.children.iter() {
        match child {
            Node::Text(text) => current.push_str(text),
            Node::Element(el) if el.name == "sep" => parts.push(std::mem::take(&mut current)),
            Node::Element(_) => return None,
        }
    }
    parts.push(current);

    match (parts.as_slice(), element.attribute("type")) {
        ([value], _) => Some(value.trim().to_owned()),
        ([mantissa, exponent], Some("e-notation")) => {
            Some(format!("{}e{}", mantissa.trim(), exponent.trim()))
        }
        _ => None,
    }
}

impl Builder<'_> {
    fn build(&mut self, element: &Element, ctx: Context) -> Option<Ast> {
        let inner = Context {
            top_level: false,
            diff_operand: false,
        };
        match element.name.as_str() {
            "apply" => self.build_apply(element, ctx),
            "piecewise" => {
                let pieces: Vec<Option<Ast>> = element
                    .mathml_elements()
                    .map(|el| self.build(el, inner))
                    .collect();
                let node = Ast::new(AstKind::Piecewise);
                Some(fold_operands(node.clone(), pieces, || node.clone()))
            }
            "piece" => {
                let mut children = element.mathml_elements();
                let value = children.next().and_then(|el| self.build(el, inner));
                let condition = children.next().and_then(|el| self.build(el, inner));
                Some(Ast::new(AstKind::Piece).with_children(value, condition))
            }
            "otherwise" | "degree" | "logbase" => {
                let kind = match element.name.as_str() {
                    "otherwise" => AstKind::Otherwise,
                    "degree" => AstKind::Degree,
                    _ => AstKind::Logbase,
                };
                let child = element
                    .mathml_elements()
                    .next()
                    .and_then(|el| self.build(el, inner));
                Some(Ast::new(kind).with_children(child, None))
            }
            "bvar" => {
                // the bound variable keeps the diff context so it is
                // recorded as an ODE reference
                let ctx = Context {
                    top_level: false,
                    diff_operand: ctx.diff_operand,
                };
                let mut children = element.mathml_elements();
                let left = children.next().and_then(|el| self.build(el, ctx));
                let right = children.next().and_then(|el| self.build(el, ctx));
                Some(Ast::new(AstKind::Bvar).with_children(left, right))
            }
            "cn" => match number(element) {
                Some(value) => Some(Ast::literal(&value)),
                None => {
                    debug!(kind = ?element.attribute("type"), "unsupported number");
                    self.reject(element)
                }
            },
            "ci" => self.reference(element, ctx),
            _ => self.operator(element, ctx),
        }
    }

    fn reject(&mut self, element: &Element) -> Option<Ast> {
        self.rejected.push(element.name.clone());
        None
    }

    fn operator(&mut self, element: &Element, ctx: Context) -> Option<Ast> {
        if element.name == "eq" {
            let kind = if ctx.top_level {
                AstKind::Eq
            } else {
                AstKind::EqEq
            };
            return Some(Ast::new(kind));
        }
        match OPERATORS.get(element.name.as_str()) {
            Some(kind) => Some(Ast::new(*kind)),
            None => {
                debug!(element = %element.name, "unsupported MathML element");
                self.reject(element)
            }
        }
    }

    fn build_apply(&mut self, element: &Element, ctx: Context) -> Option<Ast> {
        let mut children = element.mathml_elements();
        let op = children.next()?;
        let node = self.operator(op, ctx)?;

        let operand_ctx = Context {
            top_level: false,
            diff_operand: op.name == "diff",
        };
        let operands: Vec<Option<Ast>> = children
            .map(|el| self.build(el, operand_ctx))
            .collect();

        Some(fold_operands(node.clone(), operands, || node.clone()))
    }

    fn reference(&mut self, element: &Element, ctx: Context) -> Option<Ast> {
        let name = element.text();
        let decl = match self.decls.lookup(self.component, &name) {
            Some(decl) => decl,
            None => {
                warn!(
                    variable = %name,
                    component = %self.decls.component_name(self.component),
                    "reference to undeclared variable"
                );
                return self.reject(element);
            }
        };
        let var = self.registry.intern(self.decls, decl);
        let variable = VariableRef { var, decl };
        if ctx.diff_operand {
            self.ode_variables.push(variable);
        } else {
            self.variables.push(variable);
        }
        Some(Ast::variable(variable))
    }
}

/// Attaches operands to `node`: the first becomes its left child and
/// the rest hang off a right-leaning chain, so `a+b+c+d` becomes
/// `a + (b + (c + d))`.
fn fold_operands(node: Ast, mut operands: Vec<Option<Ast>>, link: impl Fn() -> Ast) -> Ast {
    if operands.is_empty() {
        return node;
    }
    let first = operands.remove(0);

    let mut right = operands.pop().flatten();
    while let Some(operand) = operands.pop() {
        right = Some(link().with_children(operand, right));
    }

    node.with_children(first, right)
}

/// Builds one equation per top-level statement of a component's math.
pub fn build_equations(
    math: &str,
    component: usize,
    decls: &Declarations,
    registry: &mut Registry,
) -> Result<Vec<Equation>> {
    let root = xml::parse(math)?;
    if !root.is(MATHML_NS, "math") {
        return import_err!(
            BadMathml,
            format!("expected a MathML <math> element, not <{}>", root.name)
        );
    }

    let mut builder = Builder {
        decls,
        registry,
        component,
        variables: vec![],
        ode_variables: vec![],
        rejected: vec![],
    };

    let mut equations = vec![];
    for statement in root.mathml_elements() {
        builder.variables.clear();
        builder.ode_variables.clear();
        builder.rejected.clear();

        let ctx = Context {
            top_level: true,
            diff_operand: false,
        };
        let ast = match builder.build(statement, ctx) {
            Some(ast) if builder.rejected.is_empty() => ast,
            _ => {
                warn!(
                    element = %statement.name,
                    rejected = ?builder.rejected,
                    "statement produced no equation"
                );
                continue;
            }
        };
        let mut equation = Equation::new(ast);
        for v in builder.variables.iter() {
            equation.add_variable(v.var);
        }
        for v in builder.ode_variables.iter() {
            equation.add_ode_variable(v.var);
        }
        equations.push(equation);
    }

    Ok(equations)
}

#[cfg(test)]
fn test_decls(variables: &[&str]) -> Declarations {
    use crate::datamodel::{Component, Model, Variable};

    let mut component = Component::new("main");
    for name in variables.iter() {
        component.variables.push(Variable::new(name));
    }
    let mut model = Model::new("m");
    model.components.push(component);
    Declarations::new(&model)
}

#[cfg(test)]
fn math(body: &str) -> String {
    format!(r#"<math xmlns="http://www.w3.org/1998/Math/MathML">{body}</math>"#)
}

#[test]
fn test_associative_chain_leans_right() {
    let decls = test_decls(&["x", "a", "b", "c", "d", "e"]);
    let mut registry = Registry::new();
    let eqns = build_equations(
        &math("<apply><eq/><ci>x</ci><apply><plus/><ci>a</ci><ci>b</ci><ci>c</ci><ci>d</ci><ci>e</ci></apply></apply>"),
        0,
        &decls,
        &mut registry,
    )
    .unwrap();
    assert_eq!(1, eqns.len());

    let eqn = &eqns[0];
    assert_eq!(AstKind::Eq, eqn.ast.kind);
    let mut node = eqn.ast.right().unwrap();
    let mut names = vec![];
    loop {
        assert_eq!(AstKind::Plus, node.kind);
        let left = node.left().unwrap();
        names.push(decls.get(left.variable.unwrap().decl).name.clone());
        let right = node.right().unwrap();
        if right.kind == AstKind::Ci {
            names.push(decls.get(right.variable.unwrap().decl).name.clone());
            break;
        }
        node = right;
    }
    assert_eq!(vec!["a", "b", "c", "d", "e"], names);

    // references are recorded once each, in document order
    assert_eq!(6, eqn.variables.len());
    assert!(eqn.ode_variables.is_empty());
    assert_eq!(6, registry.len());
}

#[test]
fn test_nested_eq_is_equality_test() {
    let decls = test_decls(&["x", "a", "b"]);
    let mut registry = Registry::new();
    let eqns = build_equations(
        &math("<apply><eq/><ci>x</ci><apply><eq/><ci>a</ci><ci>b</ci></apply></apply>"),
        0,
        &decls,
        &mut registry,
    )
    .unwrap();
    assert_eq!(AstKind::Eq, eqns[0].ast.kind);
    assert_eq!(AstKind::EqEq, eqns[0].ast.right().unwrap().kind);
}

#[test]
fn test_diff_operands_are_ode_references() {
    let decls = test_decls(&["t", "x", "k"]);
    let mut registry = Registry::new();
    let eqns = build_equations(
        &math(
            "<apply><eq/><apply><diff/><bvar><ci>t</ci><degree><cn>2</cn></degree></bvar><ci>x</ci></apply><apply><times/><ci>k</ci><ci>x</ci></apply></apply>",
        ),
        0,
        &decls,
        &mut registry,
    )
    .unwrap();
    let eqn = &eqns[0];
    let t = registry.intern(&decls, decls.lookup(0, "t").unwrap());
    let x = registry.intern(&decls, decls.lookup(0, "x").unwrap());
    let k = registry.intern(&decls, decls.lookup(0, "k").unwrap());
    assert_eq!(vec![t, x], eqn.ode_variables);
    assert_eq!(vec![k, x], eqn.variables);

    let diff = eqn.ast.left().unwrap();
    assert_eq!(AstKind::Diff, diff.kind);
    let bvar = diff.left().unwrap();
    assert_eq!(AstKind::Bvar, bvar.kind);
    let degree = bvar.right().unwrap();
    assert_eq!(AstKind::Degree, degree.kind);
    assert_eq!(Some("2"), degree.left().unwrap().value.as_deref());
    assert_eq!(AstKind::Ci, diff.right().unwrap().kind);
}

#[test]
fn test_piecewise_chain() {
    let decls = test_decls(&["x", "a", "b"]);
    let mut registry = Registry::new();
    let eqns = build_equations(
        &math(
            "<apply><eq/><ci>x</ci><piecewise>\
             <piece><cn>1</cn><apply><lt/><ci>a</ci><ci>b</ci></apply></piece>\
             <piece><cn>2</cn><apply><gt/><ci>a</ci><ci>b</ci></apply></piece>\
             <otherwise><cn>3</cn></otherwise></piecewise></apply>",
        ),
        0,
        &decls,
        &mut registry,
    )
    .unwrap();
    let pw = eqns[0].ast.right().unwrap();
    assert_eq!(AstKind::Piecewise, pw.kind);
    assert_eq!(AstKind::Piece, pw.left().unwrap().kind);
    let rest = pw.right().unwrap();
    assert_eq!(AstKind::Piecewise, rest.kind);
    assert_eq!(AstKind::Piece, rest.left().unwrap().kind);
    assert_eq!(AstKind::Otherwise, rest.right().unwrap().kind);

    let piece = pw.left().unwrap();
    assert_eq!(Some("1"), piece.left().unwrap().value.as_deref());
    assert_eq!(AstKind::Lt, piece.right().unwrap().kind);
}

#[test]
fn test_unsupported_elements() {
    let decls = test_decls(&["x"]);
    let mut registry = Registry::new();
    let eqns = build_equations(
        &math("<apply><eq/><ci>x</ci><apply><csymbol>f</csymbol><cn>1</cn></apply></apply><semantics/>"),
        0,
        &decls,
        &mut registry,
    )
    .unwrap();
    // neither the unknown top-level element nor the statement using an
    // unknown operator yields an equation
    assert!(eqns.is_empty());

    assert!(build_equations("<apply/>", 0, &decls, &mut registry).is_err());
}

#[test]
fn test_statement_with_holes_is_dropped() {
    let decls = test_decls(&["x", "y", "a"]);
    let mut registry = Registry::new();
    let eqns = build_equations(
        &math(
            "<apply><eq/><ci>x</ci><apply><plus/><ci>a</ci><apply><arg/><ci>a</ci></apply></apply></apply>\
             <apply><eq/><ci>y</ci><ci>missing</ci></apply>\
             <apply><eq/><ci>y</ci><apply><times/><cn>2</cn><ci>a</ci></apply></apply>",
        ),
        0,
        &decls,
        &mut registry,
    )
    .unwrap();
    // only the last statement is complete, and the rejections of the
    // earlier ones do not leak into it
    assert_eq!(1, eqns.len());
    let y = registry.intern(&decls, decls.lookup(0, "y").unwrap());
    let a = registry.intern(&decls, decls.lookup(0, "a").unwrap());
    assert_eq!(vec![y, a], eqns[0].variables);
    assert_eq!(AstKind::Times, eqns[0].ast.right().unwrap().kind);
}

#[test]
fn test_numbers_with_separators() {
    let decls = test_decls(&["x", "y", "z"]);
    let mut registry = Registry::new();
    let eqns = build_equations(
        &math(
            "<apply><eq/><ci>x</ci><cn type=\"e-notation\">1<sep/>3</cn></apply>\
             <apply><eq/><ci>y</ci><cn type=\"rational\">1<sep/>3</cn></apply>\
             <apply><eq/><ci>z</ci><cn> 2.5 </cn></apply>",
        ),
        0,
        &decls,
        &mut registry,
    )
    .unwrap();
    // a rational has no plain literal form, so y has no equation
    assert_eq!(2, eqns.len());
    assert_eq!(Some("1e3"), eqns[0].ast.right().unwrap().value.as_deref());
    assert_eq!(Some("2.5"), eqns[1].ast.right().unwrap().value.as_deref());
}
