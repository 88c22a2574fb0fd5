// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Renders expression trees as target-language text.

use std::collections::BTreeSet;

use float_cmp::approx_eq;

use crate::ast::{Ast, AstKind};
use crate::profile::{MathFn, Profile};
use crate::variable::{Registry, Role, VarId};

/// The text for one tree, along with the helper functions it calls.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Rendered {
    pub code: String,
    pub needs: BTreeSet<MathFn>,
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// Renders `ast` using `profile`, with variable slots taken from
/// `registry`.
pub fn render(ast: &Ast, profile: &Profile, registry: &Registry) -> Rendered {
    let mut emitter = Emitter {
        profile,
        registry,
        needs: BTreeSet::new(),
    };
    let code = emitter.code(ast);
    Rendered {
        code,
        needs: emitter.needs,
    }
}

/// The array slot a variable lives in: `states[i]` (or `rates[i]` for
/// the derivative of a state), `variables[i]`, or the integration
/// variable's own name.
pub fn variable_name(profile: &Profile, registry: &Registry, var: VarId, rate: bool) -> String {
    let record = registry.get(var);
    let index = record.index.map(|i| i.to_string()).unwrap_or_default();
    match record.role {
        Role::IntegrationVariable => profile.voi.clone(),
        Role::State if rate => format!("{}[{}]", profile.rates, index),
        Role::State => format!("{}[{}]", profile.states, index),
        _ => format!("{}[{}]", profile.variables, index),
    }
}

fn literal_value(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok()
}

fn is_literal(text: &str, value: f64) -> bool {
    literal_value(text)
        .map(|v| approx_eq!(f64, v, value))
        .unwrap_or(false)
}

struct Emitter<'a> {
    profile: &'a Profile,
    registry: &'a Registry,
    needs: BTreeSet<MathFn>,
}

impl Emitter<'_> {
    fn child(&mut self, child: Option<&Ast>) -> String {
        match child {
            Some(child) => self.code(child),
            None => String::new(),
        }
    }

    fn left(&mut self, ast: &Ast) -> String {
        self.child(ast.left())
    }

    fn right(&mut self, ast: &Ast) -> String {
        self.child(ast.right())
    }

    fn needs_parens(&self, parent: AstKind, side: Side, child: &Ast) -> bool {
        use AstKind::*;

        let base = child.is_relational() || child.is_logical() || child.kind == Piecewise;
        match parent {
            Plus => base,
            Minus => match side {
                Side::Left => base,
                Side::Right => base || child.kind == Minus || child.is_binary_plus(),
            },
            Times => base || child.is_binary_plus_minus(),
            Divide => match side {
                Side::Left => base || child.is_binary_plus_minus(),
                Side::Right => {
                    base || matches!(child.kind, Times | Divide) || child.is_binary_plus_minus()
                }
            },
            And | Or | Xor => {
                let infix_power =
                    self.profile.has_power_operator && matches!(child.kind, Power | Root);
                let other_logical = child.is_logical() && child.kind != parent;
                child.is_relational()
                    || child.kind == Piecewise
                    || other_logical
                    || child.is_binary_plus_minus()
                    || infix_power
            }
            // power's base and root's radicand
            Power if side == Side::Left => {
                base || matches!(child.kind, Minus | Times | Divide) || child.is_binary_plus()
            }
            Root if side == Side::Right => {
                base || matches!(child.kind, Minus | Times | Divide) || child.is_binary_plus()
            }
            // exponents and degrees
            Power | Root => {
                base || matches!(child.kind, Minus | Times | Divide | Power | Root)
                    || child.is_binary_plus()
            }
            _ => false,
        }
    }

    fn side(&mut self, ast: &Ast, side: Side) -> String {
        let child = match side {
            Side::Left => ast.left(),
            Side::Right => ast.right(),
        };
        let child = match child {
            Some(child) => child,
            None => return String::new(),
        };
        let code = self.code(child);
        if self.needs_parens(ast.kind, side, child) {
            format!("({code})")
        } else {
            code
        }
    }

    fn operator(&mut self, ast: &Ast, op: &str) -> String {
        let left = self.side(ast, Side::Left);
        let right = self.side(ast, Side::Right);
        if ast.kind == AstKind::Root {
            // right is the radicand, left the degree
            format!("{right}{op}(1.0/{left})")
        } else {
            format!("{left}{op}{right}")
        }
    }

    fn function(&mut self, name: &str, ast: &Ast) -> String {
        let arg = self.left(ast);
        format!("{name}({arg})")
    }

    fn function2(&mut self, name: &str, ast: &Ast) -> String {
        let left = self.left(ast);
        let right = self.right(ast);
        format!("{name}({left}, {right})")
    }

    /// min/max/gcd/lcm of more than two operands arrive as a right
    /// chain of the same operator and are emitted as one call.
    fn variadic(&mut self, name: &str, ast: &Ast) -> String {
        let mut args = vec![self.left(ast)];
        let mut next = ast.right();
        while let Some(node) = next {
            if node.kind == ast.kind {
                args.push(self.left(node));
                next = node.right();
            } else {
                args.push(self.code(node));
                next = None;
            }
        }
        format!("{}({})", name, args.join(", "))
    }

    fn unary_minus(&mut self, ast: &Ast) -> String {
        let operand = match ast.left() {
            Some(operand) => operand,
            None => return self.profile.minus.clone(),
        };
        let code = self.code(operand);
        let wrap = operand.is_relational()
            || operand.is_logical()
            || matches!(operand.kind, AstKind::Plus | AstKind::Minus | AstKind::Piecewise);
        if wrap {
            format!("{}({})", self.profile.minus, code)
        } else {
            format!("{}{}", self.profile.minus, code)
        }
    }

    fn conditional_if(&self, condition: &str, value: &str) -> String {
        let template = if self.profile.has_conditional_operator {
            &self.profile.conditional_if
        } else {
            &self.profile.piecewise_if
        };
        template
            .replacen("#cond", condition, 1)
            .replacen("#if", value, 1)
    }

    fn conditional_else(&self, value: &str) -> String {
        let template = if self.profile.has_conditional_operator {
            &self.profile.conditional_else
        } else {
            &self.profile.piecewise_else
        };
        template.replacen("#else", value, 1)
    }

    fn power(&mut self, ast: &Ast) -> String {
        let p = self.profile;
        let exponent = self.right(ast);
        if is_literal(&exponent, 0.5) {
            return self.function(&p.square_root, ast);
        }
        if is_literal(&exponent, 2.0) {
            self.needs.insert(MathFn::Square);
            return self.function(&p.square, ast);
        }
        if p.has_power_operator {
            self.operator(ast, &p.power)
        } else {
            let base = self.left(ast);
            format!("{}({}, {})", p.power, base, exponent)
        }
    }

    fn root(&mut self, ast: &Ast) -> String {
        let p = self.profile;
        if ast.right().is_none() {
            return self.function(&p.square_root, ast);
        }
        let degree = self.left(ast);
        if is_literal(&degree, 2.0) {
            let radicand = self.right(ast);
            return format!("{}({})", p.square_root, radicand);
        }
        if p.has_power_operator {
            self.operator(ast, &p.power)
        } else {
            let radicand = self.right(ast);
            format!("{}({}, 1.0/{})", p.power, radicand, degree)
        }
    }

    fn log(&mut self, ast: &Ast) -> String {
        let p = self.profile;
        if ast.right().is_none() {
            return self.function(&p.log10, ast);
        }
        let base = self.left(ast);
        let arg = self.right(ast);
        if is_literal(&base, 10.0) {
            format!("{}({})", p.log10, arg)
        } else {
            format!("{ln}({arg})/{ln}({base})", ln = p.ln)
        }
    }

    fn piecewise(&mut self, ast: &Ast) -> String {
        let first = self.left(ast);
        match ast.right() {
            Some(rest) if rest.kind == AstKind::Piece => {
                let piece = self.code(rest);
                let fallback = self.conditional_else(&self.profile.nan);
                format!("{}{}", first, self.conditional_else(&(piece + &fallback)))
            }
            Some(rest) => {
                let rest = self.code(rest);
                format!("{}{}", first, self.conditional_else(&rest))
            }
            None => format!("{}{}", first, self.conditional_else(&self.profile.nan)),
        }
    }

    fn code(&mut self, ast: &Ast) -> String {
        use AstKind::*;

        let p = self.profile;
        match ast.kind {
            Eq => self.operator(ast, &p.assignment),
            EqEq => self.operator(ast, &p.eq),
            Neq => self.operator(ast, &p.neq),
            Lt => self.operator(ast, &p.lt),
            Leq => self.operator(ast, &p.leq),
            Gt => self.operator(ast, &p.gt),
            Geq => self.operator(ast, &p.geq),

            And => self.operator(ast, &p.and),
            Or => self.operator(ast, &p.or),
            Xor => {
                if p.has_xor_operator {
                    self.operator(ast, &p.xor)
                } else {
                    self.needs.insert(MathFn::Xor);
                    self.function2(&p.xor, ast)
                }
            }
            Not => {
                let operand = self.left(ast);
                format!("{}{}", p.not, operand)
            }

            Plus if ast.right().is_none() => self.left(ast),
            Plus => self.operator(ast, &p.plus),
            Minus if ast.right().is_none() => self.unary_minus(ast),
            Minus => self.operator(ast, &p.minus),
            Times => self.operator(ast, &p.times),
            Divide => self.operator(ast, &p.divide),
            Power => self.power(ast),
            Root => self.root(ast),
            Abs => self.function(&p.abs, ast),
            Exp => self.function(&p.exp, ast),
            Ln => self.function(&p.ln, ast),
            Log => self.log(ast),
            Ceiling => self.function(&p.ceiling, ast),
            Floor => self.function(&p.floor, ast),
            Factorial => {
                self.needs.insert(MathFn::Factorial);
                self.function(&p.factorial, ast)
            }
            Min => {
                self.needs.insert(MathFn::Min);
                self.variadic(&p.min, ast)
            }
            Max => {
                self.needs.insert(MathFn::Max);
                self.variadic(&p.max, ast)
            }
            Gcd => {
                self.needs.insert(MathFn::Gcd);
                self.variadic(&p.gcd, ast)
            }
            Lcm => {
                self.needs.insert(MathFn::Lcm);
                self.variadic(&p.lcm, ast)
            }
            Rem => self.function2(&p.rem, ast),

            // only the derivative's slot shows up in generated code
            Diff => match ast.right() {
                Some(node) if node.kind == Ci => match node.variable {
                    Some(v) => variable_name(p, self.registry, v.var, true),
                    None => String::new(),
                },
                other => self.child(other),
            },

            Sin => self.function(&p.sin, ast),
            Cos => self.function(&p.cos, ast),
            Tan => self.function(&p.tan, ast),
            Sinh => self.function(&p.sinh, ast),
            Cosh => self.function(&p.cosh, ast),
            Tanh => self.function(&p.tanh, ast),
            Asin => self.function(&p.asin, ast),
            Acos => self.function(&p.acos, ast),
            Atan => self.function(&p.atan, ast),
            Asinh => self.function(&p.asinh, ast),
            Acosh => self.function(&p.acosh, ast),
            Atanh => self.function(&p.atanh, ast),
            Sec | Csc | Cot | Sech | Csch | Coth | Asec | Acsc | Acot | Asech | Acsch | Acoth => {
                let (need, name) = match ast.kind {
                    Sec => (MathFn::Sec, &p.sec),
                    Csc => (MathFn::Csc, &p.csc),
                    Cot => (MathFn::Cot, &p.cot),
                    Sech => (MathFn::Sech, &p.sech),
                    Csch => (MathFn::Csch, &p.csch),
                    Coth => (MathFn::Coth, &p.coth),
                    Asec => (MathFn::Asec, &p.asec),
                    Acsc => (MathFn::Acsc, &p.acsc),
                    Acot => (MathFn::Acot, &p.acot),
                    Asech => (MathFn::Asech, &p.asech),
                    Acsch => (MathFn::Acsch, &p.acsch),
                    _ => (MathFn::Acoth, &p.acoth),
                };
                self.needs.insert(need);
                self.function(name, ast)
            }

            Piecewise => self.piecewise(ast),
            Piece => {
                let value = self.left(ast);
                let condition = self.right(ast);
                self.conditional_if(&condition, &value)
            }
            Otherwise => self.left(ast),

            Ci => match ast.variable {
                Some(v) => variable_name(p, self.registry, v.var, false),
                None => String::new(),
            },
            Cn => ast.value.clone().unwrap_or_default(),

            Degree | Logbase | Bvar => self.left(ast),

            True => p.true_value.clone(),
            False => p.false_value.clone(),
            E => p.e.clone(),
            Pi => p.pi.clone(),
            Inf => p.inf.clone(),
            Nan => p.nan.clone(),
        }
    }
}

#[test]
fn test_literal_values() {
    assert!(is_literal("2.0", 2.0));
    assert!(is_literal(" 2 ", 2.0));
    assert!(is_literal("0.5", 0.5));
    assert!(!is_literal("variables[2]", 2.0));
    assert!(!is_literal("2.5", 2.0));
}

#[cfg(test)]
fn cn(value: &str) -> Ast {
    Ast::literal(value)
}

#[cfg(test)]
fn op(kind: AstKind, left: Ast, right: Option<Ast>) -> Ast {
    Ast::new(kind).with_children(Some(left), right)
}

#[test]
fn test_render_without_variables() {
    let registry = Registry::new();
    let c = Profile::c();

    // (1 - 2) * 3: binary minus under times is wrapped
    let ast = op(
        AstKind::Times,
        op(AstKind::Minus, cn("1"), Some(cn("2"))),
        Some(cn("3")),
    );
    assert_eq!("(1-2)*3", render(&ast, &c, &registry).code);

    // -2 * 3: unary minus is not
    let ast = op(AstKind::Times, op(AstKind::Minus, cn("2"), None), Some(cn("3")));
    assert_eq!("-2*3", render(&ast, &c, &registry).code);

    // 1 - (2 - 3) and 1 - (-2)
    let ast = op(
        AstKind::Minus,
        cn("1"),
        Some(op(AstKind::Minus, cn("2"), Some(cn("3")))),
    );
    assert_eq!("1-(2-3)", render(&ast, &c, &registry).code);
    let ast = op(AstKind::Minus, cn("1"), Some(op(AstKind::Minus, cn("2"), None)));
    assert_eq!("1-(-2)", render(&ast, &c, &registry).code);

    // 1 / (2 * 3)
    let ast = op(
        AstKind::Divide,
        cn("1"),
        Some(op(AstKind::Times, cn("2"), Some(cn("3")))),
    );
    assert_eq!("1/(2*3)", render(&ast, &c, &registry).code);
}

#[test]
fn test_render_power_forms() {
    let registry = Registry::new();
    let c = Profile::c();
    let python = Profile::python();

    let squared = op(AstKind::Power, cn("x"), Some(cn("2.0")));
    let rendered = render(&squared, &c, &registry);
    assert_eq!("sqr(x)", rendered.code);
    assert!(rendered.needs.contains(&MathFn::Square));
    assert_eq!("sqr(x)", render(&squared, &python, &registry).code);

    let halved = op(AstKind::Power, cn("x"), Some(cn("0.5")));
    assert_eq!("sqrt(x)", render(&halved, &python, &registry).code);

    let cubed = op(AstKind::Power, cn("x"), Some(cn("3")));
    assert_eq!("pow(x, 3)", render(&cubed, &c, &registry).code);
    assert_eq!("x**3", render(&cubed, &python, &registry).code);

    // (1 + 2)**(3 * 4)
    let ast = op(
        AstKind::Power,
        op(AstKind::Plus, cn("1"), Some(cn("2"))),
        Some(op(AstKind::Times, cn("3"), Some(cn("4")))),
    );
    assert_eq!("(1+2)**(3*4)", render(&ast, &python, &registry).code);
    assert_eq!("pow(1+2, 3*4)", render(&ast, &c, &registry).code);

    let degree = Ast::new(AstKind::Degree).with_children(Some(cn("3")), None);
    let cube_root = op(AstKind::Root, degree, Some(cn("x")));
    assert_eq!("pow(x, 1.0/3)", render(&cube_root, &c, &registry).code);
    assert_eq!("x**(1.0/3)", render(&cube_root, &python, &registry).code);

    let square_root = Ast::new(AstKind::Root).with_children(Some(cn("x")), None);
    assert_eq!("sqrt(x)", render(&square_root, &c, &registry).code);
}

#[test]
fn test_render_functions() {
    let registry = Registry::new();
    let c = Profile::c();

    let ast = op(
        AstKind::Min,
        cn("1"),
        Some(op(AstKind::Min, cn("2"), Some(cn("3")))),
    );
    let rendered = render(&ast, &c, &registry);
    assert_eq!("min(1, 2, 3)", rendered.code);
    assert_eq!(vec![MathFn::Min], rendered.needs.into_iter().collect::<Vec<_>>());

    // a nested call in first position is its own call
    let ast = op(
        AstKind::Max,
        op(AstKind::Max, cn("1"), Some(cn("2"))),
        Some(cn("3")),
    );
    assert_eq!("max(max(1, 2), 3)", render(&ast, &c, &registry).code);

    let logbase = Ast::new(AstKind::Logbase).with_children(Some(cn("2")), None);
    let ast = op(AstKind::Log, logbase, Some(cn("x")));
    assert_eq!("log(x)/log(2)", render(&ast, &c, &registry).code);
    let ast = Ast::new(AstKind::Log).with_children(Some(cn("x")), None);
    assert_eq!("log10(x)", render(&ast, &c, &registry).code);

    let ast = Ast::new(AstKind::Sech).with_children(Some(cn("x")), None);
    let rendered = render(&ast, &c, &registry);
    assert_eq!("sech(x)", rendered.code);
    assert!(rendered.needs.contains(&MathFn::Sech));

    let ast = op(AstKind::Xor, cn("1"), Some(cn("0")));
    assert_eq!("1^0", render(&ast, &c, &registry).code);
    let rendered = render(&ast, &Profile::python(), &registry);
    assert_eq!("xor_func(1, 0)", rendered.code);
    assert!(rendered.needs.contains(&MathFn::Xor));
}

#[test]
fn test_render_piecewise() {
    let registry = Registry::new();
    let c = Profile::c();
    let python = Profile::python();

    let piece = |value: &str, cond: &str| op(AstKind::Piece, cn(value), Some(cn(cond)));

    let single = Ast::new(AstKind::Piecewise).with_children(Some(piece("1", "a")), None);
    assert_eq!("(a)?1:sqrt(-1.0)", render(&single, &c, &registry).code);
    assert_eq!("1 if a else nan", render(&single, &python, &registry).code);

    let two = op(AstKind::Piecewise, piece("1", "a"), Some(piece("2", "b")));
    assert_eq!(
        "(a)?1:(b)?2:sqrt(-1.0)",
        render(&two, &c, &registry).code
    );

    let otherwise = Ast::new(AstKind::Otherwise).with_children(Some(cn("3")), None);
    let with_otherwise = op(
        AstKind::Piecewise,
        piece("1", "a"),
        Some(op(AstKind::Piecewise, piece("2", "b"), Some(otherwise))),
    );
    assert_eq!(
        "(a)?1:(b)?2:3",
        render(&with_otherwise, &c, &registry).code
    );

    let mut no_ternary = Profile::c();
    no_ternary.has_conditional_operator = false;
    assert_eq!(
        "piecewise(a, 1, sqrt(-1.0))",
        render(&single, &no_ternary, &registry).code
    );
}
