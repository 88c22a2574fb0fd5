// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use crate::variable::{DeclId, VarId};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AstKind {
    // relational
    Eq,
    EqEq,
    Neq,
    Lt,
    Leq,
    Gt,
    Geq,

    // logical
    And,
    Or,
    Xor,
    Not,

    // arithmetic
    Plus,
    Minus,
    Times,
    Divide,
    Power,
    Root,
    Abs,
    Exp,
    Ln,
    Log,
    Ceiling,
    Floor,
    Factorial,
    Min,
    Max,
    Gcd,
    Lcm,
    Rem,

    // calculus
    Diff,

    // trigonometric
    Sin,
    Cos,
    Tan,
    Sec,
    Csc,
    Cot,
    Sinh,
    Cosh,
    Tanh,
    Sech,
    Csch,
    Coth,
    Asin,
    Acos,
    Atan,
    Asec,
    Acsc,
    Acot,
    Asinh,
    Acosh,
    Atanh,
    Asech,
    Acsch,
    Acoth,

    // piecewise
    Piecewise,
    Piece,
    Otherwise,

    // tokens
    Ci,
    Cn,

    // qualifiers
    Degree,
    Logbase,
    Bvar,

    // constants
    True,
    False,
    E,
    Pi,
    Inf,
    Nan,
}

/// A reference from a `ci` token to a variable: `var` is the canonical
/// registry record, `decl` the declaration the token actually named.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VariableRef {
    pub var: VarId,
    pub decl: DeclId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Ast {
    pub kind: AstKind,
    pub value: Option<String>,
    pub variable: Option<VariableRef>,
    pub left: Option<Box<Ast>>,
    pub right: Option<Box<Ast>>,
}

impl Ast {
    pub fn new(kind: AstKind) -> Self {
        Ast {
            kind,
            value: None,
            variable: None,
            left: None,
            right: None,
        }
    }

    pub fn literal(value: &str) -> Self {
        Ast {
            value: Some(value.to_owned()),
            ..Ast::new(AstKind::Cn)
        }
    }

    pub fn variable(variable: VariableRef) -> Self {
        Ast {
            variable: Some(variable),
            ..Ast::new(AstKind::Ci)
        }
    }

    pub fn with_children(mut self, left: Option<Ast>, right: Option<Ast>) -> Self {
        self.left = left.map(Box::new);
        self.right = right.map(Box::new);
        self
    }

    pub fn left(&self) -> Option<&Ast> {
        self.left.as_deref()
    }

    pub fn right(&self) -> Option<&Ast> {
        self.right.as_deref()
    }

    pub fn is_relational(&self) -> bool {
        use AstKind::*;
        matches!(self.kind, EqEq | Neq | Lt | Leq | Gt | Geq)
    }

    pub fn is_logical(&self) -> bool {
        matches!(self.kind, AstKind::And | AstKind::Or | AstKind::Xor)
    }

    /// Plus or minus with both operands populated; a unary sign
    /// never needs enclosing parentheses.
    pub fn is_binary_plus_minus(&self) -> bool {
        matches!(self.kind, AstKind::Plus | AstKind::Minus) && self.right.is_some()
    }

    pub fn is_binary_plus(&self) -> bool {
        self.kind == AstKind::Plus && self.right.is_some()
    }

    /// Pre-order walk over the tree.
    pub fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a Ast)) {
        f(self);
        if let Some(left) = self.left() {
            left.visit(f);
        }
        if let Some(right) = self.right() {
            right.visit(f);
        }
    }
}

#[test]
fn test_binary_plus_minus() {
    let unary = Ast::new(AstKind::Minus).with_children(Some(Ast::literal("1")), None);
    assert!(!unary.is_binary_plus_minus());

    let binary = Ast::new(AstKind::Minus)
        .with_children(Some(Ast::literal("1")), Some(Ast::literal("2")));
    assert!(binary.is_binary_plus_minus());
    assert!(!binary.is_binary_plus());
}

#[test]
fn test_visit_preorder() {
    let ast = Ast::new(AstKind::Plus).with_children(
        Some(Ast::literal("1")),
        Some(Ast::new(AstKind::Times).with_children(Some(Ast::literal("2")), None)),
    );
    let mut kinds = vec![];
    ast.visit(&mut |node| kinds.push(node.kind));
    assert_eq!(
        vec![AstKind::Plus, AstKind::Cn, AstKind::Times, AstKind::Cn],
        kinds
    );
}
