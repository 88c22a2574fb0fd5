// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

#![forbid(unsafe_code)]

//! Generates simulation code from CellML models.
//!
//! A model's equations are given as unordered MathML relations.  The
//! generator works out which variable each equation computes, orders
//! the equations so every value is available before it is used, and
//! renders them as assignments in a target language.

pub mod common;
pub mod datamodel;
pub mod xml;
pub mod cellml;

mod ast;
mod builder;
mod causalize;
mod codegen;
mod equation;
mod generator;
mod variable;

pub mod profile;

#[cfg(test)]
mod generator_tests;
#[cfg(test)]
mod generator_proptest;

pub use self::common::{Error, ErrorCode, ErrorKind, Result};
pub use self::generator::{Generator, ModelType};
pub use self::profile::{MathFn, Profile};
