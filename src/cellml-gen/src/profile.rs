// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Target-language profiles: the text used for every operator,
//! function, constant and statement shape, plus the helper functions a
//! target needs to define for operations it lacks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::common::Result;
use crate::import_err;

/// Math functions generated code may call that not every target
/// provides natively.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MathFn {
    Factorial,
    Square,
    Xor,
    Min,
    Max,
    Gcd,
    Lcm,
    Sec,
    Csc,
    Cot,
    Sech,
    Csch,
    Coth,
    Asec,
    Acsc,
    Acot,
    Asech,
    Acsch,
    Acoth,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    // relational and logical operators
    pub assignment: String,
    pub eq: String,
    pub neq: String,
    pub lt: String,
    pub leq: String,
    pub gt: String,
    pub geq: String,
    pub and: String,
    pub or: String,
    pub xor: String,
    pub not: String,
    pub has_xor_operator: bool,

    // arithmetic operators and functions
    pub plus: String,
    pub minus: String,
    pub times: String,
    pub divide: String,
    pub power: String,
    pub has_power_operator: bool,
    pub square_root: String,
    pub square: String,
    pub abs: String,
    pub exp: String,
    pub ln: String,
    pub log10: String,
    pub ceiling: String,
    pub floor: String,
    pub factorial: String,
    pub min: String,
    pub max: String,
    pub gcd: String,
    pub lcm: String,
    pub rem: String,

    // trigonometric functions
    pub sin: String,
    pub cos: String,
    pub tan: String,
    pub sec: String,
    pub csc: String,
    pub cot: String,
    pub sinh: String,
    pub cosh: String,
    pub tanh: String,
    pub sech: String,
    pub csch: String,
    pub coth: String,
    pub asin: String,
    pub acos: String,
    pub atan: String,
    pub asec: String,
    pub acsc: String,
    pub acot: String,
    pub asinh: String,
    pub acosh: String,
    pub atanh: String,
    pub asech: String,
    pub acsch: String,
    pub acoth: String,

    // piecewise: "#cond", "#if" and "#else" are replaced
    pub has_conditional_operator: bool,
    pub conditional_if: String,
    pub conditional_else: String,
    pub piecewise_if: String,
    pub piecewise_else: String,

    // constants
    pub true_value: String,
    pub false_value: String,
    pub e: String,
    pub pi: String,
    pub inf: String,
    pub nan: String,

    // statements and arrays
    pub command_separator: String,
    pub comment: String,
    pub voi: String,
    pub states: String,
    pub rates: String,
    pub variables: String,

    /// Definitions emitted for the helper functions generated code uses.
    pub helpers: BTreeMap<MathFn, String>,
}

impl Default for Profile {
    fn default() -> Self {
        Profile::c()
    }
}

fn s(value: &str) -> String {
    value.to_owned()
}

fn c_helpers() -> BTreeMap<MathFn, String> {
    let reciprocal = |name: &str, of: &str| {
        format!("double {name}(double x)\n{{\n    return 1.0/{of}(x);\n}}\n")
    };
    let inverse = |name: &str, of: &str| {
        format!("double {name}(double x)\n{{\n    return {of}(1.0/x);\n}}\n")
    };

    let mut helpers = BTreeMap::new();
    helpers.insert(
        MathFn::Factorial,
        s("double fact(double x)\n{\n    return tgamma(x+1.0);\n}\n"),
    );
    helpers.insert(
        MathFn::Square,
        s("double sqr(double x)\n{\n    return x*x;\n}\n"),
    );
    helpers.insert(
        MathFn::Min,
        s("double min(double x, double y)\n{\n    return (x < y)?x:y;\n}\n"),
    );
    helpers.insert(
        MathFn::Max,
        s("double max(double x, double y)\n{\n    return (x > y)?x:y;\n}\n"),
    );
    helpers.insert(
        MathFn::Gcd,
        s("double gcd(double x, double y)\n{\n    double a = fabs(x);\n    double b = fabs(y);\n\n    while (b != 0.0) {\n        double t = fmod(a, b);\n\n        a = b;\n        b = t;\n    }\n\n    return a;\n}\n"),
    );
    helpers.insert(
        MathFn::Lcm,
        s("double lcm(double x, double y)\n{\n    double a = fabs(x);\n    double b = fabs(y);\n\n    if ((a == 0.0) || (b == 0.0)) {\n        return 0.0;\n    }\n\n    double r = a;\n    double t = b;\n\n    while (t != 0.0) {\n        double u = fmod(r, t);\n\n        r = t;\n        t = u;\n    }\n\n    return a/r*b;\n}\n"),
    );
    helpers.insert(MathFn::Sec, reciprocal("sec", "cos"));
    helpers.insert(MathFn::Csc, reciprocal("csc", "sin"));
    helpers.insert(MathFn::Cot, reciprocal("cot", "tan"));
    helpers.insert(MathFn::Sech, reciprocal("sech", "cosh"));
    helpers.insert(MathFn::Csch, reciprocal("csch", "sinh"));
    helpers.insert(MathFn::Coth, reciprocal("coth", "tanh"));
    helpers.insert(MathFn::Asec, inverse("asec", "acos"));
    helpers.insert(MathFn::Acsc, inverse("acsc", "asin"));
    helpers.insert(MathFn::Acot, inverse("acot", "atan"));
    helpers.insert(MathFn::Asech, inverse("asech", "acosh"));
    helpers.insert(MathFn::Acsch, inverse("acsch", "asinh"));
    helpers.insert(MathFn::Acoth, inverse("acoth", "atanh"));
    helpers
}

fn python_helpers() -> BTreeMap<MathFn, String> {
    let reciprocal = |name: &str, of: &str| format!("def {name}(x):\n    return 1.0/{of}(x)\n");
    let inverse = |name: &str, of: &str| format!("def {name}(x):\n    return {of}(1.0/x)\n");

    let mut helpers = BTreeMap::new();
    helpers.insert(MathFn::Square, s("def sqr(x):\n    return x*x\n"));
    helpers.insert(
        MathFn::Xor,
        s("def xor_func(x, y):\n    return 1.0 if bool(x) ^ bool(y) else 0.0\n"),
    );
    helpers.insert(MathFn::Sec, reciprocal("sec", "cos"));
    helpers.insert(MathFn::Csc, reciprocal("csc", "sin"));
    helpers.insert(MathFn::Cot, reciprocal("cot", "tan"));
    helpers.insert(MathFn::Sech, reciprocal("sech", "cosh"));
    helpers.insert(MathFn::Csch, reciprocal("csch", "sinh"));
    helpers.insert(MathFn::Coth, reciprocal("coth", "tanh"));
    helpers.insert(MathFn::Asec, inverse("asec", "acos"));
    helpers.insert(MathFn::Acsc, inverse("acsc", "asin"));
    helpers.insert(MathFn::Acot, inverse("acot", "atan"));
    helpers.insert(MathFn::Asech, inverse("asech", "acosh"));
    helpers.insert(MathFn::Acsch, inverse("acsch", "asinh"));
    helpers.insert(MathFn::Acoth, inverse("acoth", "atanh"));
    helpers
}

impl Profile {
    pub fn c() -> Self {
        Profile {
            assignment: s(" = "),
            eq: s(" == "),
            neq: s(" != "),
            lt: s(" < "),
            leq: s(" <= "),
            gt: s(" > "),
            geq: s(" >= "),
            and: s(" && "),
            or: s(" || "),
            xor: s("^"),
            not: s("!"),
            has_xor_operator: true,

            plus: s("+"),
            minus: s("-"),
            times: s("*"),
            divide: s("/"),
            power: s("pow"),
            has_power_operator: false,
            square_root: s("sqrt"),
            square: s("sqr"),
            abs: s("fabs"),
            exp: s("exp"),
            ln: s("log"),
            log10: s("log10"),
            ceiling: s("ceil"),
            floor: s("floor"),
            factorial: s("fact"),
            min: s("min"),
            max: s("max"),
            gcd: s("gcd"),
            lcm: s("lcm"),
            rem: s("fmod"),

            sin: s("sin"),
            cos: s("cos"),
            tan: s("tan"),
            sec: s("sec"),
            csc: s("csc"),
            cot: s("cot"),
            sinh: s("sinh"),
            cosh: s("cosh"),
            tanh: s("tanh"),
            sech: s("sech"),
            csch: s("csch"),
            coth: s("coth"),
            asin: s("asin"),
            acos: s("acos"),
            atan: s("atan"),
            asec: s("asec"),
            acsc: s("acsc"),
            acot: s("acot"),
            asinh: s("asinh"),
            acosh: s("acosh"),
            atanh: s("atanh"),
            asech: s("asech"),
            acsch: s("acsch"),
            acoth: s("acoth"),

            has_conditional_operator: true,
            conditional_if: s("(#cond)?#if"),
            conditional_else: s(":#else"),
            piecewise_if: s("piecewise(#cond, #if"),
            piecewise_else: s(", #else)"),

            true_value: s("true"),
            false_value: s("false"),
            e: s("2.71828182845905"),
            pi: s("3.14159265358979"),
            inf: s("1.0/0.0"),
            nan: s("sqrt(-1.0)"),

            command_separator: s(";"),
            comment: s("/* #comment */"),
            voi: s("voi"),
            states: s("states"),
            rates: s("rates"),
            variables: s("variables"),

            helpers: c_helpers(),
        }
    }

    pub fn python() -> Self {
        Profile {
            and: s(" and "),
            or: s(" or "),
            xor: s("xor_func"),
            not: s("not "),
            has_xor_operator: false,

            power: s("**"),
            has_power_operator: true,
            factorial: s("factorial"),

            conditional_if: s("#if if #cond"),
            conditional_else: s(" else #else"),

            true_value: s("1.0"),
            false_value: s("0.0"),
            e: s("e"),
            pi: s("pi"),
            inf: s("inf"),
            nan: s("nan"),

            command_separator: s(""),
            comment: s("# #comment"),

            helpers: python_helpers(),
            ..Profile::c()
        }
    }

    /// Reads a JSON profile.  Any field left out keeps the C profile's
    /// value.
    pub fn from_json(source: &str) -> Result<Self> {
        match serde_json::from_str(source) {
            Ok(profile) => Ok(profile),
            Err(err) => import_err!(BadProfile, err.to_string()),
        }
    }

    /// One of the built-in profiles, by name.
    pub fn builtin(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "c" => Some(Profile::c()),
            "python" | "py" => Some(Profile::python()),
            _ => None,
        }
    }

    pub fn comment_line(&self, text: &str) -> String {
        self.comment.replacen("#comment", text, 1)
    }
}

#[test]
fn test_json_profile_overrides() {
    let profile = Profile::from_json(
        r#"{"has_power_operator": true, "power": "^", "helpers": {"square": "sqr"}}"#,
    )
    .unwrap();
    assert!(profile.has_power_operator);
    assert_eq!("^", profile.power);
    assert_eq!(" = ", profile.assignment);
    assert_eq!(1, profile.helpers.len());
    assert_eq!(Some(&"sqr".to_owned()), profile.helpers.get(&MathFn::Square));

    let err = Profile::from_json(r#"{"has_power_operator": "yes"}"#).unwrap_err();
    assert_eq!(crate::common::ErrorCode::BadProfile, err.code);
}

#[test]
fn test_builtin_profiles() {
    assert_eq!(Some(Profile::c()), Profile::builtin("C"));
    let python = Profile::builtin("python").unwrap();
    assert_eq!("", python.command_separator);
    assert_eq!("states", python.states);
    assert!(!python.helpers.contains_key(&MathFn::Min));
    assert!(Profile::builtin("fortran").is_none());

    assert_eq!("# rates", python.comment_line("rates"));
    assert_eq!("/* rates */", Profile::c().comment_line("rates"));
}

#[test]
fn test_profile_json_roundtrip() {
    let python = Profile::python();
    let json = serde_json::to_string(&python).unwrap();
    assert_eq!(python, Profile::from_json(&json).unwrap());
}
