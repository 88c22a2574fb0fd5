// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::{error, fmt, result};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorCode {
    NoError,
    XmlDeserialization,
    BadMathml,
    UnknownComponent,
    UnknownVariable,
    BadProfile,
    InitializedIntegrationVariable,
    MultipleIntegrationVariables,
    NonFirstOrderDifferential,
    ConflictingInitialValues,
    UnderconstrainedVariable,
    UninitializedState,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            NoError => "no_error",
            XmlDeserialization => "xml_deserialization",
            BadMathml => "bad_mathml",
            UnknownComponent => "unknown_component",
            UnknownVariable => "unknown_variable",
            BadProfile => "bad_profile",
            InitializedIntegrationVariable => "initialized_integration_variable",
            MultipleIntegrationVariables => "multiple_integration_variables",
            NonFirstOrderDifferential => "non_first_order_differential",
            ConflictingInitialValues => "conflicting_initial_values",
            UnderconstrainedVariable => "underconstrained_variable",
            UninitializedState => "uninitialized_state",
        };

        write!(f, "{name}")
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Problems with the markup handed to us: reported by the reader,
    /// never by a generation run.
    Import,
    Generator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub details: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind,
            code,
            details,
        }
    }

    pub fn get_details(&self) -> Option<String> {
        self.details.clone()
    }

    /// The human-readable description, empty when none was attached.
    pub fn description(&self) -> &str {
        self.details.as_deref().unwrap_or("")
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Import => "ImportError",
            ErrorKind::Generator => "GeneratorError",
        };
        match self.details {
            Some(ref details) => write!(f, "{}{{{}: {}}}", kind, self.code, details),
            None => write!(f, "{}{{{}}}", kind, self.code),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

#[macro_export]
macro_rules! gen_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Error::new(
            ErrorKind::Generator,
            ErrorCode::$code,
            Some($str),
        )
    }}
);

#[macro_export]
macro_rules! import_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Import,
            ErrorCode::$code,
            Some($str),
        ))
    }}
);

#[test]
fn test_error_display() {
    let err = Error::new(
        ErrorKind::Generator,
        ErrorCode::UninitializedState,
        Some("Variable 'x' in component 'main' of model 'm' is used in an ODE, but it is not initialised.".to_owned()),
    );
    assert_eq!(
        "GeneratorError{uninitialized_state: Variable 'x' in component 'main' of model 'm' is used in an ODE, but it is not initialised.}",
        format!("{err}")
    );

    let err = Error::new(ErrorKind::Import, ErrorCode::BadMathml, None);
    assert_eq!("ImportError{bad_mathml}", format!("{err}"));
    assert_eq!("", err.description());
}

#[test]
fn test_error_macros() {
    let err = gen_err!(UnderconstrainedVariable, "is of unknown type".to_owned());
    assert_eq!(ErrorKind::Generator, err.kind);
    assert_eq!(ErrorCode::UnderconstrainedVariable, err.code);

    let result: Result<()> = import_err!(UnknownComponent, "nope".to_owned());
    let err = result.unwrap_err();
    assert_eq!(ErrorKind::Import, err.kind);
    assert_eq!("nope", err.description());
}
