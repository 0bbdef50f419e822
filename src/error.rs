use std::fmt;

use thiserror::Error;

use crate::ast::{ActionKind, VariableName};

/// Local, field-level rejection of a condition or action.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("a rule needs at least one condition")]
    NoConditions,

    #[error("{name:?} is not a valid rule name; expected letters, digits and underscores, optionally followed by a space and a number")]
    InvalidRuleName { name: String },

    #[error("variable is required")]
    MissingVariable,

    #[error("unknown variable {variable:?}")]
    UnknownVariable { variable: VariableName },

    #[error("unknown operator {operator:?}")]
    UnknownOperator { operator: String },

    #[error("value is required for {variable}")]
    MissingValue { variable: VariableName },

    #[error("{value:?} is not a valid {variable}; expected one of: {}", .allowed.join(", "))]
    NotInDomain {
        variable: VariableName,
        value: String,
        allowed: Vec<String>,
    },

    #[error("{variable} must be a number, got {value:?}")]
    NotANumber { variable: VariableName, value: String },

    #[error("{field} must be {range}, got {value}")]
    OutOfRange {
        field: String,
        value: i64,
        range: RangeDescription,
    },

    #[error("action {kind} is not offered by the grammar")]
    UnsupportedAction { kind: ActionKind },

    #[error("exercise name is required")]
    MissingExercise,

    #[error("unknown exercise {exercise:?}")]
    UnknownExercise { exercise: String },

    #[error("minimum rest time ({min}s) cannot be greater than maximum ({max}s)")]
    RestTimeInverted { min: u32, max: u32 },
}

/// Human readable numeric bound used in range errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RangeDescription {
    pub min: i64,
    pub max: Option<i64>,
}

impl fmt::Display for RangeDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "between {} and {}", self.min, max),
            None => write!(f, "at least {}", self.min),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Malformed DSL text.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{message} at {location}")]
pub struct ParseError {
    pub message: String,
    pub location: Location,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("no condition at index {index} (draft has {len})")]
pub struct IndexError {
    pub index: usize,
    pub len: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum IncompleteRuleError {
    #[error("rule has no conditions")]
    NoConditions,
    #[error("rule has no action")]
    NoAction,
}

/// The grammar or rule service could not be used.
#[derive(Debug, Error)]
pub enum UnavailableError {
    #[error("failed to reach {endpoint}: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} responded with HTTP {status}: {message}")]
    Status {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("unexpected response from {endpoint}: {message}")]
    Malformed { endpoint: String, message: String },
}

/// Remote rejection of submitted DSL text.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("syntax error: {message}{}", fmt_location(.location))]
    Syntax {
        message: String,
        location: Option<Location>,
    },

    #[error("rule rejected: {message}{}", fmt_location(.location))]
    Semantic {
        message: String,
        location: Option<Location>,
        errors: Vec<String>,
    },

    #[error(transparent)]
    Unavailable(#[from] UnavailableError),
}

fn fmt_location(location: &Option<Location>) -> String {
    location
        .map(|location| format!(" ({})", location))
        .unwrap_or_default()
}

/// Why an authoring session refused or failed to persist a draft.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Incomplete(#[from] IncompleteRuleError),

    #[error("rule is invalid: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Invalid(Vec<ValidationError>),

    #[error(transparent)]
    Rejected(#[from] RuleError),

    #[error(transparent)]
    Unavailable(#[from] UnavailableError),
}
