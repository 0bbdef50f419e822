use std::ops::RangeInclusive;

use crate::ast::{Action, Condition, Rule, Value, DURATION_VARIABLE};
use crate::error::{RangeDescription, ValidationError};
use crate::grammar::{GrammarCatalog, NumericRange, ValueDomain};
use crate::parser::is_rule_name;

pub const SETS_RANGE: RangeInclusive<u32> = 1..=10;
pub const REPS_RANGE: RangeInclusive<u32> = 1..=20;
pub const MIN_REST_RANGE: RangeInclusive<u32> = 30..=300;
pub const MAX_REST_RANGE: RangeInclusive<u32> = 60..=600;

/// Checks a rule against the catalog without touching it.
///
/// Failures are grouped by category: structure, then conditions, then the
/// action. The first failing category is reported in full and later ones are
/// not looked at.
pub fn validate(rule: &Rule, catalog: &GrammarCatalog) -> Result<(), Vec<ValidationError>> {
    let mut errors = vec![];
    if !is_rule_name(&rule.name) {
        errors.push(ValidationError::InvalidRuleName {
            name: rule.name.clone(),
        });
    }
    if rule.conditions.is_empty() {
        errors.push(ValidationError::NoConditions);
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    let errors: Vec<_> = rule
        .conditions
        .iter()
        .flat_map(|condition| check_condition(condition, catalog))
        .collect();
    if !errors.is_empty() {
        return Err(errors);
    }

    let errors = check_action(&rule.action, catalog);
    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(())
}

pub fn check_condition(condition: &Condition, catalog: &GrammarCatalog) -> Vec<ValidationError> {
    let mut errors = vec![];
    let Condition {
        variable,
        operator,
        value,
    } = condition;

    let domain = catalog.domain_of(variable);
    if domain.is_none() {
        errors.push(ValidationError::UnknownVariable {
            variable: variable.clone(),
        });
    }

    if !catalog.has_operator(*operator) {
        errors.push(ValidationError::UnknownOperator {
            operator: operator.to_string(),
        });
    }

    if let Some(domain) = domain {
        if let Err(e) = check_value(variable, value, domain) {
            errors.push(e);
        }
    }

    errors
}

fn check_value(variable: &str, value: &Value, domain: ValueDomain) -> Result<(), ValidationError> {
    match (domain, value) {
        (ValueDomain::Enumerated(allowed), Value::Text(text)) => {
            if allowed.iter().any(|a| a == text) {
                Ok(())
            } else {
                Err(not_in_domain(variable, text.clone(), allowed))
            }
        }
        (ValueDomain::Enumerated(allowed), Value::Number(n)) => {
            Err(not_in_domain(variable, n.to_string(), allowed))
        }
        (ValueDomain::NumericRange(range), Value::Number(n)) => check_range(variable, *n, range),
        (ValueDomain::NumericRange(_), Value::Text(text)) => Err(ValidationError::NotANumber {
            variable: variable.to_owned(),
            value: text.clone(),
        }),
    }
}

/// Turns raw user input into a typed value for `variable`, rejecting
/// anything outside its domain.
pub fn coerce_value(variable: &str, raw: &str, domain: ValueDomain) -> Result<Value, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::MissingValue {
            variable: variable.to_owned(),
        });
    }

    let value = match domain {
        ValueDomain::Enumerated(_) => Value::Text(raw.to_owned()),
        ValueDomain::NumericRange(_) => {
            let digits = match raw.strip_suffix('m') {
                Some(minutes) if variable == DURATION_VARIABLE => minutes.trim_end(),
                _ => raw,
            };
            let n = digits.parse().map_err(|_| ValidationError::NotANumber {
                variable: variable.to_owned(),
                value: raw.to_owned(),
            })?;
            Value::Number(n)
        }
    };

    check_value(variable, &value, domain)?;
    Ok(value)
}

pub fn check_action(action: &Action, catalog: &GrammarCatalog) -> Vec<ValidationError> {
    let mut errors = vec![];

    if !catalog.has_action(action.kind()) {
        errors.push(ValidationError::UnsupportedAction {
            kind: action.kind(),
        });
    }

    match action {
        Action::IncludeExercise { exercise_name } => {
            if exercise_name.trim().is_empty() {
                errors.push(ValidationError::MissingExercise);
            } else if !catalog.has_exercise(exercise_name) {
                errors.push(ValidationError::UnknownExercise {
                    exercise: exercise_name.clone(),
                });
            }
        }
        Action::Sets {
            sets_count,
            reps_count,
        } => {
            errors.extend(check_bound("sets", *sets_count, SETS_RANGE));
            errors.extend(check_bound("reps", *reps_count, REPS_RANGE));
        }
        Action::SetRestTime {
            min_rest_seconds,
            max_rest_seconds,
        } => {
            errors.extend(check_bound("minimum rest seconds", *min_rest_seconds, MIN_REST_RANGE));
            errors.extend(check_bound("maximum rest seconds", *max_rest_seconds, MAX_REST_RANGE));
            if min_rest_seconds > max_rest_seconds {
                errors.push(ValidationError::RestTimeInverted {
                    min: *min_rest_seconds,
                    max: *max_rest_seconds,
                });
            }
        }
    }

    errors
}

fn check_range(variable: &str, value: i64, range: NumericRange) -> Result<(), ValidationError> {
    if range.contains(value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            field: variable.to_owned(),
            value,
            range: range.describe(),
        })
    }
}

fn check_bound(field: &str, value: u32, range: RangeInclusive<u32>) -> Option<ValidationError> {
    if range.contains(&value) {
        return None;
    }
    Some(ValidationError::OutOfRange {
        field: field.to_owned(),
        value: value.into(),
        range: RangeDescription {
            min: (*range.start()).into(),
            max: Some((*range.end()).into()),
        },
    })
}

fn not_in_domain(variable: &str, value: String, allowed: &[String]) -> ValidationError {
    ValidationError::NotInDomain {
        variable: variable.to_owned(),
        value,
        allowed: allowed.to_vec(),
    }
}
