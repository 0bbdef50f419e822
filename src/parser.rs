use std::borrow::BorrowMut;

use pest::error::{ErrorVariant, LineColLocation};
use pest::Parser as _;
use pest_derive::Parser;

use crate::ast::{Action, Condition, Operator, Rule as WorkoutRule, Value, DURATION_VARIABLE};
use crate::error::{Location, ParseError};

const SECONDS_PER_MINUTE: i64 = 60;

#[derive(Parser)]
#[grammar = "rules.pest"]
struct Parser;

type Pair<'a> = pest::iterators::Pair<'a, Rule>;
type Pairs<'a> = pest::iterators::Pairs<'a, Rule>;

/// Parses one DSL statement. The returned rule has no id.
pub fn parse_rule(code: &str) -> Result<WorkoutRule, ParseError> {
    let statement = Parser::parse(Rule::statement, code)
        .map_err(ParseError::from)?
        .next()
        .unwrap_or_else(|| unreachable!("statement always yields a pair"));

    let rule_def = expect_next_rule(statement.into_inner(), Rule::rule_def);
    WorkoutRule::try_from(rule_def)
}

pub fn deserialize(code: &str) -> Result<WorkoutRule, ParseError> {
    parse_rule(code)
}

/// Whether `name` can stand as the NAME of a statement, e.g. `Rule3` or `Rule 3`.
pub fn is_rule_name(name: &str) -> bool {
    Parser::parse(Rule::bare_rule_name, name).is_ok()
}

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_rule
            | Rule::kw_if
            | Rule::kw_and
            | Rule::kw_then
            | Rule::kw_include_exercise
            | Rule::kw_sets
            | Rule::kw_reps
            | Rule::kw_set_rest_time
            | Rule::kw_min
            | Rule::kw_max
    )
}

fn significant<'a>(pair: Pair<'a>) -> impl Iterator<Item = Pair<'a>> {
    pair.into_inner().filter(|pair| !is_keyword(pair.as_rule()))
}

fn expect_next_rule<'a, P>(mut pairs: P, rule: Rule) -> Pair<'a>
where
    P: BorrowMut<Pairs<'a>>,
{
    match pairs.borrow_mut().find(|pair| !is_keyword(pair.as_rule())) {
        Some(pair) if pair.as_rule() == rule => pair,
        other => unreachable!("expected {:?}, got {:?}", rule, other),
    }
}

fn error_at(pair: &Pair, message: impl Into<String>) -> ParseError {
    let (line, column) = pair.as_span().start_pos().line_col();
    ParseError {
        message: message.into(),
        location: Location { line, column },
    }
}

impl TryFrom<Pair<'_>> for WorkoutRule {
    type Error = ParseError;

    fn try_from(pair: Pair<'_>) -> Result<Self, Self::Error> {
        let mut pairs = significant(pair);
        let name = pairs
            .next()
            .filter(|pair| pair.as_rule() == Rule::rule_name)
            .unwrap_or_else(|| unreachable!("rule_def starts with rule_name"));

        let mut conditions = vec![];
        let mut action = None;
        for pair in pairs {
            match pair.as_rule() {
                Rule::condition => conditions.push(Condition::try_from(pair)?),
                Rule::action => action = Some(Action::try_from(pair)?),
                other => unreachable!("unexpected {:?} in rule_def", other),
            }
        }

        Ok(Self {
            id: None,
            name: name.as_str().to_owned(),
            conditions,
            action: action.unwrap_or_else(|| unreachable!("rule_def ends with action")),
        })
    }
}

impl TryFrom<Pair<'_>> for Condition {
    type Error = ParseError;

    fn try_from(pair: Pair<'_>) -> Result<Self, Self::Error> {
        let mut pairs = pair.into_inner();
        let variable = convert_variable(expect_next_rule(&mut pairs, Rule::variable))?;

        let operator = expect_next_rule(&mut pairs, Rule::operator);
        let operator: Operator = operator
            .as_str()
            .parse()
            .unwrap_or_else(|token| unreachable!("grammar accepted operator {:?}", token));

        let value = expect_next_rule(&mut pairs, Rule::value);
        let value = convert_value(&variable, value)?;

        Ok(Self {
            variable,
            operator,
            value,
        })
    }
}

fn convert_variable(pair: Pair) -> Result<String, ParseError> {
    let inner = pair
        .into_inner()
        .next()
        .unwrap_or_else(|| unreachable!("variable has one alternative"));

    match inner.as_rule() {
        Rule::simple_variable | Rule::record_variable => Ok(inner.as_str().to_owned()),
        Rule::legacy_variable => convert_legacy_variable(inner),
        other => unreachable!("unexpected {:?} in variable", other),
    }
}

/// `<RecordVariable record_type="X" field="Y">` becomes `X.Y`.
fn convert_legacy_variable(pair: Pair) -> Result<String, ParseError> {
    let location = pair.clone();
    let mut record_type = None;
    let mut field = None;

    for attribute in pair.into_inner() {
        if attribute.as_rule() != Rule::legacy_attribute {
            continue;
        }
        let mut pairs = attribute.clone().into_inner();
        let key = expect_next_rule(&mut pairs, Rule::legacy_key);
        let value = convert_string(expect_next_rule(&mut pairs, Rule::string));

        let slot = match key.as_str() {
            "record_type" => &mut record_type,
            "field" => &mut field,
            other => unreachable!("grammar accepted legacy key {:?}", other),
        };
        if slot.replace(value).is_some() {
            return Err(error_at(
                &attribute,
                format!("duplicate {} attribute", key.as_str()),
            ));
        }
    }

    match (record_type, field) {
        (Some(record_type), Some(field)) if !record_type.is_empty() && !field.is_empty() => {
            Ok(format!("{}.{}", record_type, field))
        }
        _ => Err(error_at(
            &location,
            "legacy variable needs non-empty record_type and field attributes",
        )),
    }
}

fn convert_value(variable: &str, pair: Pair) -> Result<Value, ParseError> {
    let inner = pair
        .into_inner()
        .next()
        .unwrap_or_else(|| unreachable!("value has one alternative"));

    match inner.as_rule() {
        Rule::string => Ok(Value::Text(convert_string(inner))),
        Rule::quantity => {
            let location = inner.clone();
            let mut pairs = inner.into_inner();
            let number = convert_number(expect_next_rule(&mut pairs, Rule::number))?;
            let unit = pairs.next();

            match unit {
                None => Ok(Value::Number(number)),
                Some(_) if variable != DURATION_VARIABLE => Err(error_at(
                    &location,
                    format!("{} does not take a unit", variable),
                )),
                Some(unit) => match unit.as_str() {
                    "m" => Ok(Value::Number(number)),
                    _ if number % SECONDS_PER_MINUTE == 0 => {
                        Ok(Value::Number(number / SECONDS_PER_MINUTE))
                    }
                    _ => Err(error_at(
                        &location,
                        "duration in seconds must be a whole number of minutes",
                    )),
                },
            }
        }
        other => unreachable!("unexpected {:?} in value", other),
    }
}

impl TryFrom<Pair<'_>> for Action {
    type Error = ParseError;

    fn try_from(pair: Pair<'_>) -> Result<Self, Self::Error> {
        let pair = pair
            .into_inner()
            .next()
            .unwrap_or_else(|| unreachable!("action has one alternative"));

        match pair.as_rule() {
            Rule::include_exercise => {
                let mut pairs = pair.into_inner();
                let exercise_name = convert_string(expect_next_rule(&mut pairs, Rule::string));
                Ok(Action::IncludeExercise { exercise_name })
            }

            Rule::sets_action => {
                let mut pairs = pair.into_inner();
                let sets_count = convert_count(expect_next_rule(&mut pairs, Rule::number))?;
                let reps_count = convert_count(expect_next_rule(&mut pairs, Rule::number))?;
                Ok(Action::Sets {
                    sets_count,
                    reps_count,
                })
            }

            Rule::rest_action => {
                let mut pairs = pair.into_inner();
                let min_rest_seconds = convert_time(expect_next_rule(&mut pairs, Rule::time))?;
                let max_rest_seconds = convert_time(expect_next_rule(&mut pairs, Rule::time))?;
                Ok(Action::SetRestTime {
                    min_rest_seconds,
                    max_rest_seconds,
                })
            }

            other => unreachable!("unexpected {:?} in action", other),
        }
    }
}

fn convert_number(pair: Pair) -> Result<i64, ParseError> {
    pair.as_str()
        .parse()
        .map_err(|_| error_at(&pair, format!("number {} is out of range", pair.as_str())))
}

fn convert_count(pair: Pair) -> Result<u32, ParseError> {
    pair.as_str().parse().map_err(|_| {
        error_at(
            &pair,
            format!("expected a non-negative whole number, got {}", pair.as_str()),
        )
    })
}

/// Rest times are stored in seconds whichever unit was written.
fn convert_time(pair: Pair) -> Result<u32, ParseError> {
    let location = pair.clone();
    let mut pairs = pair.into_inner();
    let amount = convert_count(expect_next_rule(&mut pairs, Rule::number))?;
    let unit = expect_next_rule(&mut pairs, Rule::unit);

    match unit.as_str() {
        "s" => Ok(amount),
        _ => amount
            .checked_mul(SECONDS_PER_MINUTE as u32)
            .ok_or_else(|| error_at(&location, "rest time is out of range")),
    }
}

fn convert_string(pair: Pair) -> String {
    let interior = expect_next_rule(pair.into_inner(), Rule::string_interior);
    let mut s = String::with_capacity(interior.as_str().len());
    let mut chars = interior.as_str().chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => s.extend(chars.next()),
            c => s.push(c),
        }
    }
    s
}

fn describe(rule: &Rule) -> &'static str {
    match rule {
        Rule::kw_rule => "\"rule\"",
        Rule::kw_if => "\"if\"",
        Rule::kw_and => "\"and\"",
        Rule::kw_then => "\"then\"",
        Rule::kw_include_exercise => "\"include_exercise\"",
        Rule::kw_sets => "\"sets\"",
        Rule::kw_reps => "\"reps\"",
        Rule::kw_set_rest_time => "\"set_rest_time\"",
        Rule::kw_min => "\"min\"",
        Rule::kw_max => "\"max\"",
        Rule::rule_name | Rule::bare_rule_name => "a rule name",
        Rule::variable | Rule::simple_variable | Rule::record_variable => "a variable",
        Rule::legacy_variable | Rule::legacy_attribute | Rule::legacy_key => "a record attribute",
        Rule::operator => "an operator",
        Rule::value | Rule::quantity => "a value",
        Rule::action => "an action",
        Rule::number => "a number",
        Rule::unit => "a unit (m or s)",
        Rule::time => "a time such as 90s or 2m",
        Rule::string => "a quoted string",
        Rule::EOI => "end of input",
        _ => "input",
    }
}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(error: pest::error::Error<Rule>) -> Self {
        let (line, column) = match error.line_col {
            LineColLocation::Pos(pos) => pos,
            LineColLocation::Span(start, _) => start,
        };

        let message = match &error.variant {
            ErrorVariant::ParsingError { positives, .. } if !positives.is_empty() => {
                let mut expected: Vec<_> = positives.iter().map(describe).collect();
                expected.dedup();
                format!("expected {}", expected.join(" or "))
            }
            ErrorVariant::ParsingError { .. } => "unexpected input".to_owned(),
            ErrorVariant::CustomError { message } => message.clone(),
        };

        Self {
            message,
            location: Location { line, column },
        }
    }
}
