use itertools::Itertools;

use crate::ast::{Action, Condition, Rule, Value, DURATION_VARIABLE};

const SECONDS_PER_MINUTE: u32 = 60;

impl Rule {
    /// Canonical DSL text; condition order is kept as is.
    pub fn to_dsl(&self) -> String {
        let mut s = String::new();
        s.push_str("rule ");
        s.push_str(&self.name);
        s.push_str(" if ");
        s.push_str(&self.conditions.iter().map(Condition::to_dsl).join(" and "));
        s.push_str(" then ");
        s.push_str(&self.action.to_dsl());
        s
    }
}

impl Condition {
    pub fn to_dsl(&self) -> String {
        let value = match &self.value {
            Value::Text(text) => quote(text),
            Value::Number(minutes) if self.variable == DURATION_VARIABLE => {
                format!("{}m", minutes)
            }
            Value::Number(n) => n.to_string(),
        };
        format!("{} {} {}", self.variable, self.operator, value)
    }
}

impl Action {
    pub fn to_dsl(&self) -> String {
        match self {
            Action::IncludeExercise { exercise_name } => {
                format!("include_exercise {}", quote(exercise_name))
            }
            Action::Sets {
                sets_count,
                reps_count,
            } => format!("sets {} reps {}", sets_count, reps_count),
            Action::SetRestTime {
                min_rest_seconds,
                max_rest_seconds,
            } => format!(
                "set_rest_time min {} max {}",
                rest_time(*min_rest_seconds),
                rest_time(*max_rest_seconds)
            ),
        }
    }
}

pub fn serialize(rule: &Rule) -> String {
    rule.to_dsl()
}

// Whole minutes use `m` so the store's minute-only grammar accepts them.
fn rest_time(seconds: u32) -> String {
    if seconds % SECONDS_PER_MINUTE == 0 {
        format!("{}m", seconds / SECONDS_PER_MINUTE)
    } else {
        format!("{}s", seconds)
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}
