use std::fmt;
use std::str::FromStr;

pub type VariableName = String;
pub type RuleName = String;
pub type ExerciseName = String;
pub type RuleId = i64;

/// Scalar variable whose values are minutes and carry the `m` unit in the DSL.
pub const DURATION_VARIABLE: &str = "duration";
pub const AGE_VARIABLE: &str = "age";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl Operator {
    pub const ALL: [Operator; 6] = [
        Operator::Eq,
        Operator::Ne,
        Operator::Lt,
        Operator::Gt,
        Operator::Le,
        Operator::Ge,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
        }
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        Operator::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == token)
            .ok_or_else(|| token.to_owned())
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Right-hand side of a condition. Enumerated domains hold `Text`, numeric
/// ranges hold `Number`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Number(i64),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Number(n) => write!(f, "{}", n),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Condition {
    pub variable: VariableName,
    pub operator: Operator,
    pub value: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKind {
    IncludeExercise,
    Sets,
    SetRestTime,
}

impl ActionKind {
    pub const ALL: [ActionKind; 3] = [
        ActionKind::IncludeExercise,
        ActionKind::Sets,
        ActionKind::SetRestTime,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::IncludeExercise => "include_exercise",
            ActionKind::Sets => "sets",
            ActionKind::SetRestTime => "set_rest_time",
        }
    }

    /// Accepts the DSL token as well as the name the store persists.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "include_exercise" => Some(ActionKind::IncludeExercise),
            "sets" | "sets_reps" => Some(ActionKind::Sets),
            "set_rest_time" | "rest_time" => Some(ActionKind::SetRestTime),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    IncludeExercise {
        exercise_name: ExerciseName,
    },
    Sets {
        sets_count: u32,
        reps_count: u32,
    },
    SetRestTime {
        min_rest_seconds: u32,
        max_rest_seconds: u32,
    },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::IncludeExercise { .. } => ActionKind::IncludeExercise,
            Action::Sets { .. } => ActionKind::Sets,
            Action::SetRestTime { .. } => ActionKind::SetRestTime,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rule {
    /// Assigned by the store; `None` while the rule is a draft.
    pub id: Option<RuleId>,
    pub name: RuleName,
    pub conditions: Vec<Condition>,
    pub action: Action,
}
