use std::collections::BTreeSet;

use serde::Deserialize;

use crate::ast::{ActionKind, Operator, Rule, Value, AGE_VARIABLE, DURATION_VARIABLE};
use crate::error::RangeDescription;

pub const AGE_RANGE: NumericRange = NumericRange {
    min: 15,
    max: Some(100),
};
pub const DURATION_RANGE: NumericRange = NumericRange { min: 1, max: None };
/// Record fields and unrecognized scalars only need to be non-negative.
pub const OPEN_RANGE: NumericRange = NumericRange { min: 0, max: None };

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NumericRange {
    pub min: i64,
    pub max: Option<i64>,
}

impl NumericRange {
    pub fn contains(&self, value: i64) -> bool {
        value >= self.min && self.max.map_or(true, |max| value <= max)
    }

    pub fn describe(&self) -> RangeDescription {
        RangeDescription {
            min: self.min,
            max: self.max,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Goal,
    MuscleGroup,
    FitnessLevel,
    Exercise,
}

impl Category {
    fn for_name(name: &str) -> Option<Self> {
        match name {
            "goal" | "goal_type" => Some(Category::Goal),
            "muscle_group" | "muscle" => Some(Category::MuscleGroup),
            "fitness_level" | "level" => Some(Category::FitnessLevel),
            "exercise" | "exercise_name" | "name" => Some(Category::Exercise),
            _ => None,
        }
    }
}

/// What a variable's value may be: one of a fixed list, or a number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueDomain<'a> {
    Enumerated(&'a [String]),
    NumericRange(NumericRange),
}

impl<'a> ValueDomain<'a> {
    pub fn is_enumerated(&self) -> bool {
        matches!(self, ValueDomain::Enumerated(_))
    }
}

/// Wire shape of `GET /analyze-grammar`. Variables, operators and actions
/// are required; the value lists may be absent.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CatalogWire {
    pub variables: Vec<String>,
    pub operators: Vec<String>,
    pub actions: Vec<String>,
    #[serde(default)]
    pub exercise_names: Vec<String>,
    #[serde(default)]
    pub goal_types: Vec<String>,
    #[serde(default)]
    pub muscles: Vec<String>,
    #[serde(default)]
    pub levels: Vec<String>,
    #[serde(default)]
    pub customizable_sr: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GrammarCatalog {
    variables: Vec<String>,
    operators: BTreeSet<Operator>,
    action_types: BTreeSet<ActionKind>,
    exercise_names: Vec<String>,
    goal_types: Vec<String>,
    muscles: Vec<String>,
    levels: Vec<String>,
    customizable_sr: bool,
}

impl From<CatalogWire> for GrammarCatalog {
    fn from(wire: CatalogWire) -> Self {
        // Tokens this client cannot express are dropped rather than offered.
        let operators = wire
            .operators
            .iter()
            .filter_map(|token| token.parse().ok())
            .collect();
        let action_types = wire
            .actions
            .iter()
            .filter_map(|token| ActionKind::from_token(token))
            .collect();

        let mut variables = Vec::with_capacity(wire.variables.len());
        for variable in wire.variables {
            if !variable.is_empty() && !variables.contains(&variable) {
                variables.push(variable);
            }
        }

        Self {
            variables,
            operators,
            action_types,
            exercise_names: wire.exercise_names,
            goal_types: wire.goal_types,
            muscles: wire.muscles,
            levels: wire.levels,
            customizable_sr: wire.customizable_sr,
        }
    }
}

impl GrammarCatalog {
    pub fn builder() -> CatalogWire {
        CatalogWire::default()
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn operators(&self) -> impl Iterator<Item = Operator> + '_ {
        self.operators.iter().copied()
    }

    pub fn action_types(&self) -> impl Iterator<Item = ActionKind> + '_ {
        self.action_types.iter().copied()
    }

    pub fn exercise_names(&self) -> &[String] {
        &self.exercise_names
    }

    pub fn customizable_sr(&self) -> bool {
        self.customizable_sr
    }

    /// First of variables, operators and actions left with nothing usable.
    pub fn missing_section(&self) -> Option<&'static str> {
        if self.variables.is_empty() {
            Some("variables")
        } else if self.operators.is_empty() {
            Some("operators")
        } else if self.action_types.is_empty() {
            Some("actions")
        } else {
            None
        }
    }

    pub fn has_variable(&self, variable: &str) -> bool {
        self.variables.iter().any(|v| v == variable)
    }

    pub fn has_operator(&self, operator: Operator) -> bool {
        self.operators.contains(&operator)
    }

    pub fn has_action(&self, kind: ActionKind) -> bool {
        self.action_types.contains(&kind)
    }

    pub fn has_exercise(&self, exercise: &str) -> bool {
        self.exercise_names.iter().any(|e| e == exercise)
    }

    pub fn values_of(&self, category: Category) -> &[String] {
        match category {
            Category::Goal => &self.goal_types,
            Category::MuscleGroup => &self.muscles,
            Category::FitnessLevel => &self.levels,
            Category::Exercise => &self.exercise_names,
        }
    }

    /// Resolves the domain of a catalog variable; `None` if the catalog does
    /// not offer it.
    pub fn domain_of(&self, variable: &str) -> Option<ValueDomain<'_>> {
        if !self.has_variable(variable) {
            return None;
        }
        Some(self.classify(variable))
    }

    /// The store keeps every value as text. Values of numeric variables are
    /// turned back into numbers; enumerated ones stay text even when they
    /// look numeric.
    pub fn assign_value_types(&self, rule: &mut Rule) {
        for condition in &mut rule.conditions {
            let number = match (&condition.value, self.domain_of(&condition.variable)) {
                (Value::Text(text), Some(ValueDomain::NumericRange(_))) => text.trim().parse().ok(),
                _ => None,
            };
            if let Some(n) = number {
                condition.value = Value::Number(n);
            }
        }
    }

    fn classify(&self, variable: &str) -> ValueDomain<'_> {
        match variable {
            AGE_VARIABLE => return ValueDomain::NumericRange(AGE_RANGE),
            DURATION_VARIABLE => return ValueDomain::NumericRange(DURATION_RANGE),
            _ => {}
        }

        let field = match variable.split_once('.') {
            Some((_, field)) => field,
            None => variable,
        };
        match Category::for_name(field) {
            Some(category) => ValueDomain::Enumerated(self.values_of(category)),
            None => ValueDomain::NumericRange(OPEN_RANGE),
        }
    }
}

impl CatalogWire {
    pub fn variables<I: IntoIterator<Item = S>, S: Into<String>>(mut self, items: I) -> Self {
        self.variables = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn operators<I: IntoIterator<Item = S>, S: Into<String>>(mut self, items: I) -> Self {
        self.operators = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn actions<I: IntoIterator<Item = S>, S: Into<String>>(mut self, items: I) -> Self {
        self.actions = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn exercise_names<I: IntoIterator<Item = S>, S: Into<String>>(mut self, items: I) -> Self {
        self.exercise_names = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn goal_types<I: IntoIterator<Item = S>, S: Into<String>>(mut self, items: I) -> Self {
        self.goal_types = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn muscles<I: IntoIterator<Item = S>, S: Into<String>>(mut self, items: I) -> Self {
        self.muscles = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn levels<I: IntoIterator<Item = S>, S: Into<String>>(mut self, items: I) -> Self {
        self.levels = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> GrammarCatalog {
        GrammarCatalog::from(self)
    }
}
