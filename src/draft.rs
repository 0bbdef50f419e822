use std::sync::Arc;

use crate::ast::{Action, Condition, Operator, Rule, RuleName};
use crate::error::{IncompleteRuleError, IndexError, ValidationError};
use crate::grammar::GrammarCatalog;
use crate::parser::is_rule_name;
use crate::validate::{check_action, coerce_value};

/// Name given to a draft until the session numbers it against the store.
pub const DEFAULT_RULE_NAME: &str = "Rule1";

/// Mutable rule under construction. It never holds a condition or action that
/// failed the per-field checks against its catalog snapshot.
#[derive(Clone, Debug)]
pub struct RuleDraft {
    catalog: Arc<GrammarCatalog>,
    name: RuleName,
    conditions: Vec<Condition>,
    action: Option<Action>,
}

impl RuleDraft {
    pub fn new(catalog: Arc<GrammarCatalog>) -> Self {
        Self {
            catalog,
            name: DEFAULT_RULE_NAME.to_owned(),
            conditions: vec![],
            action: None,
        }
    }

    /// The catalog this draft was started against. A grammar reload does not
    /// change it.
    pub fn catalog(&self) -> &Arc<GrammarCatalog> {
        &self.catalog
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Only names the DSL can carry are accepted, so a renamed draft still
    /// parses back after serialization.
    pub fn set_name(&mut self, name: impl Into<RuleName>) -> Result<(), ValidationError> {
        let name = name.into();
        if !is_rule_name(&name) {
            return Err(ValidationError::InvalidRuleName { name });
        }
        self.name = name;
        Ok(())
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn action(&self) -> Option<&Action> {
        self.action.as_ref()
    }

    pub fn add_condition(
        &mut self,
        variable: &str,
        operator: &str,
        value: &str,
    ) -> Result<(), ValidationError> {
        let variable = variable.trim();
        if variable.is_empty() {
            return Err(ValidationError::MissingVariable);
        }
        let domain = self
            .catalog
            .domain_of(variable)
            .ok_or_else(|| ValidationError::UnknownVariable {
                variable: variable.to_owned(),
            })?;

        let operator: Operator = operator
            .trim()
            .parse()
            .map_err(|operator| ValidationError::UnknownOperator { operator })?;
        if !self.catalog.has_operator(operator) {
            return Err(ValidationError::UnknownOperator {
                operator: operator.to_string(),
            });
        }

        let value = coerce_value(variable, value, domain)?;

        self.conditions.push(Condition {
            variable: variable.to_owned(),
            operator,
            value,
        });
        Ok(())
    }

    pub fn remove_condition(&mut self, index: usize) -> Result<Condition, IndexError> {
        if index >= self.conditions.len() {
            return Err(IndexError {
                index,
                len: self.conditions.len(),
            });
        }
        Ok(self.conditions.remove(index))
    }

    /// Replaces the action. On error the previous action is kept.
    pub fn set_action(&mut self, action: Action) -> Result<(), ValidationError> {
        if let Some(error) = check_action(&action, &self.catalog).into_iter().next() {
            return Err(error);
        }
        self.action = Some(action);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.conditions.clear();
        self.action = None;
    }

    pub fn to_draft_rule(&self) -> Result<Rule, IncompleteRuleError> {
        if self.conditions.is_empty() {
            return Err(IncompleteRuleError::NoConditions);
        }
        let action = self.action.clone().ok_or(IncompleteRuleError::NoAction)?;

        Ok(Rule {
            id: None,
            name: self.name.clone(),
            conditions: self.conditions.clone(),
            action,
        })
    }
}
