use std::sync::Arc;

use tracing::{info, warn};

use crate::ast::{Rule, RuleName};
use crate::draft::RuleDraft;
use crate::error::{SubmitError, UnavailableError};
use crate::grammar::GrammarCatalog;
use crate::store::RuleStoreClient;
use crate::validate::validate;

/// `Rule<N>` where N is one past the highest numeric suffix in use. Gaps left
/// by deleted rules are not refilled, and suffixes that cannot be incremented
/// are ignored.
pub fn next_rule_name(existing: &[Rule]) -> RuleName {
    let next = existing
        .iter()
        .filter_map(|rule| rule_number(&rule.name)?.checked_add(1))
        .max()
        .unwrap_or(1);
    format!("Rule{}", next)
}

/// Trailing number of a rule name, accepting both `Rule3` and `Rule 3`.
pub fn rule_number(name: &str) -> Option<u64> {
    let digits_start = name
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    name[digits_start..].parse().ok()
}

/// Authoring against one rule section of the store.
///
/// The catalog is held as a shared snapshot: drafts keep the snapshot they
/// were created with, so a reload never changes what an in-flight submission
/// is checked against.
#[derive(Debug)]
pub struct AuthoringSession {
    client: RuleStoreClient,
    section: String,
    catalog: Arc<GrammarCatalog>,
}

impl AuthoringSession {
    /// Loads the grammar; without it nothing can be authored.
    pub async fn open(
        client: RuleStoreClient,
        section: impl Into<String>,
    ) -> Result<Self, UnavailableError> {
        let catalog = client.load_grammar().await?;
        Ok(Self::with_catalog(client, section, catalog))
    }

    pub fn with_catalog(
        client: RuleStoreClient,
        section: impl Into<String>,
        catalog: GrammarCatalog,
    ) -> Self {
        Self {
            client,
            section: section.into(),
            catalog: Arc::new(catalog),
        }
    }

    pub fn client(&self) -> &RuleStoreClient {
        &self.client
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn catalog(&self) -> &Arc<GrammarCatalog> {
        &self.catalog
    }

    /// On failure the previous catalog stays in place.
    pub async fn reload_grammar(&mut self) -> Result<(), UnavailableError> {
        let catalog = self.client.load_grammar().await?;
        self.catalog = Arc::new(catalog);
        Ok(())
    }

    pub fn new_draft(&self) -> RuleDraft {
        RuleDraft::new(Arc::clone(&self.catalog))
    }

    /// Stored rules of the section, with values typed against the current
    /// catalog.
    pub async fn list(&self) -> Result<Vec<Rule>, UnavailableError> {
        let mut rules = self.client.list(Some(&self.section)).await?;
        for rule in &mut rules {
            self.catalog.assign_value_types(rule);
        }
        Ok(rules)
    }

    /// Names, checks and submits the draft. Local validation runs against the
    /// draft's own catalog snapshot and a locally invalid draft never reaches
    /// the network. The draft itself is left untouched either way.
    pub async fn submit(&self, draft: &RuleDraft) -> Result<Rule, SubmitError> {
        let mut rule = draft.to_draft_rule()?;
        validate(&rule, draft.catalog()).map_err(SubmitError::Invalid)?;

        let existing = self.list().await?;
        rule.name = next_rule_name(&existing);
        self.submit_rule(&rule, draft.catalog()).await
    }

    /// Submits an already built rule under its own name.
    pub async fn submit_rule(
        &self,
        rule: &Rule,
        catalog: &GrammarCatalog,
    ) -> Result<Rule, SubmitError> {
        validate(rule, catalog).map_err(SubmitError::Invalid)?;

        let text = rule.to_dsl();
        info!("Submitting {} to section {:?}", rule.name, self.section);
        match self.client.submit(&self.section, &text).await {
            Ok(mut stored) => {
                catalog.assign_value_types(&mut stored);
                info!("Accepted {} (id {:?})", stored.name, stored.id);
                Ok(stored)
            }
            Err(e) => {
                warn!("Submission of {} failed: {}", rule.name, e);
                Err(e.into())
            }
        }
    }
}
