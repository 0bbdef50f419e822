use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ast::{Action, ActionKind, Condition, Rule, RuleId, Value};
use crate::error::{Location, RuleError, UnavailableError};
use crate::grammar::{CatalogWire, GrammarCatalog};

const GRAMMAR_ENDPOINT: &str = "/analyze-grammar";
const LIST_ENDPOINT: &str = "/get-rules";
const VALIDATE_ENDPOINT: &str = "/validate-rule";
const ADD_ENDPOINT: &str = "/add-rule";

#[derive(Debug, Serialize)]
struct ValidateRequest<'a> {
    rule: &'a str,
}

#[derive(Debug, Serialize)]
struct AddRequest<'a> {
    #[serde(rename = "type")]
    rule_type: &'a str,
    rule: &'a str,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    rules: Vec<RuleJson>,
}

/// Reply shared by `/validate-rule` and `/add-rule`.
#[derive(Debug, Default, Deserialize)]
struct RuleReply {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    location: Option<LocationJson>,
    #[serde(default)]
    errors: Vec<String>,
    #[serde(default, alias = "rule")]
    parsed: Option<serde_json::Value>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
struct LocationJson {
    line: usize,
    column: usize,
}

impl From<LocationJson> for Location {
    fn from(LocationJson { line, column }: LocationJson) -> Self {
        Location { line, column }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct RuleJson {
    pub id: Option<RuleId>,
    pub name: String,
    #[serde(default)]
    pub conditions: Vec<ConditionJson>,
    #[serde(default)]
    pub actions: Vec<ActionJson>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ConditionJson {
    pub variable: String,
    pub operator: String,
    pub value: ValueJson,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum ValueJson {
    Number(i64),
    Text(String),
}

#[derive(Clone, Debug, Deserialize)]
pub struct ActionJson {
    pub action_type: String,
    pub exercise_name: Option<String>,
    pub sets_count: Option<u32>,
    pub reps_count: Option<u32>,
    pub min_rest_time: Option<u32>,
    pub max_rest_time: Option<u32>,
}

impl From<ValueJson> for Value {
    fn from(value: ValueJson) -> Self {
        match value {
            ValueJson::Number(n) => Value::Number(n),
            // Retyped against a catalog by `GrammarCatalog::assign_value_types`.
            ValueJson::Text(s) => Value::Text(s),
        }
    }
}

impl TryFrom<ActionJson> for Action {
    type Error = String;

    fn try_from(action: ActionJson) -> Result<Self, Self::Error> {
        let kind = ActionKind::from_token(&action.action_type)
            .ok_or_else(|| format!("unknown action type {:?}", action.action_type))?;
        let missing = |field: &str| format!("{} action without {}", kind, field);

        Ok(match kind {
            ActionKind::IncludeExercise => Action::IncludeExercise {
                exercise_name: action.exercise_name.ok_or_else(|| missing("exercise_name"))?,
            },
            ActionKind::Sets => Action::Sets {
                sets_count: action.sets_count.ok_or_else(|| missing("sets_count"))?,
                reps_count: action.reps_count.ok_or_else(|| missing("reps_count"))?,
            },
            ActionKind::SetRestTime => Action::SetRestTime {
                min_rest_seconds: action.min_rest_time.ok_or_else(|| missing("min_rest_time"))?,
                max_rest_seconds: action.max_rest_time.ok_or_else(|| missing("max_rest_time"))?,
            },
        })
    }
}

impl TryFrom<RuleJson> for Rule {
    type Error = String;

    fn try_from(rule: RuleJson) -> Result<Self, Self::Error> {
        let conditions = rule
            .conditions
            .into_iter()
            .map(|condition| -> Result<Condition, String> {
                let operator = condition
                    .operator
                    .parse()
                    .map_err(|op| format!("unknown operator {:?}", op))?;
                Ok(Condition {
                    variable: condition.variable,
                    operator,
                    value: condition.value.into(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut actions = rule.actions.into_iter();
        let action = match (actions.next(), actions.next()) {
            (Some(action), None) => Action::try_from(action)?,
            (None, _) => return Err(format!("rule {:?} has no action", rule.name)),
            (Some(_), Some(_)) => return Err(format!("rule {:?} has several actions", rule.name)),
        };

        Ok(Rule {
            id: rule.id,
            name: rule.name,
            conditions,
            action,
        })
    }
}

/// Outcome of a successful `/validate-rule` call.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidationReport {
    pub message: String,
    pub parsed: Option<serde_json::Value>,
}

/// Client for the grammar, validation and rule storage endpoints.
#[derive(Clone, Debug)]
pub struct RuleStoreClient {
    http_client: Client,
    server_url: String,
}

impl RuleStoreClient {
    pub fn new(server_url: impl Into<String>, timeout: Duration) -> Result<Self, UnavailableError> {
        let server_url = server_url.into().trim_end_matches('/').to_owned();
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("workout-rules/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| UnavailableError::Transport {
                endpoint: server_url.clone(),
                source,
            })?;

        Ok(Self {
            http_client,
            server_url,
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.server_url, endpoint)
    }

    /// Fetches the current grammar. Nothing is cached: every call hits the
    /// server.
    pub async fn load_grammar(&self) -> Result<GrammarCatalog, UnavailableError> {
        debug!("Loading grammar from {}", self.server_url);
        let response = self.get(GRAMMAR_ENDPOINT, &[]).await?;
        let wire: CatalogWire = read_json(GRAMMAR_ENDPOINT, response).await?;
        let catalog = GrammarCatalog::from(wire);
        if let Some(section) = catalog.missing_section() {
            return Err(malformed(
                GRAMMAR_ENDPOINT,
                format!("grammar offers no usable {}", section),
            ));
        }
        info!(
            "Grammar loaded: {} variables, {} exercises",
            catalog.variables().len(),
            catalog.exercise_names().len()
        );
        Ok(catalog)
    }

    pub async fn list(&self, rule_type: Option<&str>) -> Result<Vec<Rule>, UnavailableError> {
        let query: Vec<(&str, &str)> = rule_type.map(|t| ("type", t)).into_iter().collect();
        let response = self.get(LIST_ENDPOINT, &query).await?;
        let list: ListResponse = read_json(LIST_ENDPOINT, response).await?;

        let rules = list
            .rules
            .into_iter()
            .map(Rule::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|message| UnavailableError::Malformed {
                endpoint: LIST_ENDPOINT.to_owned(),
                message,
            })?;
        debug!("Listed {} rules (type {:?})", rules.len(), rule_type);
        Ok(rules)
    }

    /// Asks the server to check `text` without storing it.
    pub async fn validate_text(&self, text: &str) -> Result<ValidationReport, RuleError> {
        debug!("Validating rule text: {}", text);
        let reply = self
            .post(VALIDATE_ENDPOINT, &ValidateRequest { rule: text })
            .await?;
        let reply = read_reply(VALIDATE_ENDPOINT, reply).await?;

        match reply.status.as_deref() {
            Some("valid") => Ok(ValidationReport {
                message: reply.message.unwrap_or_default(),
                parsed: reply.parsed,
            }),
            _ => Err(rejection(VALIDATE_ENDPOINT, reply)),
        }
    }

    /// Validates `text` remotely and stores it only if it was accepted.
    pub async fn submit(&self, rule_type: &str, text: &str) -> Result<Rule, RuleError> {
        if let Err(e) = self.validate_text(text).await {
            warn!("Rule rejected by validator: {}", e);
            return Err(e);
        }

        let response = self
            .post(
                ADD_ENDPOINT,
                &AddRequest {
                    rule_type,
                    rule: text,
                },
            )
            .await?;
        let reply = read_reply(ADD_ENDPOINT, response).await?;

        if matches!(reply.status.as_deref(), Some("invalid") | Some("error")) {
            let e = rejection(ADD_ENDPOINT, reply);
            warn!("Rule rejected by store: {}", e);
            return Err(e);
        }
        let stored = reply
            .parsed
            .ok_or_else(|| malformed(ADD_ENDPOINT, "reply carries no rule"))?;

        let rule: RuleJson = serde_json::from_value(stored)
            .map_err(|e| malformed(ADD_ENDPOINT, e.to_string()))?;
        let rule = Rule::try_from(rule).map_err(|message| malformed(ADD_ENDPOINT, message))?;
        info!("Stored {} with id {:?}", rule.name, rule.id);
        Ok(rule)
    }

    async fn get(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<Response, UnavailableError> {
        self.http_client
            .get(self.url(endpoint))
            .query(query)
            .send()
            .await
            .map_err(|source| UnavailableError::Transport {
                endpoint: endpoint.to_owned(),
                source,
            })
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &T,
    ) -> Result<Response, UnavailableError> {
        self.http_client
            .post(self.url(endpoint))
            .json(body)
            .send()
            .await
            .map_err(|source| UnavailableError::Transport {
                endpoint: endpoint.to_owned(),
                source,
            })
    }
}

fn malformed(endpoint: &str, message: impl Into<String>) -> UnavailableError {
    UnavailableError::Malformed {
        endpoint: endpoint.to_owned(),
        message: message.into(),
    }
}

async fn read_json<T: DeserializeOwned>(
    endpoint: &str,
    response: Response,
) -> Result<T, UnavailableError> {
    let status = response.status();
    if !status.is_success() {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(UnavailableError::Status {
            endpoint: endpoint.to_owned(),
            status: status.as_u16(),
            message,
        });
    }

    response
        .json()
        .await
        .map_err(|e| malformed(endpoint, e.to_string()))
}

/// Rejections come back as 4xx with a JSON body, so the body is read whatever
/// the status.
async fn read_reply(endpoint: &str, response: Response) -> Result<RuleReply, UnavailableError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|source| UnavailableError::Transport {
            endpoint: endpoint.to_owned(),
            source,
        })?;

    match serde_json::from_str::<RuleReply>(&body) {
        Ok(reply) if status.is_success() || reply.status.as_deref() == Some("invalid") => Ok(reply),
        Ok(reply) => Err(UnavailableError::Status {
            endpoint: endpoint.to_owned(),
            status: status.as_u16(),
            message: reply.message.unwrap_or(body),
        }),
        Err(_) if !status.is_success() => Err(UnavailableError::Status {
            endpoint: endpoint.to_owned(),
            status: status.as_u16(),
            message: body,
        }),
        Err(e) => Err(malformed(endpoint, e.to_string())),
    }
}

fn rejection(endpoint: &str, reply: RuleReply) -> RuleError {
    // Reached for `invalid` replies and for `error` replies sent with a 2xx.
    let message = reply
        .message
        .unwrap_or_else(|| "rule was rejected".to_owned());

    match reply.status.as_deref() {
        Some("invalid") => {
            let location = reply.location.map(Location::from);
            if location.is_some() || message.starts_with("Syntax error") {
                RuleError::Syntax { message, location }
            } else {
                RuleError::Semantic {
                    message,
                    location,
                    errors: reply.errors,
                }
            }
        }
        _ => RuleError::Unavailable(UnavailableError::Status {
            endpoint: endpoint.to_owned(),
            status: 200,
            message,
        }),
    }
}
