use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use workout_rules::{
    Action, AuthoringSession, Operator, RuleError, RuleStoreClient, SubmitError, UnavailableError,
    Value,
};

const SECTION: &str = "Goal Rules";

fn client(server: &MockServer) -> RuleStoreClient {
    RuleStoreClient::new(server.uri(), Duration::from_secs(5)).unwrap()
}

fn grammar_json() -> serde_json::Value {
    json!({
        "variables": ["muscle_group", "goal", "duration", "age", "fitness_level", "Exercise.difficulty"],
        "operators": ["==", "!=", "<", ">", "<=", ">="],
        "actions": ["include_exercise", "sets", "set_rest_time"],
        "exercise_names": ["Bench Press", "Squats", "Deadlifts"],
        "goal_types": ["Muscle Gain", "Fat Loss", "Strength", "Endurance"],
        "muscles": ["Chest", "Back", "Legs"],
        "levels": ["Beginner", "Intermediate", "Advanced"],
        "customizable_sr": true
    })
}

fn stored_rules_json() -> serde_json::Value {
    json!({
        "status": "success",
        "rules": [
            {
                "id": 1,
                "name": "Rule 1",
                "conditions": [{"id": 10, "rule_id": 1, "variable": "goal", "operator": "==", "value": "Strength"}],
                "actions": [{"id": 20, "rule_id": 1, "action_type": "sets_reps", "exercise_name": null, "sets_count": 5, "reps_count": 5, "min_rest_time": null, "max_rest_time": null}]
            },
            {
                "id": 3,
                "name": "Rule 3",
                "conditions": [{"variable": "age", "operator": ">=", "value": "40"}],
                "actions": [{"action_type": "rest_time", "min_rest_time": 60, "max_rest_time": 120}]
            }
        ]
    })
}

async fn mount_grammar(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/analyze-grammar"))
        .respond_with(ResponseTemplate::new(200).set_body_json(grammar_json()))
        .mount(server)
        .await;
}

async fn mount_rules(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/get-rules"))
        .and(query_param("type", SECTION))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored_rules_json()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_load_grammar() {
    let server = MockServer::start().await;
    mount_grammar(&server).await;

    let catalog = client(&server).load_grammar().await.unwrap();
    assert_eq!(catalog.variables().len(), 6);
    assert_eq!(catalog.operators().count(), 6);
    assert_eq!(catalog.action_types().count(), 3);
    assert!(catalog.has_exercise("Squats"));
    assert!(catalog.customizable_sr());
}

#[tokio::test]
async fn test_load_grammar_server_error_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/analyze-grammar"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_json(json!({"status": "error", "message": "db down"})),
        )
        .mount(&server)
        .await;

    let err = client(&server).load_grammar().await.unwrap_err();
    assert!(matches!(err, UnavailableError::Status { status: 500, .. }));

    let err = AuthoringSession::open(client(&server), SECTION)
        .await
        .unwrap_err();
    assert!(matches!(err, UnavailableError::Status { .. }));
}

#[tokio::test]
async fn test_incomplete_grammar_is_unavailable() {
    let incomplete = [
        json!({"status": "ok"}),
        json!({"variables": ["age"], "operators": ["=="]}),
        json!({"variables": [], "operators": ["=="], "actions": ["sets"]}),
        json!({"variables": ["age"], "operators": ["=~"], "actions": ["sets"]}),
        json!({"variables": ["age"], "operators": ["=="], "actions": ["stretch"]}),
    ];

    for body in incomplete {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/analyze-grammar"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
            .mount(&server)
            .await;

        let err = client(&server).load_grammar().await.unwrap_err();
        assert!(
            matches!(err, UnavailableError::Malformed { .. }),
            "{} gave {:?}",
            body,
            err
        );
        assert!(AuthoringSession::open(client(&server), SECTION).await.is_err());
    }
}

#[tokio::test]
async fn test_unreachable_server_is_unavailable() {
    let client = RuleStoreClient::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();

    let err = client.load_grammar().await.unwrap_err();
    assert!(matches!(err, UnavailableError::Transport { .. }));

    let err = client.list(None).await.unwrap_err();
    assert!(matches!(err, UnavailableError::Transport { .. }));
}

#[tokio::test]
async fn test_list_decodes_store_rules() {
    let server = MockServer::start().await;
    mount_rules(&server).await;

    let rules = client(&server).list(Some(SECTION)).await.unwrap();
    assert_eq!(rules.len(), 2);

    assert_eq!(rules[0].id, Some(1));
    assert_eq!(rules[0].conditions[0].value, Value::Text("Strength".to_owned()));
    assert_eq!(
        rules[0].action,
        Action::Sets {
            sets_count: 5,
            reps_count: 5
        }
    );

    // The store sends every value as text; only a catalog can type it.
    assert_eq!(rules[1].conditions[0].operator, Operator::Ge);
    assert_eq!(rules[1].conditions[0].value, Value::Text("40".to_owned()));
    assert_eq!(
        rules[1].action,
        Action::SetRestTime {
            min_rest_seconds: 60,
            max_rest_seconds: 120
        }
    );
}

#[tokio::test]
async fn test_session_list_types_values_from_catalog() {
    let server = MockServer::start().await;
    mount_grammar(&server).await;
    mount_rules(&server).await;

    let session = AuthoringSession::open(client(&server), SECTION).await.unwrap();
    let rules = session.list().await.unwrap();

    assert_eq!(rules[0].conditions[0].value, Value::Text("Strength".to_owned()));
    assert_eq!(rules[1].conditions[0].value, Value::Number(40));
    assert_eq!(
        rules[1].to_dsl(),
        "rule Rule 3 if age >= 40 then set_rest_time min 1m max 2m"
    );
}

#[tokio::test]
async fn test_list_rejects_rule_without_action() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/get-rules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rules": [{"id": 1, "name": "Rule 1", "conditions": [], "actions": []}]
        })))
        .mount(&server)
        .await;

    let err = client(&server).list(None).await.unwrap_err();
    assert!(matches!(err, UnavailableError::Malformed { .. }));
}

#[tokio::test]
async fn test_syntax_error_is_reported_and_nothing_is_stored() {
    let server = MockServer::start().await;
    mount_rules(&server).await;

    let bad = "rule Rule4 if age >> 3 then sets 3 reps 10";
    Mock::given(method("POST"))
        .and(path("/validate-rule"))
        .and(body_json(json!({ "rule": bad })))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "status": "invalid",
            "message": "Syntax error: Expected value at position (1, 19)",
            "location": {"line": 1, "column": 19}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/add-rule"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client(&server);
    let before = client.list(Some(SECTION)).await.unwrap();

    let err = client.submit(SECTION, bad).await.unwrap_err();
    match err {
        RuleError::Syntax { message, location } => {
            assert!(message.starts_with("Syntax error"));
            let location = location.unwrap();
            assert_eq!((location.line, location.column), (1, 19));
        }
        other => panic!("expected a syntax error, got {:?}", other),
    }

    let after = client.list(Some(SECTION)).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_semantic_rejection_carries_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/validate-rule"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "status": "invalid",
            "message": "Invalid exercise: Handstand",
            "errors": ["Invalid exercise: Handstand"]
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .validate_text(r#"rule Rule1 if age > 20 then include_exercise "Handstand""#)
        .await
        .unwrap_err();
    match err {
        RuleError::Semantic {
            message,
            location,
            errors,
        } => {
            assert_eq!(message, "Invalid exercise: Handstand");
            assert!(location.is_none());
            assert_eq!(errors.len(), 1);
        }
        other => panic!("expected a semantic error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_validate_text_report() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/validate-rule"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "valid",
            "message": "Rule is valid",
            "rule": {"name": "Rule 1", "conditions": [], "action": {"type": "sets_reps"}}
        })))
        .mount(&server)
        .await;

    let report = client(&server)
        .validate_text("rule Rule1 if age > 20 then sets 3 reps 10")
        .await
        .unwrap();
    assert_eq!(report.message, "Rule is valid");
    assert_eq!(report.parsed.unwrap()["name"], "Rule 1");
}

#[tokio::test]
async fn test_session_submit_names_validates_and_stores() {
    let server = MockServer::start().await;
    mount_grammar(&server).await;
    mount_rules(&server).await;

    let expected = r#"rule Rule4 if goal == "Fat Loss" and duration >= 20m then set_rest_time min 45s max 1m"#;
    Mock::given(method("POST"))
        .and(path("/validate-rule"))
        .and(body_json(json!({ "rule": expected })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "valid", "message": "Rule is valid"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/add-rule"))
        .and(body_json(json!({ "type": SECTION, "rule": expected })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "Rule added with rest_time action",
            "rule": {
                "id": 4,
                "name": "Rule 4",
                "conditions": [
                    {"variable": "goal", "operator": "==", "value": "Fat Loss"},
                    {"variable": "duration", "operator": ">=", "value": "20"}
                ],
                "actions": [{"action_type": "rest_time", "min_rest_time": 45, "max_rest_time": 60}]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = AuthoringSession::open(client(&server), SECTION).await.unwrap();
    let mut draft = session.new_draft();
    draft.add_condition("goal", "==", "Fat Loss").unwrap();
    draft.add_condition("duration", ">=", "20").unwrap();
    draft
        .set_action(Action::SetRestTime {
            min_rest_seconds: 45,
            max_rest_seconds: 60,
        })
        .unwrap();

    let stored = session.submit(&draft).await.unwrap();
    assert_eq!(stored.id, Some(4));
    assert_eq!(stored.conditions.len(), 2);
    assert_eq!(draft.conditions().len(), 2);
}

#[tokio::test]
async fn test_session_never_sends_locally_invalid_rule() {
    let server = MockServer::start().await;
    mount_grammar(&server).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let session = AuthoringSession::open(client(&server), SECTION).await.unwrap();

    let draft = session.new_draft();
    let err = session.submit(&draft).await.unwrap_err();
    assert!(matches!(err, SubmitError::Incomplete(_)));

    let mut rule = workout_rules::parse_rule("rule Rule9 if age > 20 then sets 11 reps 10").unwrap();
    let err = session
        .submit_rule(&rule, session.catalog())
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::Invalid(ref errors) if errors.len() == 1));

    rule.conditions.clear();
    let err = session
        .submit_rule(&rule, session.catalog())
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::Invalid(_)));
}

#[tokio::test]
async fn test_session_submit_keeps_draft_on_rejection() {
    let server = MockServer::start().await;
    mount_grammar(&server).await;
    mount_rules(&server).await;
    Mock::given(method("POST"))
        .and(path("/validate-rule"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "status": "invalid",
            "message": "Invalid variable: age"
        })))
        .mount(&server)
        .await;

    let session = AuthoringSession::open(client(&server), SECTION).await.unwrap();
    let mut draft = session.new_draft();
    draft.add_condition("age", ">", "30").unwrap();
    draft
        .set_action(Action::Sets {
            sets_count: 3,
            reps_count: 12,
        })
        .unwrap();
    let before = draft.to_draft_rule().unwrap();

    let err = session.submit(&draft).await.unwrap_err();
    assert!(matches!(
        err,
        SubmitError::Rejected(RuleError::Semantic { .. })
    ));
    assert_eq!(draft.to_draft_rule().unwrap(), before);
}

#[tokio::test]
async fn test_reload_does_not_change_existing_draft() {
    let server = MockServer::start().await;
    mount_grammar(&server).await;

    let mut session = AuthoringSession::open(client(&server), SECTION).await.unwrap();
    let mut draft = session.new_draft();

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/analyze-grammar"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "variables": ["age"],
            "operators": ["=="],
            "actions": ["sets"]
        })))
        .mount(&server)
        .await;
    session.reload_grammar().await.unwrap();

    assert!(draft.add_condition("goal", "==", "Strength").is_ok());
    assert!(session
        .new_draft()
        .add_condition("goal", "==", "Strength")
        .is_err());
}
