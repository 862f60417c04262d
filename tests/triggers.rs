//! Trigger Matching Integration Tests
//!
//! Tests for dotted-path matching and trigger file loading.

use plexus::core::{ConfigError, Trigger, TriggerConfig};
use serde_json::{json, Value};
use plexus::Action;

const SCENARIO: &str = r#"{"PropertyA":"1234","Deep":{"Property":"5678"},"SomeNumeric":1}"#;

fn single_trigger(properties: &str) -> TriggerConfig {
    TriggerConfig::from_json(&format!(
        r#"{{"triggers":[{{"properties":{},"actions":[]}}]}}"#,
        properties
    ))
    .unwrap()
}

#[test]
fn test_nested_and_numeric_constraints_match() {
    let config = single_trigger(r#"{"PropertyA":"1234","Deep.Property":"5678","SomeNumeric":1.0}"#);

    assert!(config.triggers()[0].is_match_bytes(SCENARIO.as_bytes()));
}

#[test]
fn test_changed_value_does_not_match() {
    let config = single_trigger(r#"{"PropertyA":"1234","Deep.Property":"5678","SomeNumeric":1.0}"#);
    let payload = r#"{"PropertyA":"9999","Deep":{"Property":"5678"},"SomeNumeric":1}"#;

    assert!(!config.triggers()[0].is_match_bytes(payload.as_bytes()));
}

#[test]
fn test_type_mismatch_does_not_match() {
    let config = single_trigger(r#"{"PropertyA":1234}"#);

    assert!(!config.triggers()[0].is_match_bytes(SCENARIO.as_bytes()));
}

#[test]
fn test_missing_path_does_not_match() {
    let config = single_trigger(r#"{"Deep.Missing":"x"}"#);

    assert!(!config.triggers()[0].is_match_bytes(SCENARIO.as_bytes()));
}

#[test]
fn test_path_through_scalar_does_not_match() {
    let config = single_trigger(r#"{"PropertyA.Inner":"1234"}"#);

    assert!(!config.triggers()[0].is_match_bytes(SCENARIO.as_bytes()));
}

#[test]
fn test_boolean_and_real_payload_fields() {
    let config = single_trigger(r#"{"event":"media.play","Player.local":true,"Metadata.librarySectionID":3}"#);
    let trigger = &config.triggers()[0];

    let local = r#"{"event":"media.play","Player":{"local":true},"Metadata":{"librarySectionID":3}}"#;
    let remote = r#"{"event":"media.play","Player":{"local":false},"Metadata":{"librarySectionID":3}}"#;

    assert!(trigger.is_match_bytes(local.as_bytes()));
    assert!(!trigger.is_match_bytes(remote.as_bytes()));
}

#[test]
fn test_empty_properties_match_any_json() {
    let config = single_trigger("{}");
    let trigger = &config.triggers()[0];

    assert!(trigger.is_match_bytes(br#"{"event":"library.new"}"#));
    assert!(trigger.is_match_bytes(b"[]"));
    assert!(!trigger.is_match_bytes(b"not json"));
}

#[test]
fn test_load_webhook_actions_with_default_method() {
    let config = TriggerConfig::from_json(
        r#"{"triggers":[{
            "properties":{"event":"media.pause"},
            "actions":[
                {"type":"webhook","config":{"url":"http://lights.local/dim"}},
                {"type":"webhook","config":{"url":"http://lights.local/on","action":"post"}}
            ]
        }]}"#,
    )
    .unwrap();

    let actions = config.triggers()[0].actions();
    assert_eq!(actions.len(), 2);

    let Action::Webhook(first) = &actions[0];
    assert_eq!(first.method, reqwest::Method::GET);
    let Action::Webhook(second) = &actions[1];
    assert_eq!(second.method, reqwest::Method::POST);
    assert_eq!(second.url.as_str(), "http://lights.local/on");
}

#[test]
fn test_load_file_from_disk() {
    let temp = tempfile::TempDir::new().unwrap();
    let path = temp.path().join("config.json");
    std::fs::write(
        &path,
        r#"{"triggers":[{"properties":{"event":"media.stop"},"actions":[]},{"actions":[]}]}"#,
    )
    .unwrap();

    let config = TriggerConfig::from_file(&path).unwrap();
    assert_eq!(config.len(), 2);

    let missing = TriggerConfig::from_file(&temp.path().join("absent.json"));
    assert!(matches!(missing, Err(ConfigError::Read { .. })));
}

#[test]
fn test_webhook_without_url_rejects_config() {
    let result = TriggerConfig::from_json(
        r#"{"triggers":[{"actions":[{"type":"webhook","config":{"action":"PUT"}}]}]}"#,
    );

    let err = result.unwrap_err();
    assert!(matches!(err, ConfigError::Action { trigger: 0, action: 0, .. }));
    assert!(err.to_string().contains("missing URL"));
}

fn scenario_constraints() -> Vec<(String, Value)> {
    vec![
        ("PropertyA".to_string(), json!("1234")),
        ("Deep.Property".to_string(), json!("5678")),
        ("SomeNumeric".to_string(), json!(1.0)),
    ]
}

#[test]
fn test_dropping_any_satisfied_constraint_keeps_the_match() {
    let constraints = scenario_constraints();

    for skipped in 0..constraints.len() {
        let remaining: Vec<(String, Value)> = constraints
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != skipped)
            .map(|(_, c)| c.clone())
            .collect();
        let trigger = Trigger::new(remaining, Vec::new());

        assert!(
            trigger.is_match_bytes(SCENARIO.as_bytes()),
            "still matches without constraint {}",
            constraints[skipped].0
        );
    }
}

#[test]
fn test_changing_any_matched_value_breaks_the_match() {
    let constraints = scenario_constraints();

    for changed in 0..constraints.len() {
        let mut altered = constraints.clone();
        altered[changed].1 = json!("something else");
        let trigger = Trigger::new(altered, Vec::new());

        assert!(
            !trigger.is_match_bytes(SCENARIO.as_bytes()),
            "no match once {} differs",
            constraints[changed].0
        );
    }
}
