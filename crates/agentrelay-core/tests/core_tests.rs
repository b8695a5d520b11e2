//! Tests for agentrelay-core: cards, tasks, outcomes, wire protocol, errors

use agentrelay_core::*;
use chrono::{TimeZone, Utc};

fn weather_card() -> AgentCard {
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    AgentCard::from_registration(
        AgentRegistration::new("weather-agent", "http://127.0.0.1:9001/message")
            .with_description("Answers weather questions")
            .with_capability("weather"),
        now,
    )
}

// ===========================================================================
// ContextId
// ===========================================================================

#[test]
fn context_id_new_and_display() {
    let id = ContextId::new("ctx-123");
    assert_eq!(id.as_str(), "ctx-123");
    assert_eq!(format!("{}", id), "ctx-123");
}

#[test]
fn context_id_serializes_as_plain_string() {
    let id = ContextId::from("ctx-7");
    assert_eq!(serde_json::to_string(&id).unwrap(), r#""ctx-7""#);
    let back: ContextId = serde_json::from_str(r#""ctx-7""#).unwrap();
    assert_eq!(back, id);
}

// ===========================================================================
// AgentCard
// ===========================================================================

#[test]
fn card_from_registration_stamps_both_timestamps() {
    let card = weather_card();
    assert_eq!(card.registered_at, card.last_heartbeat_at);
    assert_eq!(card.version, "1.0.0");
}

#[test]
fn card_capability_match_ignores_case() {
    let card = weather_card();
    assert!(card.has_capability("weather"));
    assert!(card.has_capability("WEATHER"));
    assert!(!card.has_capability("finance"));
}

#[test]
fn card_capability_match_folds_non_ascii_case() {
    let card = AgentCard::from_registration(
        AgentRegistration::new("meteo", "http://meteo").with_capability("Météo"),
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
    );
    assert!(card.has_capability("MÉTÉO"));
    assert!(card.has_capability("météo"));
    assert!(!card.has_capability("meteo"));
}

#[test]
fn card_uses_camel_case_on_the_wire() {
    let json = serde_json::to_value(weather_card()).unwrap();
    assert!(json.get("registeredAt").is_some());
    assert!(json.get("lastHeartbeatAt").is_some());
    assert_eq!(json["capabilities"], serde_json::json!(["weather"]));
}

#[test]
fn registration_defaults_optional_fields() {
    let reg: AgentRegistration =
        serde_json::from_str(r#"{"name":"a","endpoint":"http://a"}"#).unwrap();
    assert!(reg.capabilities.is_empty());
    assert!(reg.description.is_empty());
}

#[test]
fn empty_card_update_is_empty() {
    assert!(CardUpdate::default().is_empty());
    let update = CardUpdate {
        version: Some("2".into()),
        ..Default::default()
    };
    assert!(!update.is_empty());
}

// ===========================================================================
// Task
// ===========================================================================

#[test]
fn task_visit_keeps_hop_count_in_step() {
    let mut task = Task::new("ctx", "hello");
    assert_eq!(task.hop_count(), 0);
    assert!(task.visited().is_empty());

    task.visit("router");
    task.visit("weather-agent");
    assert_eq!(task.hop_count(), 2);
    assert_eq!(task.hop_count() as usize, task.visited().len());
    assert!(task.has_visited("router"));
    assert!(!task.has_visited("finance-agent"));
}

#[test]
fn message_request_from_task_carries_chain() {
    let mut task = Task::new("ctx-9", "weather?").with_capability_hint("weather");
    task.visit("router");
    let req = MessageRequest::from(&task);
    assert_eq!(req.context_id.as_str(), "ctx-9");
    assert_eq!(req.hop_hint, Some(1));
    assert_eq!(req.capability_hint.as_deref(), Some("weather"));
    assert_eq!(req.visited, vec!["router".to_string()]);
}

#[test]
fn message_request_minimal_wire_form() {
    let req: MessageRequest =
        serde_json::from_str(r#"{"contextId":"c","payload":"p"}"#).unwrap();
    assert!(req.hop_hint.is_none());
    assert!(req.visited.is_empty());
    let json = serde_json::to_string(&req).unwrap();
    assert!(!json.contains("hopHint"));
    assert!(!json.contains("visited"));
}

// ===========================================================================
// RoutingOutcome
// ===========================================================================

#[test]
fn outcome_answer_wire_form() {
    let json = serde_json::to_value(RoutingOutcome::answer("12°C")).unwrap();
    assert_eq!(json, serde_json::json!({ "kind": "answer", "content": "12°C" }));
}

#[test]
fn outcome_no_route_wire_form() {
    let json = serde_json::to_string(&RoutingOutcome::NoRoute).unwrap();
    assert_eq!(json, r#"{"kind":"no-route"}"#);
}

#[test]
fn outcome_handover_parses_card() {
    let card = weather_card();
    let text = serde_json::to_string(&RoutingOutcome::handover(card.clone())).unwrap();
    assert!(text.contains(r#""kind":"handover""#));
    match serde_json::from_str::<RoutingOutcome>(&text).unwrap() {
        RoutingOutcome::HandoverSuggestion { card: back } => assert_eq!(back, card),
        other => panic!("Expected handover, got {:?}", other),
    }
}

#[test]
fn outcome_unknown_kind_is_rejected() {
    let result = serde_json::from_str::<RoutingOutcome>(r#"{"kind":"maybe"}"#);
    assert!(result.is_err());
}

// ===========================================================================
// Renew requests
// ===========================================================================

#[test]
fn renew_request_flattens_update() {
    let req: RenewRequest =
        serde_json::from_str(r#"{"name":"a","capabilities":["x","y"]}"#).unwrap();
    assert_eq!(req.name, "a");
    assert_eq!(req.update.capabilities.as_ref().map(|c| c.len()), Some(2));
    assert!(req.update.endpoint.is_none());
}

#[test]
fn bare_heartbeat_serializes_name_only() {
    let json = serde_json::to_string(&RenewRequest::heartbeat("a")).unwrap();
    assert_eq!(json, r#"{"name":"a"}"#);
}

// ===========================================================================
// Errors
// ===========================================================================

#[test]
fn error_display_messages() {
    assert_eq!(Error::NotRegistered("a".into()).to_string(), "not registered: a");
    let conflict = Error::version_conflict("agents/a", Some(1), Some(2));
    assert!(conflict.to_string().contains("agents/a"));
}

#[test]
fn error_body_roundtrips_taxonomy() {
    let body = ErrorBody::from(&Error::NotRegistered("weather-agent".into()));
    assert_eq!(body.error, "not-registered");
    assert_eq!(body.message, "weather-agent");
    assert!(matches!(body.into_error(), Error::NotRegistered(n) if n == "weather-agent"));

    let body = ErrorBody::from(&Error::version_conflict("k", None, Some(3)));
    assert!(matches!(body.into_error(), Error::VersionConflict { .. }));
}

#[test]
fn recoverable_classification() {
    assert!(Error::NotFound("x".into()).is_recoverable());
    assert!(Error::version_conflict("k", None, None).is_recoverable());
    assert!(!Error::Storage("disk".into()).is_recoverable());
    assert!(!Error::NoRoute("x".into()).is_recoverable());
}
