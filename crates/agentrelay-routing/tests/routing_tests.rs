//! Router and routing client scenarios

use agentrelay_core::config::RetryConfig;
use agentrelay_core::{AgentCard, AgentRegistration, Error, MessageRequest, Result, RoutingOutcome, Task};
use agentrelay_registry::store::MemoryStore;
use agentrelay_registry::{AgentDirectory, SystemClock};
use agentrelay_routing::*;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ===========================================================================
// Helpers
// ===========================================================================

type Reply = std::result::Result<RoutingOutcome, TransportError>;

/// Transport that answers from a per-endpoint script and records every send.
#[derive(Default)]
struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    sent: Mutex<Vec<(String, MessageRequest)>>,
    delay: Option<Duration>,
}

impl ScriptedTransport {
    fn script(self, endpoint: &str, replies: Vec<Reply>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), replies.into_iter().collect());
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn endpoints_sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(e, _)| e.clone()).collect()
    }
}

#[async_trait]
impl AgentTransport for ScriptedTransport {
    async fn send(&self, endpoint: &str, request: &MessageRequest) -> Reply {
        self.sent.lock().unwrap().push((endpoint.to_string(), request.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(endpoint)
            .and_then(|q| q.pop_front());
        next.unwrap_or_else(|| Err(TransportError::Unavailable(format!("nothing scripted for {}", endpoint))))
    }
}

fn card(name: &str, capability: &str) -> AgentCard {
    AgentCard::from_registration(
        AgentRegistration::new(name, endpoint(name)).with_capability(capability),
        Utc::now(),
    )
}

fn endpoint(name: &str) -> String {
    format!("http://{}/message", name)
}

fn handover(name: &str, capability: &str) -> Reply {
    Ok(RoutingOutcome::handover(card(name, capability)))
}

fn fast_config() -> ClientConfig {
    ClientConfig {
        max_hops: 5,
        hop_timeout: Duration::from_secs(1),
        chain_timeout: Duration::from_secs(30),
        retry: RetryConfig {
            max_retries: 2,
            initial_backoff_ms: 100,
            max_backoff_ms: 400,
            multiplier: 2.0,
        },
    }
}

fn client(transport: &Arc<ScriptedTransport>, config: ClientConfig) -> RoutingClient {
    RoutingClient::new(transport.clone(), config)
}

async fn directory() -> AgentDirectory {
    let dir = AgentDirectory::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock), Duration::from_secs(30));
    dir.register(
        AgentRegistration::new("weather-agent", endpoint("weather-agent"))
            .with_description("Current conditions and forecasts")
            .with_capability("weather"),
    )
    .await
    .unwrap();
    dir.register(
        AgentRegistration::new("finance-agent", endpoint("finance-agent"))
            .with_description("Stock quotes and exchange rates")
            .with_capability("finance"),
    )
    .await
    .unwrap();
    dir
}

// ===========================================================================
// Router
// ===========================================================================

#[tokio::test]
async fn router_hands_weather_task_to_weather_agent() {
    let router = Router::new("router-agent", Arc::new(directory().await), CapabilityMatcher::default());
    let request = MessageRequest::new("ctx-1", "What's it like in Berlin?").with_capability_hint("weather");
    match router.route(&request).await.unwrap() {
        RoutingOutcome::HandoverSuggestion { card } => assert_eq!(card.name, "weather-agent"),
        other => panic!("Expected handover, got {:?}", other),
    }
}

#[tokio::test]
async fn router_matches_on_payload_without_hint() {
    let router = Router::new("router-agent", Arc::new(directory().await), CapabilityMatcher::default());
    let request = MessageRequest::new("ctx-2", "Latest finance news and stock quotes please");
    match router.route(&request).await.unwrap() {
        RoutingOutcome::HandoverSuggestion { card } => assert_eq!(card.name, "finance-agent"),
        other => panic!("Expected handover, got {:?}", other),
    }
}

#[tokio::test]
async fn router_reports_no_route_for_unknown_capability() {
    let router = Router::new("router-agent", Arc::new(directory().await), CapabilityMatcher::default());
    let request = MessageRequest::new("ctx-3", "Book me a flight").with_capability_hint("travel");
    assert_eq!(router.route(&request).await.unwrap(), RoutingOutcome::NoRoute);
}

#[tokio::test]
async fn router_skips_visited_agents() {
    let router = Router::new("router-agent", Arc::new(directory().await), CapabilityMatcher::default());
    let mut request = MessageRequest::new("ctx-4", "weather").with_capability_hint("weather");
    request.visited = vec!["router-agent".into(), "weather-agent".into()];
    assert_eq!(router.route(&request).await.unwrap(), RoutingOutcome::NoRoute);
}

async fn directory_with(registrations: Vec<AgentRegistration>) -> AgentDirectory {
    let dir = AgentDirectory::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock), Duration::from_secs(30));
    for registration in registrations {
        dir.register(registration).await.unwrap();
    }
    dir
}

fn handed_to(outcome: RoutingOutcome) -> String {
    match outcome {
        RoutingOutcome::HandoverSuggestion { card } => card.name,
        other => panic!("Expected handover, got {:?}", other),
    }
}

#[tokio::test]
async fn router_routes_on_two_letter_capability() {
    let dir = directory_with(vec![
        AgentRegistration::new("ml-agent", endpoint("ml-agent")).with_capability("ml")
    ])
    .await;
    let router = Router::new("router-agent", Arc::new(dir), CapabilityMatcher::default());
    let request = MessageRequest::new("ctx-ml", "train a model").with_capability_hint("ml");
    assert_eq!(handed_to(router.route(&request).await.unwrap()), "ml-agent");
}

#[tokio::test]
async fn router_routes_to_agent_with_many_capabilities() {
    let mut meteo = AgentRegistration::new("meteo", endpoint("meteo"));
    for tag in [
        "weather", "maps", "traffic", "news", "sports", "music", "recipes", "travel", "finance", "jokes",
    ] {
        meteo = meteo.with_capability(tag);
    }
    let router = Router::new("router-agent", Arc::new(directory_with(vec![meteo]).await), CapabilityMatcher::default());
    let request = MessageRequest::new("ctx-meteo", "Berlin tomorrow?").with_capability_hint("weather");
    assert_eq!(handed_to(router.route(&request).await.unwrap()), "meteo");
}

#[tokio::test]
async fn router_hint_folds_non_ascii_case() {
    let dir = directory_with(vec![
        AgentRegistration::new("meteo", endpoint("meteo")).with_capability("Météo")
    ])
    .await;
    let router = Router::new("router-agent", Arc::new(dir), CapabilityMatcher::default());
    let request = MessageRequest::new("ctx-fr", "Paris demain ?").with_capability_hint("MÉTÉO");
    assert_eq!(handed_to(router.route(&request).await.unwrap()), "meteo");
}

#[tokio::test]
async fn router_propagates_source_errors() {
    struct Broken;

    #[async_trait]
    impl CandidateSource for Broken {
        async fn candidates(&self, _: Option<&str>) -> Result<Vec<AgentCard>> {
            Err(Error::Storage("disk gone".into()))
        }
    }

    let router = Router::new("router-agent", Arc::new(Broken), CapabilityMatcher::default());
    let err = router.route(&MessageRequest::new("ctx", "weather")).await.unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
}

// ===========================================================================
// Routing client
// ===========================================================================

#[tokio::test]
async fn follows_handover_to_final_answer() {
    let transport = Arc::new(
        ScriptedTransport::default()
            .script(&endpoint("router-agent"), vec![handover("weather-agent", "weather")])
            .script(&endpoint("weather-agent"), vec![Ok(RoutingOutcome::answer("12°C"))]),
    );
    let done = client(&transport, fast_config())
        .send(
            Target::new("router-agent", endpoint("router-agent")),
            Task::new("ctx-weather", "Weather in Berlin?"),
        )
        .await
        .unwrap();

    assert_eq!(done.answer, "12°C");
    assert_eq!(done.visited, vec!["router-agent", "weather-agent"]);
    assert_eq!(done.context_id.as_str(), "ctx-weather");

    // Context and chain travel with every hop.
    let sent = transport.sent.lock().unwrap();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|(_, r)| r.context_id.as_str() == "ctx-weather"));
    assert_eq!(sent[1].1.hop_hint, Some(2));
    assert_eq!(sent[1].1.visited, vec!["router-agent", "weather-agent"]);
}

#[tokio::test]
async fn ping_pong_is_a_loop() {
    let transport = Arc::new(
        ScriptedTransport::default()
            .script(&endpoint("weather-agent"), vec![handover("finance-agent", "finance")])
            .script(&endpoint("finance-agent"), vec![handover("weather-agent", "weather")]),
    );
    let failure = client(&transport, fast_config())
        .send(
            Target::new("weather-agent", endpoint("weather-agent")),
            Task::new("ctx-loop", "hello"),
        )
        .await
        .unwrap_err();

    assert_eq!(failure.reason, FailureReason::LoopDetected);
    assert_eq!(failure.visited, vec!["weather-agent", "finance-agent"]);
    assert_eq!(transport.endpoints_sent().len(), 2);
}

#[tokio::test]
async fn no_route_is_not_retried() {
    let transport = Arc::new(
        ScriptedTransport::default().script(&endpoint("router-agent"), vec![Ok(RoutingOutcome::NoRoute)]),
    );
    let failure = client(&transport, fast_config())
        .send(Target::new("router-agent", endpoint("router-agent")), Task::new("ctx", "?"))
        .await
        .unwrap_err();
    assert_eq!(failure.reason, FailureReason::NoRoute);
    assert_eq!(failure.visited, vec!["router-agent"]);
    assert_eq!(transport.endpoints_sent().len(), 1);
}

#[tokio::test]
async fn long_chain_stops_at_hop_limit() {
    let mut transport = ScriptedTransport::default();
    for i in 0..10 {
        transport = transport.script(
            &endpoint(&format!("agent-{}", i)),
            vec![handover(&format!("agent-{}", i + 1), "x")],
        );
    }
    let transport = Arc::new(transport);
    let config = ClientConfig {
        max_hops: 3,
        ..fast_config()
    };
    let failure = client(&transport, config)
        .send(Target::new("agent-0", endpoint("agent-0")), Task::new("ctx", "go"))
        .await
        .unwrap_err();

    assert_eq!(failure.reason, FailureReason::HopLimitExceeded);
    assert_eq!(failure.visited, vec!["agent-0", "agent-1", "agent-2"]);
    assert_eq!(transport.endpoints_sent().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_against_same_target() {
    let transport = Arc::new(ScriptedTransport::default().script(
        &endpoint("weather-agent"),
        vec![
            Err(TransportError::Unavailable("503".into())),
            Err(TransportError::Unavailable("503".into())),
            Ok(RoutingOutcome::answer("sunny")),
        ],
    ));
    let done = client(&transport, fast_config())
        .send(Target::new("weather-agent", endpoint("weather-agent")), Task::new("ctx", "?"))
        .await
        .unwrap();
    assert_eq!(done.answer, "sunny");
    // Retries do not count as hops.
    assert_eq!(done.visited, vec!["weather-agent"]);
    assert_eq!(transport.endpoints_sent().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_are_unreachable() {
    let transport = Arc::new(ScriptedTransport::default());
    let failure = client(&transport, fast_config())
        .send(Target::new("ghost", endpoint("ghost")), Task::new("ctx", "?"))
        .await
        .unwrap_err();
    assert_eq!(failure.reason, FailureReason::TargetUnreachable);
    assert_eq!(failure.visited, vec!["ghost"]);
    // One try plus two retries.
    assert_eq!(transport.endpoints_sent().len(), 3);
}

#[tokio::test]
async fn malformed_reply_fails_without_retry() {
    let transport = Arc::new(ScriptedTransport::default().script(
        &endpoint("weather-agent"),
        vec![Err(TransportError::Malformed("expected value at line 1".into()))],
    ));
    let failure = client(&transport, fast_config())
        .send(Target::new("weather-agent", endpoint("weather-agent")), Task::new("ctx", "?"))
        .await
        .unwrap_err();
    assert_eq!(failure.reason, FailureReason::ProtocolError);
    assert_eq!(transport.endpoints_sent().len(), 1);
}

#[tokio::test]
async fn handover_without_endpoint_is_protocol_error() {
    let mut bad = card("nowhere", "x");
    bad.endpoint.clear();
    let transport = Arc::new(
        ScriptedTransport::default().script(&endpoint("router-agent"), vec![Ok(RoutingOutcome::handover(bad))]),
    );
    let failure = client(&transport, fast_config())
        .send(Target::new("router-agent", endpoint("router-agent")), Task::new("ctx", "?"))
        .await
        .unwrap_err();
    assert_eq!(failure.reason, FailureReason::ProtocolError);
    assert_eq!(failure.visited, vec!["router-agent"]);
}

#[tokio::test(start_paused = true)]
async fn slow_hop_times_out_then_gives_up() {
    let transport = Arc::new(
        ScriptedTransport::default()
            .script(&endpoint("slow"), vec![Ok(RoutingOutcome::answer("late"))])
            .with_delay(Duration::from_secs(5)),
    );
    let failure = client(&transport, fast_config())
        .send(Target::new("slow", endpoint("slow")), Task::new("ctx", "?"))
        .await
        .unwrap_err();
    assert_eq!(failure.reason, FailureReason::TargetUnreachable);
    assert!(failure.detail.contains("timed out"));
}

#[tokio::test(start_paused = true)]
async fn chain_deadline_short_circuits() {
    let transport = Arc::new(
        ScriptedTransport::default()
            .script(&endpoint("slow"), vec![Ok(RoutingOutcome::answer("late"))])
            .with_delay(Duration::from_secs(5)),
    );
    let config = ClientConfig {
        hop_timeout: Duration::from_secs(60),
        chain_timeout: Duration::from_secs(2),
        ..fast_config()
    };
    let failure = client(&transport, config)
        .send(Target::new("slow", endpoint("slow")), Task::new("ctx", "?"))
        .await
        .unwrap_err();
    assert_eq!(failure.reason, FailureReason::ChainTimeout);
    assert_eq!(failure.visited, vec!["slow"]);
}

#[tokio::test]
async fn cancelled_before_start_sends_nothing() {
    let transport = Arc::new(ScriptedTransport::default());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let failure = client(&transport, fast_config())
        .send_cancellable(Target::new("a", endpoint("a")), Task::new("ctx", "?"), cancel)
        .await
        .unwrap_err();
    assert_eq!(failure.reason, FailureReason::Cancelled);
    assert!(failure.visited.is_empty());
    assert!(transport.endpoints_sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancel_mid_hop_discards_the_answer() {
    let transport = Arc::new(
        ScriptedTransport::default()
            .script(&endpoint("a"), vec![Ok(RoutingOutcome::answer("too late"))])
            .with_delay(Duration::from_millis(500)),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });
    let failure = client(&transport, fast_config())
        .send_cancellable(Target::new("a", endpoint("a")), Task::new("ctx", "?"), cancel)
        .await
        .unwrap_err();
    assert_eq!(failure.reason, FailureReason::Cancelled);
    assert_eq!(failure.visited, vec!["a"]);
    assert_eq!(transport.endpoints_sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_backoff_stops_retrying() {
    let transport = Arc::new(ScriptedTransport::default());
    let mut config = fast_config();
    config.retry = RetryConfig {
        max_retries: 5,
        initial_backoff_ms: 60_000,
        max_backoff_ms: 60_000,
        multiplier: 1.0,
    };
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let started = tokio::time::Instant::now();
    let failure = client(&transport, config)
        .send_cancellable(Target::new("down", endpoint("down")), Task::new("ctx", "?"), cancel)
        .await
        .unwrap_err();
    assert_eq!(failure.reason, FailureReason::Cancelled);
    assert_eq!(transport.endpoints_sent().len(), 1);
    assert!(started.elapsed() < Duration::from_secs(60));
}

#[tokio::test]
async fn router_and_client_together() {
    // The router is just another message handler; put it behind the scripted transport.
    let router = Router::new("router-agent", Arc::new(directory().await), CapabilityMatcher::default());
    let suggestion = router
        .handle(MessageRequest::new("ctx", "forecast?").with_capability_hint("weather"))
        .await
        .unwrap();
    let transport = Arc::new(
        ScriptedTransport::default()
            .script(&endpoint("router-agent"), vec![Ok(suggestion)])
            .script(&endpoint("weather-agent"), vec![Ok(RoutingOutcome::answer("12°C"))]),
    );
    let done = client(&transport, fast_config())
        .send(
            Target::new("router-agent", endpoint("router-agent")),
            Task::new("ctx", "forecast?").with_capability_hint("weather"),
        )
        .await
        .unwrap();
    assert_eq!(done.visited, vec!["router-agent", "weather-agent"]);
}
