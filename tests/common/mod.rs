//! Shared helpers for the end-to-end tests: fast-paced configuration, a
//! deterministic router, and debate runtimes over the in-memory bus.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use conclave_agent::debate::{DebateAgent, DebateRole, EchoResponder};
use conclave_agent::AgentRuntime;
use conclave_orchestration::routing::ClusterModel;
use conclave_orchestration::{Orchestrator, TaskRouter};
use conclave_shared::bus::BusClient;
use conclave_shared::messages::Envelope;
use conclave_shared::ConclaveConfig;

/// Every test shares one fast-paced configuration
pub fn test_config(max_rounds: u32) -> Arc<ConclaveConfig> {
    let mut config = ConclaveConfig::default();
    config.heartbeat_interval = 1;
    config.heartbeat_ttl = 2;
    config.max_debate_rounds = max_rounds;
    config.router_learning_rate = 0.0;
    Arc::new(config)
}

/// Router recommendation pinned to the proposer, so debates always start at
/// the same agent.
pub struct AlwaysProposer;

impl ClusterModel for AlwaysProposer {
    fn recommend_agent(
        &self,
        _content: &str,
        _complexity_score: f64,
        _category_scores: &BTreeMap<String, f64>,
    ) -> Option<String> {
        Some("gpt".to_string())
    }
}

/// Start orchestrator + proposer + critic runtimes on the shared bus.
/// Returns the runtimes so tests can stop them.
pub async fn start_debate_fabric(
    bus: &BusClient,
    config: &Arc<ConclaveConfig>,
) -> Vec<AgentRuntime> {
    let router = TaskRouter::new("gpt", 0.0)
        .with_seed(17)
        .with_cluster_model(Arc::new(AlwaysProposer));
    let orchestrator = Arc::new(Orchestrator::new(config).with_router(router));

    let proposer = Arc::new(DebateAgent::new(
        "gpt",
        DebateRole::Proposer,
        Box::new(EchoResponder),
    ));
    let critic = Arc::new(DebateAgent::new(
        "claude",
        DebateRole::Critic,
        Box::new(EchoResponder),
    ));

    let mut runtimes = vec![
        AgentRuntime::new(orchestrator, config.clone()).with_bus(bus.clone()),
        AgentRuntime::new(proposer, config.clone()).with_bus(bus.clone()),
        AgentRuntime::new(critic, config.clone()).with_bus(bus.clone()),
    ];
    for runtime in &mut runtimes {
        runtime.start().await.expect("runtime must start");
    }
    runtimes
}

/// Await the next envelope on a subscription, bounded
pub async fn next_envelope(
    subscription: &mut conclave_shared::bus::Subscription,
) -> Envelope {
    tokio::time::timeout(Duration::from_secs(5), subscription.next_envelope())
        .await
        .expect("timed out waiting for envelope")
        .expect("subscription ended unexpectedly")
}
