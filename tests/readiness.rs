//! End-to-end readiness: live agent runtimes write heartbeats; the
//! coordinator aggregates them into system readiness.

mod common;

use std::sync::Arc;
use std::time::Duration;

use conclave_agent::debate::{DebateAgent, DebateRole, EchoResponder};
use conclave_agent::AgentRuntime;
use conclave_coordinator::Coordinator;
use conclave_shared::bus::BusClient;

use common::test_config;

#[tokio::test]
async fn readiness_follows_heartbeats() {
    let bus = BusClient::in_memory();
    let mut config = (*test_config(3)).clone();
    config.required_agents = vec!["gpt".to_string(), "claude".to_string()];
    let config = Arc::new(config);
    let coordinator = Coordinator::new(bus.clone(), config.clone());

    // Only the proposer is up: not ready, the critic is reported missing.
    let mut proposer = AgentRuntime::new(
        Arc::new(DebateAgent::new(
            "gpt",
            DebateRole::Proposer,
            Box::new(EchoResponder),
        )),
        config.clone(),
    )
    .with_bus(bus.clone());
    proposer.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = coordinator.check_system_status().await;
    assert!(!status.system_ready);
    assert_eq!(status.missing_agents, vec!["claude".to_string()]);
    assert_eq!(status.agent_status["gpt"], "alive");

    // Once the critic starts beating, the next poll reports ready.
    let mut critic = AgentRuntime::new(
        Arc::new(DebateAgent::new(
            "claude",
            DebateRole::Critic,
            Box::new(EchoResponder),
        )),
        config.clone(),
    )
    .with_bus(bus.clone());
    critic.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = coordinator.check_system_status().await;
    assert!(status.system_ready);
    assert!(status.missing_agents.is_empty());

    // Stopped agents fall out once their TTL lapses.
    critic.stop().await;
    tokio::time::sleep(Duration::from_millis(2100)).await;
    let status = coordinator.check_system_status().await;
    assert!(!status.system_ready);
    assert_eq!(status.missing_agents, vec!["claude".to_string()]);

    proposer.stop().await;
}
