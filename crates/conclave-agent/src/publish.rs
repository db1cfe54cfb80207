//! # Publishing Helpers
//!
//! Free functions over a bus client and the sending agent's identity. Every
//! update and completion goes to its target's channel and, for visibility,
//! to the frontend broadcast channel.

use conclave_shared::bus::{agent_channel, BusClient};
use conclave_shared::messages::{
    factories, Envelope, MessageIntent, TaskEvent, TaskOutcome,
};

/// Publish an envelope on another agent's dedicated channel
pub async fn publish_to_agent(bus: &BusClient, target: &str, envelope: &Envelope) {
    bus.publish_envelope(&agent_channel(target), envelope).await;
}

/// Publish an envelope on the frontend broadcast channel
pub async fn publish_to_frontend(bus: &BusClient, frontend_channel: &str, envelope: &Envelope) {
    bus.publish_envelope(frontend_channel, envelope).await;
}

/// Emit a transitional TaskResult to the target's channel and the frontend
#[allow(clippy::too_many_arguments)]
pub async fn publish_update(
    bus: &BusClient,
    agent: &str,
    frontend_channel: &str,
    task_id: &str,
    event: TaskEvent,
    content: &str,
    target: &str,
    confidence: Option<f64>,
    outcome: TaskOutcome,
) {
    let result = factories::create_task_result(
        task_id,
        agent,
        content,
        target,
        event,
        outcome,
        MessageIntent::ModifyTask,
        None,
        confidence.unwrap_or(0.9),
    );
    let envelope = Envelope::TaskResult(result);
    publish_to_agent(bus, target, &envelope).await;
    publish_to_frontend(bus, frontend_channel, &envelope).await;
}

/// Emit a terminal success TaskResult (`complete` / `success`)
#[allow(clippy::too_many_arguments)]
pub async fn publish_completion(
    bus: &BusClient,
    agent: &str,
    frontend_channel: &str,
    task_id: &str,
    content: &str,
    target: &str,
    confidence: f64,
    contributing_agents: Option<Vec<String>>,
) {
    let result = factories::create_task_result(
        task_id,
        agent,
        content,
        target,
        TaskEvent::Complete,
        TaskOutcome::Success,
        MessageIntent::ModifyTask,
        contributing_agents,
        confidence,
    );
    let envelope = Envelope::TaskResult(result);
    publish_to_agent(bus, target, &envelope).await;
    publish_to_frontend(bus, frontend_channel, &envelope).await;
}

/// Emit a terminal failure TaskResult (`fail` / `failure`, confidence 0).
///
/// The frontend always hears about errors; the target channel is skipped
/// when the sender would be messaging itself.
pub async fn publish_error(
    bus: &BusClient,
    agent: &str,
    frontend_channel: &str,
    task_id: &str,
    error_content: &str,
    target: &str,
) {
    let result = factories::create_task_result(
        task_id,
        agent,
        &format!("Error: {error_content}"),
        target,
        TaskEvent::Fail,
        TaskOutcome::Failure,
        MessageIntent::ModifyTask,
        None,
        0.0,
    );
    let envelope = Envelope::TaskResult(result);
    if target != agent {
        publish_to_agent(bus, target, &envelope).await;
    }
    publish_to_frontend(bus, frontend_channel, &envelope).await;
}

/// Publish a system message on the frontend channel
pub async fn publish_system_message(
    bus: &BusClient,
    agent: &str,
    frontend_channel: &str,
    content: &str,
    task_id: &str,
) {
    let message =
        factories::create_message(task_id, agent, content, MessageIntent::System, None);
    publish_to_frontend(bus, frontend_channel, &Envelope::Message(message)).await;
}

/// Publish a streamed output chunk on the frontend channel
pub async fn publish_stream_delta(
    bus: &BusClient,
    agent: &str,
    frontend_channel: &str,
    task_id: &str,
    delta: &str,
    done: bool,
) {
    let update = factories::create_stream_update(agent, task_id, delta, done);
    publish_to_frontend(bus, frontend_channel, &Envelope::StreamUpdate(update)).await;
}
