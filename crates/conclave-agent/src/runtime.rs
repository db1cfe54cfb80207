//! # Agent Runtime
//!
//! Composes the lifecycle, heartbeat loop and listener loop around any
//! [`AgentHandler`]. Each inbound envelope is dispatched on its own task so
//! a slow handler never stalls the listener; a handler error or panic is
//! reported with a best-effort `publish_error` and the agent keeps running.

use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use conclave_shared::bus::{agent_channel, heartbeat_key, BusClient, HEARTBEAT_ALIVE};
use conclave_shared::messages::{codec, Envelope, MessageIntent};
use conclave_shared::{ConclaveConfig, ConclaveResult};

use crate::context::AgentContext;
use crate::handler::{AgentHandler, HandlerResult, TaskUpdate};

/// Lifecycle state of an agent process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Created,
    Initialized,
    Running,
    Stopping,
    Stopped,
}

/// Long-lived runtime for one agent
pub struct AgentRuntime {
    handler: Arc<dyn AgentHandler>,
    config: Arc<ConclaveConfig>,
    bus: Option<BusClient>,
    context: Option<Arc<AgentContext>>,
    state: AgentState,
    cancel: CancellationToken,
    heartbeat_handle: Option<JoinHandle<()>>,
    listener_handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for AgentRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRuntime")
            .field("agent", &self.handler.name())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl AgentRuntime {
    pub fn new(handler: Arc<dyn AgentHandler>, config: Arc<ConclaveConfig>) -> Self {
        AgentRuntime {
            handler,
            config,
            bus: None,
            context: None,
            state: AgentState::Created,
            cancel: CancellationToken::new(),
            heartbeat_handle: None,
            listener_handle: None,
        }
    }

    /// Use an existing bus client instead of connecting at initialize time
    pub fn with_bus(mut self, bus: BusClient) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    /// Context handle; available once initialized
    pub fn context(&self) -> Option<Arc<AgentContext>> {
        self.context.clone()
    }

    /// Acquire the bus client and build the shared context
    pub async fn initialize(&mut self) -> ConclaveResult<()> {
        if self.state != AgentState::Created {
            return Ok(());
        }
        let bus = match self.bus.take() {
            Some(bus) => bus,
            None => BusClient::connect(&self.config.redis_url)
                .await?
                .with_publish_deadline(self.config.publish_deadline()),
        };
        let context = Arc::new(AgentContext::new(
            self.handler.name(),
            bus,
            self.config.clone(),
        ));
        self.context = Some(context);
        self.state = AgentState::Initialized;
        info!(agent = self.handler.name(), "Agent initialized");
        Ok(())
    }

    /// Initialize if needed, then spawn the heartbeat and listener loops
    pub async fn start(&mut self) -> ConclaveResult<()> {
        match self.state {
            AgentState::Running => {
                warn!(agent = self.handler.name(), "Agent already running");
                return Ok(());
            }
            AgentState::Created => self.initialize().await?,
            _ => {}
        }
        let ctx = self
            .context
            .clone()
            .unwrap_or_else(|| unreachable!("initialized runtime always has a context"));

        self.heartbeat_handle = Some(tokio::spawn(heartbeat_loop(
            ctx.clone(),
            self.cancel.clone(),
        )));
        self.listener_handle = Some(tokio::spawn(listener_loop(
            self.handler.clone(),
            ctx.clone(),
            self.cancel.clone(),
        )));
        self.state = AgentState::Running;

        info!(
            agent = self.handler.name(),
            channel = %agent_channel(self.handler.name()),
            "Agent started"
        );
        ctx.publish_system_message("Agent started and ready.", "system")
            .await;
        Ok(())
    }

    /// Signal cancellation and await both loops within the grace period
    pub async fn stop(&mut self) {
        if self.state != AgentState::Running {
            return;
        }
        self.state = AgentState::Stopping;
        info!(agent = self.handler.name(), "Agent stopping");
        self.cancel.cancel();

        let grace = self.config.shutdown_grace();
        for handle in [self.listener_handle.take(), self.heartbeat_handle.take()]
            .into_iter()
            .flatten()
        {
            let mut handle = handle;
            if tokio::time::timeout(grace, &mut handle).await.is_err() {
                warn!(
                    agent = self.handler.name(),
                    "Activity did not stop within grace period, aborting"
                );
                handle.abort();
            }
        }

        self.state = AgentState::Stopped;
        info!(agent = self.handler.name(), "Agent stopped");
    }
}

/// Write `<agent>_heartbeat = "alive"` with TTL every interval.
///
/// On write failure the sleep doubles, capped at twice the interval.
async fn heartbeat_loop(ctx: Arc<AgentContext>, cancel: CancellationToken) {
    let key = heartbeat_key(&ctx.agent_name);
    let interval = ctx.config.heartbeat_interval();
    let ttl = ctx.config.heartbeat_ttl();
    let mut sleep_for = interval;

    debug!(
        agent = %ctx.agent_name,
        interval_secs = interval.as_secs(),
        ttl_secs = ttl.as_secs(),
        "Heartbeat loop started"
    );

    loop {
        match ctx.bus.set_with_ttl(&key, HEARTBEAT_ALIVE, ttl).await {
            Ok(()) => {
                trace!(agent = %ctx.agent_name, "Heartbeat written");
                sleep_for = interval;
            }
            Err(e) => {
                error!(agent = %ctx.agent_name, error = %e, "Heartbeat write failed");
                sleep_for = (sleep_for * 2).min(interval * 2);
            }
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(sleep_for) => {}
        }
    }
    debug!(agent = %ctx.agent_name, "Heartbeat loop finished");
}

/// Subscribe to the agent's own channel and dispatch each envelope
/// concurrently. Decode errors produce one log line and no envelope.
async fn listener_loop(
    handler: Arc<dyn AgentHandler>,
    ctx: Arc<AgentContext>,
    cancel: CancellationToken,
) {
    let mut subscription = ctx.bus.subscribe(&agent_channel(&ctx.agent_name));
    debug!(agent = %ctx.agent_name, "Listener loop started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            message = subscription.next() => match message {
                Some(bytes) => match codec::decode(&bytes) {
                    Ok(envelope) => {
                        tokio::spawn(dispatch_envelope(
                            handler.clone(),
                            ctx.clone(),
                            envelope,
                        ));
                    }
                    Err(e) => {
                        warn!(agent = %ctx.agent_name, error = %e, "Dropping undecodable envelope");
                    }
                },
                None => break,
            }
        }
    }
    debug!(agent = %ctx.agent_name, "Listener loop finished");
}

/// Run one handler invocation, reporting errors and panics without taking
/// down the listener.
async fn dispatch_envelope(
    handler: Arc<dyn AgentHandler>,
    ctx: Arc<AgentContext>,
    envelope: Envelope,
) {
    let task_id = envelope.task_id().to_string();
    let outcome = std::panic::AssertUnwindSafe(route(handler, &ctx, envelope))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(agent = %ctx.agent_name, task_id = %task_id, error = %e, "Handler failed");
            ctx.publish_error(&task_id, &format!("Error processing message: {e}"), None)
                .await;
        }
        Err(_) => {
            error!(agent = %ctx.agent_name, task_id = %task_id, "Handler panicked");
            ctx.publish_error(&task_id, "Internal error while processing message", None)
                .await;
        }
    }
}

/// The `(intent, body type)` dispatch table
async fn route(
    handler: Arc<dyn AgentHandler>,
    ctx: &AgentContext,
    envelope: Envelope,
) -> HandlerResult {
    match envelope {
        Envelope::Task(task) => match task.intent {
            MessageIntent::StartTask => handler.handle_start_task(ctx, task).await,
            MessageIntent::ModifyTask => {
                handler.handle_modify_task(ctx, TaskUpdate::Task(task)).await
            }
            MessageIntent::CheckStatus => {
                handler.handle_check_status(ctx, Envelope::Task(task)).await
            }
            _ => handler.handle_unknown_message(ctx, Envelope::Task(task)).await,
        },
        Envelope::TaskResult(result) => match result.intent {
            MessageIntent::ModifyTask => {
                handler
                    .handle_modify_task(ctx, TaskUpdate::Result(result))
                    .await
            }
            MessageIntent::ToolResponse => handler.handle_tool_response(ctx, result).await,
            MessageIntent::CheckStatus => {
                handler
                    .handle_check_status(ctx, Envelope::TaskResult(result))
                    .await
            }
            _ => {
                handler
                    .handle_unknown_message(ctx, Envelope::TaskResult(result))
                    .await
            }
        },
        Envelope::Message(message) => match message.intent {
            MessageIntent::Chat => handler.handle_chat_message(ctx, message).await,
            MessageIntent::System => handler.handle_system_message(ctx, message).await,
            MessageIntent::Orchestration => {
                handler.handle_orchestration_message(ctx, message).await
            }
            MessageIntent::CheckStatus => {
                handler
                    .handle_check_status(ctx, Envelope::Message(message))
                    .await
            }
            _ => {
                handler
                    .handle_unknown_message(ctx, Envelope::Message(message))
                    .await
            }
        },
        Envelope::StreamUpdate(update) => {
            handler
                .handle_unknown_message(ctx, Envelope::StreamUpdate(update))
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerError;
    use async_trait::async_trait;
    use conclave_shared::messages::{factories, Task, TaskEvent};
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct RecordingAgent {
        name: String,
        seen: mpsc::UnboundedSender<String>,
        fail_on_start_task: bool,
    }

    #[async_trait]
    impl AgentHandler for RecordingAgent {
        fn name(&self) -> &str {
            &self.name
        }

        async fn handle_start_task(&self, _ctx: &AgentContext, task: Task) -> HandlerResult {
            if self.fail_on_start_task {
                return Err(HandlerError::new("synthetic failure"));
            }
            let _ = self.seen.send(format!("start:{}", task.task_id));
            Ok(())
        }

        async fn handle_modify_task(
            &self,
            _ctx: &AgentContext,
            update: TaskUpdate,
        ) -> HandlerResult {
            let _ = self.seen.send(format!("modify:{}", update.task_id()));
            Ok(())
        }
    }

    fn test_config() -> Arc<ConclaveConfig> {
        let mut config = ConclaveConfig::default();
        config.heartbeat_interval = 1;
        config.heartbeat_ttl = 2;
        Arc::new(config)
    }

    #[tokio::test]
    async fn lifecycle_transitions() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let handler = Arc::new(RecordingAgent {
            name: "proto".into(),
            seen: tx,
            fail_on_start_task: false,
        });
        let mut runtime =
            AgentRuntime::new(handler, test_config()).with_bus(BusClient::in_memory());
        assert_eq!(runtime.state(), AgentState::Created);
        runtime.start().await.unwrap();
        assert_eq!(runtime.state(), AgentState::Running);
        runtime.stop().await;
        assert_eq!(runtime.state(), AgentState::Stopped);
    }

    #[tokio::test]
    async fn dispatches_start_task_to_handler() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler = Arc::new(RecordingAgent {
            name: "gpt".into(),
            seen: tx,
            fail_on_start_task: false,
        });
        let bus = BusClient::in_memory();
        let mut runtime = AgentRuntime::new(handler, test_config()).with_bus(bus.clone());
        runtime.start().await.unwrap();

        let task = factories::create_task(
            "user",
            "do something",
            "gpt",
            Some("t-42".into()),
            MessageIntent::StartTask,
            TaskEvent::Plan,
            0.9,
        );
        bus.publish_envelope("gpt_channel", &Envelope::Task(task)).await;

        let seen = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen, "start:t-42");
        runtime.stop().await;
    }

    #[tokio::test]
    async fn heartbeat_marker_is_written() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let handler = Arc::new(RecordingAgent {
            name: "pulse".into(),
            seen: tx,
            fail_on_start_task: false,
        });
        let bus = BusClient::in_memory();
        let mut runtime = AgentRuntime::new(handler, test_config()).with_bus(bus.clone());
        runtime.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            bus.get("pulse_heartbeat").await.unwrap().as_deref(),
            Some(HEARTBEAT_ALIVE)
        );
        runtime.stop().await;
    }

    #[tokio::test]
    async fn handler_failure_emits_error_and_listener_survives() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler = Arc::new(RecordingAgent {
            name: "gpt".into(),
            seen: tx,
            fail_on_start_task: true,
        });
        let bus = BusClient::in_memory();
        let mut orchestrator_channel = bus.subscribe("grok_channel");
        let mut runtime = AgentRuntime::new(handler, test_config()).with_bus(bus.clone());
        runtime.start().await.unwrap();

        let task = factories::create_task(
            "user",
            "explode",
            "gpt",
            Some("t-boom".into()),
            MessageIntent::StartTask,
            TaskEvent::Plan,
            0.9,
        );
        bus.publish_envelope("gpt_channel", &Envelope::Task(task)).await;

        // Best-effort failure report lands on the orchestrator channel.
        let envelope = tokio::time::timeout(
            Duration::from_secs(1),
            orchestrator_channel.next_envelope(),
        )
        .await
        .unwrap()
        .unwrap();
        match envelope {
            Envelope::TaskResult(r) => {
                assert_eq!(r.task_id, "t-boom");
                assert_eq!(r.event, TaskEvent::Fail);
            }
            other => panic!("expected failure result, got {other:?}"),
        }

        // And the listener keeps dispatching afterwards.
        let result = factories::create_task_result(
            "t-next",
            "grok",
            "feedback",
            "gpt",
            TaskEvent::Refine,
            conclave_shared::messages::TaskOutcome::InProgress,
            MessageIntent::ModifyTask,
            None,
            0.9,
        );
        bus.publish_envelope("gpt_channel", &Envelope::TaskResult(result))
            .await;
        let seen = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen, "modify:t-next");
        runtime.stop().await;
    }
}
