//! # Task Router
//!
//! Picks the agent for a fresh task. Selection policy, in priority order:
//!
//! 1. A trained cluster model's recommendation, when one is attached and it
//!    names an available agent (`cluster_based`).
//! 2. Performance scoring when statistics exist for every candidate:
//!    `0.6 * success_rate + 0.4 * (1 / (normalized_duration + 1))`
//!    (`performance_based`).
//! 3. Uniform random (`random`).
//!
//! In every branch, with probability `learning_rate`, the chosen agent is
//! replaced by a uniformly-random alternative and the decision is marked as
//! exploration. Decisions are kept in a bounded in-memory log and appended
//! to a JSONL file when a log path is configured.
//!
//! Statistics are guarded by a mutex; updates are short critical sections.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use conclave_shared::effort::EffortDiagnostics;

const DECISION_LOG_LIMIT: usize = 1000;

/// Hook for an externally-trained task-cluster model. No model ships with
/// the core; the orchestrator runs fine without one.
pub trait ClusterModel: Send + Sync {
    fn recommend_agent(
        &self,
        content: &str,
        complexity_score: f64,
        category_scores: &BTreeMap<String, f64>,
    ) -> Option<String>;
}

/// Incrementally-maintained per-agent performance statistics
#[derive(Debug, Clone, Serialize)]
pub struct AgentStats {
    pub tasks_completed: u64,
    pub successful_tasks: u64,
    pub total_duration: f64,
    pub success_rate: f64,
    pub avg_duration: f64,
    /// Average duration relative to the all-agent mean
    pub normalized_duration: f64,
}

impl Default for AgentStats {
    fn default() -> Self {
        AgentStats {
            tasks_completed: 0,
            successful_tasks: 0,
            total_duration: 0.0,
            // Neutral priors until real data arrives
            success_rate: 0.5,
            avg_duration: 0.0,
            normalized_duration: 1.0,
        }
    }
}

/// One routing decision, persisted for analysis
#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    pub task_id: String,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub chosen_agent: String,
    pub confidence: f64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub alternatives: BTreeMap<String, f64>,
    pub exploration: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_recommendation: Option<String>,
}

#[derive(Debug, Default)]
struct RouterState {
    agent_stats: BTreeMap<String, AgentStats>,
    decision_log: VecDeque<RoutingDecision>,
}

/// Routes tasks to agents and learns from their outcomes
pub struct TaskRouter {
    default_agent: String,
    learning_rate: f64,
    cluster_model: Option<Arc<dyn ClusterModel>>,
    state: Mutex<RouterState>,
    rng: Mutex<fastrand::Rng>,
    log_path: Option<PathBuf>,
}

impl std::fmt::Debug for TaskRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRouter")
            .field("default_agent", &self.default_agent)
            .field("learning_rate", &self.learning_rate)
            .field("has_cluster_model", &self.cluster_model.is_some())
            .finish_non_exhaustive()
    }
}

impl TaskRouter {
    pub fn new(default_agent: impl Into<String>, learning_rate: f64) -> Self {
        TaskRouter {
            default_agent: default_agent.into(),
            learning_rate,
            cluster_model: None,
            state: Mutex::new(RouterState::default()),
            rng: Mutex::new(fastrand::Rng::new()),
            log_path: None,
        }
    }

    /// Fixed RNG seed; with `learning_rate = 0` routing becomes fully
    /// deterministic given identical statistics.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(fastrand::Rng::with_seed(seed));
        self
    }

    pub fn with_cluster_model(mut self, model: Arc<dyn ClusterModel>) -> Self {
        self.cluster_model = Some(model);
        self
    }

    /// Append decisions to `<path>/routing_decisions.jsonl`
    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate.clamp(0.0, 1.0);
    }

    /// Choose an agent for a task
    pub fn route(
        &self,
        task_id: &str,
        content: &str,
        available_agents: &[String],
        diagnostics: Option<&EffortDiagnostics>,
    ) -> (String, RoutingDecision) {
        let mut decision = RoutingDecision {
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
            method: "default".to_string(),
            chosen_agent: self.default_agent.clone(),
            confidence: 0.5,
            alternatives: BTreeMap::new(),
            exploration: false,
            original_recommendation: None,
        };

        if available_agents.is_empty() {
            decision.method = "default_only".to_string();
            self.log_decision(&decision);
            return (self.default_agent.clone(), decision);
        }

        let complexity = diagnostics.map(|d| d.complexity_score).unwrap_or(0.0);
        let empty_scores = BTreeMap::new();
        let category_scores = diagnostics
            .map(|d| &d.category_scores)
            .unwrap_or(&empty_scores);

        // 1. Cluster model recommendation
        if let Some(model) = &self.cluster_model {
            if let Some(recommended) =
                model.recommend_agent(content, complexity, category_scores)
            {
                if available_agents.contains(&recommended) {
                    decision.method = "cluster_based".to_string();
                    decision.chosen_agent = recommended;
                    decision.confidence = 0.8;
                    self.maybe_explore(&mut decision, available_agents);
                    self.log_decision(&decision);
                    return (decision.chosen_agent.clone(), decision);
                }
            }
        }

        // 2. Performance scoring, once every candidate has statistics
        {
            let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            if !state.agent_stats.is_empty()
                && available_agents
                    .iter()
                    .all(|a| state.agent_stats.contains_key(a))
            {
                let mut best: Option<(&String, f64)> = None;
                for agent in available_agents {
                    let stats = &state.agent_stats[agent];
                    let score = 0.6 * stats.success_rate
                        + 0.4 * (1.0 / (stats.normalized_duration + 1.0));
                    decision.alternatives.insert(agent.clone(), score);
                    if best.map_or(true, |(_, s)| score > s) {
                        best = Some((agent, score));
                    }
                }
                if let Some((agent, _)) = best {
                    decision.method = "performance_based".to_string();
                    decision.chosen_agent = agent.clone();
                    decision.confidence = 0.7;
                }
            }
        }
        if decision.method == "performance_based" {
            self.maybe_explore(&mut decision, available_agents);
            self.log_decision(&decision);
            return (decision.chosen_agent.clone(), decision);
        }

        // 3. Uniform random fallback
        let index = self
            .rng
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .usize(..available_agents.len());
        decision.method = "random".to_string();
        decision.chosen_agent = available_agents[index].clone();
        decision.confidence = 0.3;
        self.maybe_explore(&mut decision, available_agents);
        self.log_decision(&decision);
        (decision.chosen_agent.clone(), decision)
    }

    /// With probability `learning_rate`, swap the chosen agent for a random
    /// alternative and mark the decision as exploration.
    fn maybe_explore(&self, decision: &mut RoutingDecision, available_agents: &[String]) {
        if self.learning_rate <= 0.0 {
            return;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        if rng.f64() >= self.learning_rate {
            return;
        }
        let candidates: Vec<&String> = available_agents
            .iter()
            .filter(|a| **a != decision.chosen_agent)
            .collect();
        if candidates.is_empty() {
            return;
        }
        let replacement = candidates[rng.usize(..candidates.len())].clone();
        decision.original_recommendation = Some(decision.chosen_agent.clone());
        decision.chosen_agent = replacement;
        decision.exploration = true;
    }

    /// Feed a completed task back into the statistics
    pub fn record_outcome(&self, agent: &str, duration_secs: f64, success: bool) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let stats = state.agent_stats.entry(agent.to_string()).or_default();
        stats.tasks_completed += 1;
        if success {
            stats.successful_tasks += 1;
        }
        stats.total_duration += duration_secs;
        stats.success_rate = stats.successful_tasks as f64 / stats.tasks_completed as f64;
        stats.avg_duration = stats.total_duration / stats.tasks_completed as f64;

        // Normalize every agent against the current all-agent mean.
        let averages: Vec<f64> = state
            .agent_stats
            .values()
            .filter(|s| s.tasks_completed > 0)
            .map(|s| s.avg_duration)
            .collect();
        let overall = averages.iter().sum::<f64>() / averages.len().max(1) as f64;
        if overall > 0.0 {
            for stats in state.agent_stats.values_mut() {
                if stats.tasks_completed > 0 {
                    stats.normalized_duration = stats.avg_duration / overall;
                }
            }
        }
        debug!(agent, duration_secs, success, "Recorded task outcome");
    }

    pub fn agent_stats(&self, agent: &str) -> Option<AgentStats> {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .agent_stats
            .get(agent)
            .cloned()
    }

    pub fn decision_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .decision_log
            .len()
    }

    pub fn last_decision(&self) -> Option<RoutingDecision> {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .decision_log
            .back()
            .cloned()
    }

    fn log_decision(&self, decision: &RoutingDecision) {
        {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            if state.decision_log.len() >= DECISION_LOG_LIMIT {
                state.decision_log.pop_front();
            }
            state.decision_log.push_back(decision.clone());
        }

        if let Some(dir) = &self.log_path {
            if let Err(e) = append_jsonl(dir, decision) {
                warn!(error = %e, "Failed to persist routing decision");
            }
        }
    }
}

fn append_jsonl(dir: &PathBuf, decision: &RoutingDecision) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("routing_decisions.jsonl"))?;
    let line = serde_json::to_string(decision)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    writeln!(file, "{line}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agents() -> Vec<String> {
        vec!["gpt".to_string(), "claude".to_string()]
    }

    #[test]
    fn random_fallback_without_stats() {
        let router = TaskRouter::new("gpt", 0.0).with_seed(7);
        let (agent, decision) = router.route("t-1", "hello", &agents(), None);
        assert_eq!(decision.method, "random");
        assert!(agents().contains(&agent));
        assert!(!decision.exploration);
    }

    #[test]
    fn performance_based_once_all_agents_have_stats() {
        let router = TaskRouter::new("gpt", 0.0).with_seed(7);
        // claude is faster and more successful
        router.record_outcome("gpt", 10.0, false);
        router.record_outcome("claude", 2.0, true);

        let (agent, decision) = router.route("t-2", "analyze this", &agents(), None);
        assert_eq!(decision.method, "performance_based");
        assert_eq!(agent, "claude");
        assert_eq!(decision.alternatives.len(), 2);
    }

    #[test]
    fn zero_learning_rate_is_deterministic() {
        let route_once = || {
            let router = TaskRouter::new("gpt", 0.0).with_seed(42);
            router.record_outcome("gpt", 5.0, true);
            router.record_outcome("claude", 5.0, false);
            router.route("t-3", "same input", &agents(), None).0
        };
        assert_eq!(route_once(), route_once());
    }

    #[test]
    fn full_learning_rate_always_explores() {
        let router = TaskRouter::new("gpt", 1.0).with_seed(9);
        router.record_outcome("gpt", 1.0, true);
        router.record_outcome("claude", 50.0, false);

        let (_, decision) = router.route("t-4", "anything", &agents(), None);
        assert!(decision.exploration);
        assert!(decision.original_recommendation.is_some());
        assert_ne!(
            Some(&decision.chosen_agent),
            decision.original_recommendation.as_ref()
        );
    }

    #[test]
    fn cluster_model_takes_priority() {
        struct FixedModel;
        impl ClusterModel for FixedModel {
            fn recommend_agent(
                &self,
                _content: &str,
                _complexity_score: f64,
                _category_scores: &BTreeMap<String, f64>,
            ) -> Option<String> {
                Some("claude".to_string())
            }
        }

        let router = TaskRouter::new("gpt", 0.0)
            .with_seed(1)
            .with_cluster_model(Arc::new(FixedModel));
        let (agent, decision) = router.route("t-5", "whatever", &agents(), None);
        assert_eq!(agent, "claude");
        assert_eq!(decision.method, "cluster_based");
        assert_eq!(decision.confidence, 0.8);
    }

    #[test]
    fn stats_update_incrementally() {
        let router = TaskRouter::new("gpt", 0.0);
        router.record_outcome("gpt", 4.0, true);
        router.record_outcome("gpt", 6.0, false);

        let stats = router.agent_stats("gpt").unwrap();
        assert_eq!(stats.tasks_completed, 2);
        assert_eq!(stats.success_rate, 0.5);
        assert_eq!(stats.avg_duration, 5.0);
    }

    #[test]
    fn normalized_duration_tracks_all_agent_mean() {
        let router = TaskRouter::new("gpt", 0.0);
        router.record_outcome("gpt", 2.0, true);
        router.record_outcome("claude", 6.0, true);

        let gpt = router.agent_stats("gpt").unwrap();
        let claude = router.agent_stats("claude").unwrap();
        // Mean is 4.0: gpt at 0.5x, claude at 1.5x.
        assert!((gpt.normalized_duration - 0.5).abs() < 1e-9);
        assert!((claude.normalized_duration - 1.5).abs() < 1e-9);
    }

    #[test]
    fn decisions_are_logged_to_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let router = TaskRouter::new("gpt", 0.0)
            .with_seed(3)
            .with_log_path(dir.path());
        router.route("t-6", "log me", &agents(), None);
        router.route("t-7", "log me too", &agents(), None);

        let contents =
            std::fs::read_to_string(dir.path().join("routing_decisions.jsonl")).unwrap();
        assert_eq!(contents.lines().count(), 2);
        let first: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(first["task_id"], "t-6");
        assert_eq!(router.decision_count(), 2);
    }

    #[test]
    fn empty_candidate_list_falls_back_to_default() {
        let router = TaskRouter::new("gpt", 0.5).with_seed(11);
        let (agent, decision) = router.route("t-8", "anything", &[], None);
        assert_eq!(agent, "gpt");
        assert_eq!(decision.method, "default_only");
    }
}
