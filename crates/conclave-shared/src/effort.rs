//! # Reasoning Effort Estimation
//!
//! Deterministic scoring of task content into a [`ReasoningEffort`] level,
//! with a diagnostics record explaining every decision. The estimator is a
//! pure function of its inputs: identical inputs always produce identical
//! outputs and diagnostics.
//!
//! Scoring pipeline:
//!
//! 1. Count whole-word keyword occurrences per category (substring matching
//!    for multi-word phrases), weighted per category.
//! 2. Add an overlap bonus when three or more categories match.
//! 3. Derive adaptive word-count thresholds from the complexity score.
//! 4. Pick a base effort from score and length.
//! 5. Apply event, intent, confidence and deadline adjustments, plus a
//!    guardrail that keeps complex-keyword tasks out of `low`.
//!
//! An optional [`EffortTuner`] records task outcomes in a bounded ring buffer
//! and nudges category weights and base thresholds inside hard clamp ranges.
//! It is disabled unless turned on in configuration.

use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;
use tracing::debug;

use crate::messages::{MessageIntent, ReasoningEffort, TaskEvent};

// =============================================================================
// Keyword categories
// =============================================================================

const ANALYTICAL_KEYWORDS: &[&str] = &[
    "analyze",
    "evaluate",
    "assess",
    "research",
    "investigate",
    "study",
    "examine",
    "review",
    "diagnose",
    "audit",
    "survey",
    "inspect",
];

const COMPARATIVE_KEYWORDS: &[&str] = &[
    "compare",
    "contrast",
    "differentiate",
    "versus",
    "pros and cons",
    "trade-off",
    "benchmark",
    "measure against",
    "weigh",
    "rank",
];

const CREATIVE_KEYWORDS: &[&str] = &[
    "design",
    "create",
    "optimize",
    "improve",
    "innovate",
    "develop",
    "build",
    "construct",
    "craft",
    "devise",
    "formulate",
    "invent",
];

const COMPLEX_KEYWORDS: &[&str] = &[
    "hypothesize",
    "synthesize",
    "debate",
    "refactor",
    "architect",
    "theorize",
    "model",
    "simulate",
    "predict",
    "extrapolate",
    "integrate",
    "transform",
    "restructure",
];

const CATEGORY_NAMES: [&str; 4] = ["analytical", "comparative", "creative", "complex"];

/// Tunable per-category keyword weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CategoryWeights {
    pub analytical: f64,
    pub comparative: f64,
    pub creative: f64,
    pub complex: f64,
}

impl Default for CategoryWeights {
    fn default() -> Self {
        CategoryWeights {
            analytical: 1.0,
            comparative: 1.5,
            creative: 2.0,
            complex: 2.5,
        }
    }
}

// Clamp ranges for adaptive tuning
const WEIGHT_MIN: f64 = 0.5;
const WEIGHT_MAX: f64 = 5.0;
const MEDIUM_THRESHOLD_MIN: f64 = 5.0;
const MEDIUM_THRESHOLD_MAX: f64 = 30.0;
const HIGH_THRESHOLD_MIN: f64 = 30.0;
const HIGH_THRESHOLD_MAX: f64 = 100.0;

// =============================================================================
// Diagnostics
// =============================================================================

/// Word-count thresholds used for a single estimate, after complexity scaling
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    pub high: f64,
    pub medium: f64,
}

/// Full record of how an effort level was decided
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffortDiagnostics {
    pub word_count: usize,
    pub complexity_score: f64,
    /// Keyword hit counts per category, plus `overlap_bonus` when applied
    pub category_scores: BTreeMap<String, f64>,
    pub thresholds: Thresholds,
    pub base_effort: ReasoningEffort,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_adjustment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent_adjustment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_adjustment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_adjustment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_adjustment: Option<String>,
    pub final_effort: ReasoningEffort,
}

// =============================================================================
// Estimator
// =============================================================================

/// Effort estimator with tunable weights and base thresholds.
///
/// [`EffortEstimator::default`] carries the reference weights; [`EffortTuner`]
/// produces adjusted instances when auto-tuning is enabled.
#[derive(Debug, Clone, PartialEq)]
pub struct EffortEstimator {
    pub weights: CategoryWeights,
    /// Base word-count threshold for `high` before complexity scaling
    pub base_high_threshold: f64,
    /// Base word-count threshold for `medium` before complexity scaling
    pub base_medium_threshold: f64,
}

impl Default for EffortEstimator {
    fn default() -> Self {
        EffortEstimator {
            weights: CategoryWeights::default(),
            base_high_threshold: 50.0,
            base_medium_threshold: 20.0,
        }
    }
}

impl EffortEstimator {
    pub fn estimate(
        &self,
        content: &str,
        event: Option<TaskEvent>,
        intent: Option<MessageIntent>,
        confidence: Option<f64>,
        deadline_pressure: Option<f64>,
    ) -> (ReasoningEffort, EffortDiagnostics) {
        let content_lower = content.to_lowercase();
        let word_count = content.split_whitespace().count();

        let counts = [
            count_category(&content_lower, ANALYTICAL_KEYWORDS),
            count_category(&content_lower, COMPARATIVE_KEYWORDS),
            count_category(&content_lower, CREATIVE_KEYWORDS),
            count_category(&content_lower, COMPLEX_KEYWORDS),
        ];
        let weights = [
            self.weights.analytical,
            self.weights.comparative,
            self.weights.creative,
            self.weights.complex,
        ];

        let mut category_scores = BTreeMap::new();
        let mut score = 0.0;
        for (i, name) in CATEGORY_NAMES.iter().enumerate() {
            category_scores.insert(name.to_string(), counts[i] as f64);
            score += counts[i] as f64 * weights[i];
        }

        // Tasks spanning several keyword domains tend to be harder than any
        // single category suggests.
        let active_categories = counts.iter().filter(|&&c| c > 0).count();
        if active_categories > 2 {
            let overlap_bonus = 0.5 * (active_categories as f64 - 2.0);
            score += overlap_bonus;
            category_scores.insert("overlap_bonus".to_string(), overlap_bonus);
        }

        let thresholds = Thresholds {
            high: (self.base_high_threshold - 5.0 * score).max(10.0),
            medium: (self.base_medium_threshold - 2.0 * score).max(5.0),
        };

        let base_effort = if score >= 3.0 || word_count as f64 > thresholds.high {
            ReasoningEffort::High
        } else if score >= 1.0 || word_count as f64 > thresholds.medium {
            ReasoningEffort::Medium
        } else {
            ReasoningEffort::Low
        };

        let mut diagnostics = EffortDiagnostics {
            word_count,
            complexity_score: score,
            category_scores,
            thresholds,
            base_effort,
            event_adjustment: None,
            intent_adjustment: None,
            confidence_adjustment: None,
            deadline_adjustment: None,
            category_adjustment: None,
            final_effort: base_effort,
        };
        let mut effort = base_effort;

        if let Some(event) = event {
            match event {
                TaskEvent::Refine | TaskEvent::Escalate | TaskEvent::Critique
                | TaskEvent::Conclude => {
                    effort = ReasoningEffort::High;
                    diagnostics.event_adjustment =
                        Some(format!("Increased to HIGH due to {} event", event.as_str()));
                }
                TaskEvent::Plan | TaskEvent::Execute if effort == ReasoningEffort::Low => {
                    effort = ReasoningEffort::Medium;
                    diagnostics.event_adjustment = Some(format!(
                        "Increased to MEDIUM due to {} event",
                        event.as_str()
                    ));
                }
                _ => {}
            }
        }

        if intent == Some(MessageIntent::ModifyTask) && effort != ReasoningEffort::High {
            effort = ReasoningEffort::High;
            diagnostics.intent_adjustment =
                Some("Increased to HIGH due to modify_task intent".to_string());
        }

        if let Some(confidence) = confidence {
            if confidence < 0.7 {
                effort = effort.bumped();
                diagnostics.confidence_adjustment = Some(format!(
                    "Bumped to {} due to low confidence ({confidence})",
                    effort.as_str().to_uppercase()
                ));
            }
        }

        if let Some(pressure) = deadline_pressure {
            if pressure > 0.8 {
                effort = ReasoningEffort::High;
                diagnostics.deadline_adjustment = Some(format!(
                    "Increased to HIGH due to high deadline pressure ({pressure})"
                ));
            }
        }

        // Complex keywords should never land in low effort.
        let complex_count = counts[3];
        if complex_count > 0 && effort == ReasoningEffort::Low {
            effort = ReasoningEffort::Medium;
            diagnostics.category_adjustment =
                Some("Bumped to MEDIUM due to presence of complex keywords".to_string());
        }

        diagnostics.final_effort = effort;
        (effort, diagnostics)
    }
}

/// Estimate with the reference weights and thresholds
pub fn estimate_effort(
    content: &str,
    event: Option<TaskEvent>,
    intent: Option<MessageIntent>,
    confidence: Option<f64>,
    deadline_pressure: Option<f64>,
) -> (ReasoningEffort, EffortDiagnostics) {
    EffortEstimator::default().estimate(content, event, intent, confidence, deadline_pressure)
}

fn count_category(content_lower: &str, keywords: &[&str]) -> usize {
    keywords
        .iter()
        .map(|kw| {
            if kw.contains(' ') {
                count_substring(content_lower, kw)
            } else {
                count_whole_word(content_lower, kw)
            }
        })
        .sum()
}

fn count_substring(haystack: &str, needle: &str) -> usize {
    let mut count = 0;
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        count += 1;
        start += pos + needle.len();
    }
    count
}

fn count_whole_word(haystack: &str, needle: &str) -> usize {
    let mut count = 0;
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        let begin = start + pos;
        let end = begin + needle.len();
        let boundary_before = haystack[..begin]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let boundary_after = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if boundary_before && boundary_after {
            count += 1;
        }
        start = end;
    }
    count
}

// =============================================================================
// Outcome recording and adaptive tuning
// =============================================================================

/// One completed task observed by the tuner
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeSample {
    pub task_id: String,
    pub diagnostics: EffortDiagnostics,
    pub duration_secs: f64,
    pub success: bool,
}

/// Tuner configuration; tuning is opt-in
#[derive(Debug, Clone)]
pub struct TuningConfig {
    pub enabled: bool,
    pub history_limit: usize,
    pub min_samples_for_tuning: usize,
}

impl Default for TuningConfig {
    fn default() -> Self {
        TuningConfig {
            enabled: false,
            history_limit: 1000,
            min_samples_for_tuning: 10,
        }
    }
}

/// Records task outcomes and periodically adjusts estimator weights.
///
/// Weight adjustments stay within [0.5, 5.0]; base thresholds within
/// [5, 30] (medium) and [30, 100] (high). A category is only adjusted once
/// it has at least `min_samples_for_tuning` samples.
#[derive(Debug)]
pub struct EffortTuner {
    config: TuningConfig,
    samples: VecDeque<OutcomeSample>,
    estimator: EffortEstimator,
}

impl EffortTuner {
    pub fn new(config: TuningConfig) -> Self {
        EffortTuner {
            config,
            samples: VecDeque::new(),
            estimator: EffortEstimator::default(),
        }
    }

    /// Current estimator, reflecting any tuning applied so far
    pub fn estimator(&self) -> &EffortEstimator {
        &self.estimator
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Record a completed task. No-op while tuning is disabled.
    pub fn record_outcome(&mut self, sample: OutcomeSample) {
        if !self.config.enabled {
            return;
        }
        if self.samples.len() >= self.config.history_limit {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.maybe_tune();
    }

    fn maybe_tune(&mut self) {
        for (index, name) in CATEGORY_NAMES.iter().enumerate() {
            let relevant: Vec<&OutcomeSample> = self
                .samples
                .iter()
                .filter(|s| {
                    s.diagnostics
                        .category_scores
                        .get(*name)
                        .is_some_and(|&c| c > 0.0)
                })
                .collect();
            if relevant.len() < self.config.min_samples_for_tuning {
                continue;
            }

            let success_rate = relevant.iter().filter(|s| s.success).count() as f64
                / relevant.len() as f64;
            let current = self.weight(index);
            // Low success on a category means its tasks were harder than
            // estimated; push the weight up. Near-perfect success means the
            // estimate was inflated.
            let adjusted = if success_rate < 0.5 {
                (current * 1.1).clamp(WEIGHT_MIN, WEIGHT_MAX)
            } else if success_rate > 0.9 {
                (current * 0.9).clamp(WEIGHT_MIN, WEIGHT_MAX)
            } else {
                current
            };
            if (adjusted - current).abs() > f64::EPSILON {
                debug!(
                    category = name,
                    success_rate,
                    previous = current,
                    adjusted,
                    "Tuned effort category weight"
                );
                self.set_weight(index, adjusted);
            }
        }

        self.estimator.base_medium_threshold = self
            .estimator
            .base_medium_threshold
            .clamp(MEDIUM_THRESHOLD_MIN, MEDIUM_THRESHOLD_MAX);
        self.estimator.base_high_threshold = self
            .estimator
            .base_high_threshold
            .clamp(HIGH_THRESHOLD_MIN, HIGH_THRESHOLD_MAX);
    }

    fn weight(&self, index: usize) -> f64 {
        match index {
            0 => self.estimator.weights.analytical,
            1 => self.estimator.weights.comparative,
            2 => self.estimator.weights.creative,
            _ => self.estimator.weights.complex,
        }
    }

    fn set_weight(&mut self, index: usize, value: f64) {
        match index {
            0 => self.estimator.weights.analytical = value,
            1 => self.estimator.weights.comparative = value,
            2 => self.estimator.weights.creative = value,
            _ => self.estimator.weights.complex = value,
        }
    }
}
