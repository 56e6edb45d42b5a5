// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Quality-evaluation seam.
//!
//! Evaluators are independent implementations of one interface, looked
//! up through a registry map rather than a class hierarchy. The core treats
//! their scores, the aggregation weights, and the grade threshold as
//! opaque runtime configuration.

use async_trait::async_trait;
use hive_core::{Clock, Evaluation, IdGen, QualityGrade, Subtask};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("evaluator {0} is unhealthy")]
    Unhealthy(String),

    #[error("evaluator failed: {0}")]
    Failed(String),
}

/// One pluggable quality evaluator.
#[async_trait]
pub trait Evaluator: Send + Sync {
    fn name(&self) -> &str;

    /// Score a subtask output in `0.0..=1.0`.
    async fn evaluate(&self, output: &serde_json::Value) -> Result<f64, EvalError>;

    fn health_check(&self) -> bool {
        true
    }

    fn validate_config(&self) -> Result<(), EvalError> {
        Ok(())
    }
}

/// Registry map keyed by evaluator name.
#[derive(Default)]
pub struct EvaluatorRegistry {
    evaluators: HashMap<String, Arc<dyn Evaluator>>,
}

impl EvaluatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, evaluator: Arc<dyn Evaluator>) {
        self.evaluators.insert(evaluator.name().to_string(), evaluator);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Evaluator>> {
        self.evaluators.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.evaluators.keys().cloned().collect()
    }
}

/// Runtime-configured aggregation: per-evaluator weights plus the grade
/// thresholds. No canonical set is assumed.
#[derive(Debug, Clone)]
pub struct EvaluationPolicy {
    /// Evaluator name → weight. Normalized at aggregation time.
    pub weights: HashMap<String, f64>,
    /// Weighted totals at or above these bounds map to
    /// excellent/good/acceptable; below the last is poor.
    pub excellent_at: f64,
    pub good_at: f64,
    pub acceptable_at: f64,
}

impl EvaluationPolicy {
    pub fn grade(&self, weighted_total: f64) -> QualityGrade {
        if weighted_total >= self.excellent_at {
            QualityGrade::Excellent
        } else if weighted_total >= self.good_at {
            QualityGrade::Good
        } else if weighted_total >= self.acceptable_at {
            QualityGrade::Acceptable
        } else {
            QualityGrade::Poor
        }
    }
}

/// Runs the registered evaluators over a completed subtask and records
/// the aggregate.
pub struct QualityGate<C: Clock> {
    registry: EvaluatorRegistry,
    policy: EvaluationPolicy,
    id_gen: Arc<dyn IdGen>,
    clock: C,
}

impl<C: Clock> QualityGate<C> {
    pub fn new(
        registry: EvaluatorRegistry,
        policy: EvaluationPolicy,
        id_gen: Arc<dyn IdGen>,
        clock: C,
    ) -> Self {
        Self { registry, policy, id_gen, clock }
    }

    /// Score a completed subtask. Unhealthy evaluators are skipped;
    /// their weight is excluded from normalization.
    pub async fn evaluate(&self, subtask: &Subtask) -> Evaluation {
        let output = subtask.output.clone().unwrap_or(serde_json::Value::Null);
        let mut scores = HashMap::new();
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;

        for (name, weight) in &self.policy.weights {
            let Some(evaluator) = self.registry.get(name) else {
                tracing::warn!(evaluator = %name, "weighted evaluator not registered");
                continue;
            };
            if !evaluator.health_check() {
                tracing::warn!(evaluator = %name, "evaluator unhealthy; skipped");
                continue;
            }
            match evaluator.evaluate(&output).await {
                Ok(score) => {
                    let clamped = score.clamp(0.0, 1.0);
                    scores.insert(name.clone(), clamped);
                    weighted_sum += clamped * weight;
                    weight_total += weight;
                }
                Err(error) => {
                    tracing::warn!(evaluator = %name, %error, "evaluator failed; skipped");
                }
            }
        }

        let weighted_total =
            if weight_total > 0.0 { weighted_sum / weight_total } else { 0.0 };
        Evaluation {
            id: self.id_gen.id("ev"),
            workflow_id: subtask.workflow_id.clone(),
            subtask_id: subtask.id.clone(),
            scores,
            weighted_total,
            grade: self.policy.grade(weighted_total),
            created_at_ms: self.clock.epoch_ms(),
        }
    }
}

#[cfg(test)]
#[path = "evaluate_tests.rs"]
mod tests;
