// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Quality evaluations recorded against completed subtasks.

use crate::id::{SubtaskId, WorkflowId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Quality grade derived from the weighted evaluator scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityGrade {
    Excellent,
    Good,
    Acceptable,
    Poor,
}

crate::simple_display! {
    QualityGrade {
        Excellent => "excellent",
        Good => "good",
        Acceptable => "acceptable",
        Poor => "poor",
    }
}

/// Aggregated evaluator output for one subtask result.
///
/// Evaluators are pluggable black boxes; the core stores their scalar
/// scores and the weighted aggregate without interpreting them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: String,
    pub workflow_id: WorkflowId,
    pub subtask_id: SubtaskId,
    /// Evaluator name → score in `0.0..=1.0`.
    pub scores: HashMap<String, f64>,
    pub weighted_total: f64,
    pub grade: QualityGrade,
    pub created_at_ms: u64,
}
