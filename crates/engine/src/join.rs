// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Merge strategies for PARALLEL-JOIN nodes.

use hive_core::JoinStrategy;
use serde_json::Value;

/// One branch's terminal result, in completion order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BranchResult {
    /// Branch node name (the key in `all` merges).
    pub name: String,
    pub output: Option<Value>,
    pub failed: bool,
    pub error: Option<String>,
}

/// Merge branch results by strategy. `results` must be ordered by
/// branch completion time. Returns `None` when no branch succeeded.
pub(crate) fn merge(strategy: JoinStrategy, results: &[BranchResult]) -> Option<Value> {
    let succeeded: Vec<&BranchResult> = results.iter().filter(|r| !r.failed).collect();
    match strategy {
        JoinStrategy::First => {
            succeeded.first().map(|r| r.output.clone().unwrap_or(Value::Null))
        }
        JoinStrategy::Last => {
            succeeded.last().map(|r| r.output.clone().unwrap_or(Value::Null))
        }
        JoinStrategy::All => {
            if succeeded.is_empty() {
                return None;
            }
            let mut map = serde_json::Map::new();
            for result in results {
                let value = if result.failed {
                    serde_json::json!({
                        "error": result.error.clone().unwrap_or_else(|| "failed".to_string())
                    })
                } else {
                    result.output.clone().unwrap_or(Value::Null)
                };
                map.insert(result.name.clone(), value);
            }
            Some(Value::Object(map))
        }
        JoinStrategy::Vote => {
            if succeeded.is_empty() {
                return None;
            }
            // majority by canonical serialization; ties resolve to the
            // earliest completed among the most common values
            let mut counts: Vec<(String, Value, usize)> = Vec::new();
            for result in &succeeded {
                let value = result.output.clone().unwrap_or(Value::Null);
                let key = value.to_string();
                match counts.iter_mut().find(|(k, _, _)| *k == key) {
                    Some((_, _, n)) => *n += 1,
                    None => counts.push((key, value, 1)),
                }
            }
            let mut best: Option<(Value, usize)> = None;
            for (_, value, n) in counts {
                if best.as_ref().is_none_or(|(_, m)| n > *m) {
                    best = Some((value, n));
                }
            }
            best.map(|(value, _)| value)
        }
    }
}

#[cfg(test)]
#[path = "join_tests.rs"]
mod tests;
