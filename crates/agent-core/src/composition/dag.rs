//! Dependency-graph utilities for multi-task composition (§4.9).
//!
//! Two distinct algorithms, per §9's Open Question resolution: 3-color DFS
//! validates a dependency graph before any task runs (matching spec exactly);
//! Kahn-style repeated ready-set extraction schedules the actual batches.

use std::collections::{HashMap, HashSet};

use crate::error::AgentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Validates that every id and every prerequisite id is in `[0, n)` and that
/// the dependency graph is acyclic, via 3-color DFS (§4.9, §8). A gray→gray
/// edge is a cycle.
pub fn validate(n: usize, deps: &HashMap<String, HashSet<String>>) -> Result<(), AgentError> {
    let ids: HashSet<String> = (0..n).map(|i| i.to_string()).collect();
    for (id, prereqs) in deps {
        if !ids.contains(id) {
            return Err(AgentError::InvalidInput(format!(
                "dependency references unknown task id: {id}"
            )));
        }
        for prereq in prereqs {
            if !ids.contains(prereq) {
                return Err(AgentError::InvalidInput(format!(
                    "dependency references unknown prerequisite id: {prereq}"
                )));
            }
        }
    }

    let mut colors: HashMap<String, Color> = ids.iter().map(|id| (id.clone(), Color::White)).collect();
    for id in &ids {
        if colors[id] == Color::White {
            visit(id, deps, &mut colors)?;
        }
    }
    Ok(())
}

fn visit(
    id: &str,
    deps: &HashMap<String, HashSet<String>>,
    colors: &mut HashMap<String, Color>,
) -> Result<(), AgentError> {
    colors.insert(id.to_string(), Color::Gray);
    if let Some(prereqs) = deps.get(id) {
        for prereq in prereqs {
            match colors.get(prereq).copied().unwrap_or(Color::White) {
                Color::Gray => {
                    return Err(AgentError::CyclicDependency(format!(
                        "circular dependency detected involving task {id}"
                    )))
                }
                Color::White => visit(prereq, deps, colors)?,
                Color::Black => {}
            }
        }
    }
    colors.insert(id.to_string(), Color::Black);
    Ok(())
}

/// Returns the ready set: unfinished task ids whose prerequisites are all in
/// `completed` (§4.9). Kahn-style repeated ready-set extraction.
pub fn ready_tasks(
    n: usize,
    deps: &HashMap<String, HashSet<String>>,
    completed: &HashSet<String>,
) -> Vec<String> {
    (0..n)
        .map(|i| i.to_string())
        .filter(|id| !completed.contains(id))
        .filter(|id| {
            deps.get(id)
                .map(|prereqs| prereqs.iter().all(|p| completed.contains(p)))
                .unwrap_or(true)
        })
        .collect()
}
