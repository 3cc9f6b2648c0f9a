//! Build the task-level dependency DAG from stage-level `depends_on` (spec
//! §4.4).
//!
//! Every stage dependency fans out: if stage `S` depends on stage `D`, every
//! task produced by `D` becomes a predecessor of every task produced by `S`.
//! Acyclicity is checked with [`daggy`], the same crate the teacher's
//! release graph is built on — a cycle surfaces as [`daggy::WouldCycle`],
//! which we translate into the full `predecessors` map [`CyclicDependencyError`]
//! carries (spec §8 scenario 5).

use std::collections::HashMap;

use daggy::Dag;

use crate::errors::CyclicDependencyError;
use crate::model::{Stage, SyncTask, TaskId};

/// `task_mapping` and `predecessors`, with matching key sets and an acyclic
/// induced graph (spec §3).
#[derive(Debug)]
pub struct ExecutionPlan {
    pub task_mapping: HashMap<TaskId, SyncTask>,
    pub predecessors: HashMap<TaskId, Vec<TaskId>>,
}

/// Build a plan from the tasks the expander produced and the stages they
/// were expanded from.
pub fn build(tasks: Vec<SyncTask>, stages: &[Stage]) -> Result<ExecutionPlan, CyclicDependencyError> {
    let mut stage_tasks: HashMap<&str, Vec<TaskId>> = HashMap::new();
    for task in &tasks {
        stage_tasks
            .entry(task.stage_id.as_str())
            .or_default()
            .push(task.task_id.clone());
    }

    let mut predecessors: HashMap<TaskId, Vec<TaskId>> = tasks
        .iter()
        .map(|t| (t.task_id.clone(), Vec::new()))
        .collect();

    for stage in stages {
        let Some(successors) = stage_tasks.get(stage.id.as_str()) else {
            continue;
        };
        for dep_stage_id in &stage.depends_on {
            let Some(dep_tasks) = stage_tasks.get(dep_stage_id.as_str()) else {
                continue;
            };
            for successor in successors {
                for predecessor in dep_tasks {
                    predecessors
                        .get_mut(successor)
                        .expect("successor is a known task")
                        .push(predecessor.clone());
                }
            }
        }
    }

    // Verify the induced graph is acyclic by actually constructing it:
    // daggy rejects any add_edge that would close a cycle.
    let mut dag: Dag<(), ()> = Dag::new();
    let mut nodes: HashMap<&TaskId, daggy::NodeIndex> = HashMap::new();
    for task_id in predecessors.keys() {
        nodes.insert(task_id, dag.add_node(()));
    }
    for (successor, preds) in &predecessors {
        let successor_node = nodes[successor];
        for predecessor in preds {
            let predecessor_node = nodes[predecessor];
            if dag.add_edge(predecessor_node, successor_node, ()).is_err() {
                return Err(CyclicDependencyError { predecessors });
            }
        }
    }

    let task_mapping = tasks.into_iter().map(|t| (t.task_id.clone(), t)).collect();

    Ok(ExecutionPlan {
        task_mapping,
        predecessors,
    })
}
