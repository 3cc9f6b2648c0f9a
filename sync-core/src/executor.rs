//! Run an [`ExecutionPlan`] to completion (spec §4.5).
//!
//! Batches are derived as a topological layering — layer *k* holds every
//! task whose predecessors are all in layers `< k` — which the spec calls
//! out as the preferred, obviously-correct equivalent of its literal
//! predecessors-then-full-set construction. Within a batch, tasks run
//! concurrently bounded by `parallel_sync_tasks`, mirroring the teacher's
//! `try_for_each_concurrent(fetch_concurrency, ...)` shape over registry
//! lookups.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use futures::stream::{self, StreamExt};
use registry_client::RegistryOps;

use crate::errors::{BatchFailureError, InternalError, SyncError};
use crate::model::{canonical_image_ref, Configuration, SyncTask, TaskId};
use crate::plan::ExecutionPlan;

/// Split the plan's tasks into batches such that every task's predecessors
/// are all in earlier batches (spec §4.5's topological-layering equivalent).
fn derive_batches(plan: &ExecutionPlan) -> Result<Vec<Vec<TaskId>>, InternalError> {
    let mut remaining_preds: HashMap<TaskId, usize> = plan
        .predecessors
        .iter()
        .map(|(id, preds)| (id.clone(), preds.len()))
        .collect();

    let mut successors: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
    for (task_id, preds) in &plan.predecessors {
        for pred in preds {
            successors
                .entry(pred.clone())
                .or_default()
                .push(task_id.clone());
        }
    }

    let mut ready: VecDeque<TaskId> = remaining_preds
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| id.clone())
        .collect();

    let mut batches = Vec::new();
    let mut covered = 0;

    while !ready.is_empty() {
        let batch: Vec<TaskId> = ready.drain(..).collect();
        covered += batch.len();

        let mut next_ready = Vec::new();
        for task_id in &batch {
            if let Some(succs) = successors.get(task_id) {
                for succ in succs {
                    let count = remaining_preds.get_mut(succ).expect("known task");
                    *count -= 1;
                    if *count == 0 {
                        next_ready.push(succ.clone());
                    }
                }
            }
        }
        ready.extend(next_ready);
        batches.push(batch);
    }

    if covered != plan.task_mapping.len() {
        return Err(InternalError::BatchSizeMismatch {
            expected: plan.task_mapping.len(),
            actual: covered,
        });
    }

    Ok(batches)
}

/// Run every batch of `plan` to completion, aborting on the first batch that
/// contains a failed task.
pub async fn execute(
    config: &Configuration,
    plan: &ExecutionPlan,
    registry: &dyn RegistryOps,
    parallel_sync_tasks: usize,
) -> Result<(), SyncError> {
    let batches = derive_batches(plan)?;
    let concurrency = parallel_sync_tasks.max(1);

    for (index, batch) in batches.iter().enumerate() {
        log::debug!(
            "running batch {}/{} ({} tasks)",
            index + 1,
            batches.len(),
            batch.len()
        );

        let results: Vec<(TaskId, Result<(), String>)> = stream::iter(batch.iter().cloned())
            .map(|task_id| async move {
                let task = &plan.task_mapping[&task_id];
                let outcome = copy_task(config, registry, task).await;
                (task_id, outcome.map_err(|e| e.to_string()))
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        if results.iter().any(|(_, r)| r.is_err()) {
            return Err(SyncError::Batch(BatchFailureError { results }));
        }

        registry.clear_cache().await;
    }

    Ok(())
}

/// Resolve `src_ref`/`dst_ref`, skip the copy if both digests already agree,
/// otherwise invoke `copy` (spec §4.5 `copy_task`).
async fn copy_task(
    config: &Configuration,
    registry: &dyn RegistryOps,
    task: &SyncTask,
) -> Result<(), registry_client::RegistryError> {
    let started = Instant::now();

    let source = &config.registries[&task.src_registry_key];
    let destination = &config.registries[&task.dst_registry_key];

    let src_ref = canonical_image_ref(&source.url, &task.src_repository, Some(&task.tag));
    let dst_ref = canonical_image_ref(&destination.url, &task.dst_repository, Some(&task.tag));

    let (src_digest, dst_digest) = tokio::try_join!(
        registry.get_digest(&src_ref, source.skip_tls_verify),
        registry.get_digest(&dst_ref, destination.skip_tls_verify),
    )?;

    match (src_digest, dst_digest) {
        (Some(src), Some(dst)) if src == dst => {
            log::info!(
                "skipping {} (digest {} already present), took {:?}",
                task.task_id,
                src,
                started.elapsed()
            );
            return Ok(());
        }
        _ => {}
    }

    registry
        .copy(
            &src_ref,
            &dst_ref,
            source.skip_tls_verify,
            destination.skip_tls_verify,
        )
        .await?;

    log::info!("synced {}, took {:?}", task.task_id, started.elapsed());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FromEntry, Registry, Stage, ToEntry};
    use crate::plan;
    use registry_client::testing::FakeRegistryClient;
    use registry_client::Secret;

    fn registry(url: &str) -> Registry {
        Registry {
            url: url.to_string(),
            user: Secret::new("u".to_string()),
            password: Secret::new("p".to_string()),
            skip_tls_verify: false,
        }
    }

    fn config() -> Configuration {
        let mut registries = HashMap::new();
        registries.insert("src".to_string(), registry("registry.example.com/src"));
        registries.insert("dst".to_string(), registry("registry.example.com/dst"));
        Configuration {
            registries,
            stages: vec![],
        }
    }

    fn task(id: &str, stage_id: &str) -> SyncTask {
        task_for_repo(id, stage_id, "app")
    }

    fn task_for_repo(id: &str, stage_id: &str, repository: &str) -> SyncTask {
        SyncTask {
            task_id: id.to_string(),
            stage_id: stage_id.to_string(),
            src_registry_key: "src".to_string(),
            dst_registry_key: "dst".to_string(),
            src_repository: repository.to_string(),
            dst_repository: repository.to_string(),
            tag: "1.0".to_string(),
        }
    }

    fn stage(id: &str, depends_on: &[&str]) -> Stage {
        Stage {
            id: id.to_string(),
            from: FromEntry {
                source: "src".to_string(),
                repository: "app".to_string(),
            },
            to: vec![ToEntry {
                destination: "dst".to_string(),
                repository: "app".to_string(),
                tags: vec!["1.0".to_string()],
            }],
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn single_batch_when_there_are_no_dependencies() {
        let t1 = task("a", "A");
        let t2 = task("b", "B");
        let plan = plan::build(vec![t1, t2], &[stage("A", &[]), stage("B", &[])]).unwrap();
        let batches = derive_batches(&plan).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
    }

    #[test]
    fn two_layers_when_one_stage_depends_on_another() {
        let t1 = task("a", "A");
        let t2 = task("b", "B");
        let plan = plan::build(vec![t1, t2], &[stage("A", &[]), stage("B", &["A"])]).unwrap();
        let batches = derive_batches(&plan).unwrap();
        assert_eq!(batches, vec![vec!["a".to_string()], vec!["b".to_string()]]);
    }

    #[tokio::test]
    async fn a_matching_digest_pair_skips_the_copy() {
        let cfg = config();
        let t1 = task("a", "A");
        let plan = plan::build(vec![t1], &[stage("A", &[])]).unwrap();
        let fake = FakeRegistryClient::new();
        fake.set_digest("registry.example.com/src/app:1.0", "sha256:same");
        fake.set_digest("registry.example.com/dst/app:1.0", "sha256:same");

        execute(&cfg, &plan, &fake, 4).await.unwrap();

        assert!(fake.copy_calls().is_empty());
    }

    #[tokio::test]
    async fn a_digest_mismatch_triggers_a_copy() {
        let cfg = config();
        let t1 = task("a", "A");
        let plan = plan::build(vec![t1], &[stage("A", &[])]).unwrap();
        let fake = FakeRegistryClient::new();
        fake.set_digest("registry.example.com/src/app:1.0", "sha256:new");

        execute(&cfg, &plan, &fake, 4).await.unwrap();

        let calls = fake.copy_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].dst_ref, "registry.example.com/dst/app:1.0");
    }

    #[tokio::test]
    async fn a_predecessor_copy_finishes_before_its_successor_starts() {
        let cfg = config();
        let t1 = task_for_repo("a", "A", "repo-a");
        let t2 = task_for_repo("b", "B", "repo-b");
        let plan = plan::build(vec![t1, t2], &[stage("A", &[]), stage("B", &["A"])]).unwrap();
        let fake = FakeRegistryClient::new();

        execute(&cfg, &plan, &fake, 4).await.unwrap();

        let calls = fake.copy_calls();
        assert_eq!(calls.len(), 2);
        let a_call = calls.iter().find(|c| c.dst_ref.contains("repo-a")).unwrap();
        let b_call = calls.iter().find(|c| c.dst_ref.contains("repo-b")).unwrap();
        assert!(b_call.started_at >= a_call.finished_at);
    }
}
