//! Resolved, validated configuration and task types (spec §3, §4.2, §4.3).
//!
//! [`crate::config`] deserializes YAML into the `Raw*` shapes and turns them
//! into these; nothing downstream of [`Configuration`] ever sees an
//! unresolved env var or an un-checked `depends_on`.

use std::collections::HashMap;

use registry_client::Secret;
use serde::Deserialize;

/// A task's identity within an [`crate::plan::ExecutionPlan`] — the
/// `"{src} --> {dst} #{stage_id}"` format spec §4.3 mandates.
pub type TaskId = String;

/// One OCI registry endpoint a stage can read from or write to.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRegistry {
    pub url: String,
    pub env_user: String,
    pub env_password: String,
    #[serde(default, rename = "skip-tls-verify")]
    pub skip_tls_verify: bool,
}

/// Resolved form of [`RawRegistry`]: env vars already read into [`Secret`]s.
#[derive(Debug, Clone)]
pub struct Registry {
    pub url: String,
    pub user: Secret,
    pub password: Secret,
    pub skip_tls_verify: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawFromEntry {
    pub source: String,
    pub repository: String,
}

#[derive(Debug, Clone)]
pub struct FromEntry {
    pub source: String,
    pub repository: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawToEntry {
    pub destination: String,
    pub repository: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ToEntry {
    pub destination: String,
    pub repository: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawStage {
    #[serde(default)]
    pub id: Option<String>,
    pub from: RawFromEntry,
    pub to: Vec<RawToEntry>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// A stage with its id always populated — generated with [`uuid::Uuid::new_v4`]
/// at load time when the document omits one (spec §4.2).
#[derive(Debug, Clone)]
pub struct Stage {
    pub id: String,
    pub from: FromEntry,
    pub to: Vec<ToEntry>,
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfiguration {
    pub registries: HashMap<String, RawRegistry>,
    pub stages: Vec<RawStage>,
}

/// The fully validated sync plan input: every `depends_on`, `source` and
/// `destination` is known to resolve, every stage id is unique and
/// non-self-referential (spec §4.2 invariants).
#[derive(Debug, Clone)]
pub struct Configuration {
    pub registries: HashMap<String, Registry>,
    pub stages: Vec<Stage>,
}

/// A single concrete `source-tag -> destination-tag` copy, expanded from a
/// [`Stage`] (spec §4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTask {
    pub task_id: TaskId,
    pub stage_id: String,
    pub src_registry_key: String,
    pub dst_registry_key: String,
    pub src_repository: String,
    pub dst_repository: String,
    pub tag: String,
}

impl SyncTask {
    /// `"{src_registry_key}/{src_repository}:{tag} --> {dst_registry_key}/{dst_repository}:{tag} #{stage_id}"`,
    /// the task-id format spec §4.3 mandates. Built from the registry *keys*
    /// (e.g. `"src"`), not their canonicalized `url`s — matching
    /// `_get_unique_task_id` in the original implementation, which builds the
    /// id from `from_entry.source`/`to_entry.destination` verbatim.
    pub fn make_task_id(
        src_registry_key: &str,
        src_repository: &str,
        dst_registry_key: &str,
        dst_repository: &str,
        tag: &str,
        stage_id: &str,
    ) -> TaskId {
        format!(
            "{}/{}:{} --> {}/{}:{} #{}",
            src_registry_key, src_repository, tag, dst_registry_key, dst_repository, tag, stage_id
        )
    }
}

/// `{url}/{repository_without_leading_slash}[:{tag}]` (spec §4.2).
pub fn canonical_image_ref(url: &str, repository: &str, tag: Option<&str>) -> String {
    let repository = repository.strip_prefix('/').unwrap_or(repository);
    match tag {
        Some(tag) => format!("{}/{}:{}", url, repository, tag),
        None => format!("{}/{}", url, repository),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_without_a_tag() {
        assert_eq!(
            canonical_image_ref("some_repo", "a/path", None),
            "some_repo/a/path"
        );
    }

    #[test]
    fn canonicalizes_with_a_tag_and_strips_a_leading_slash() {
        assert_eq!(
            canonical_image_ref("some_repo", "/a/path", Some("tag")),
            "some_repo/a/path:tag"
        );
    }

    #[test]
    fn task_id_is_built_from_registry_keys_not_urls() {
        let task_id = SyncTask::make_task_id("src", "library/alpine", "dst", "alpine", "1.0", "s1");
        assert_eq!(
            task_id,
            "src/library/alpine:1.0 --> dst/alpine:1.0 #s1"
        );
    }
}
