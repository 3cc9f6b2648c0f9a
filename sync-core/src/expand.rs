//! Expand a validated [`Configuration`] into concrete [`SyncTask`]s (spec §4.3).

use std::collections::HashSet;

use registry_client::RegistryOps;

use crate::errors::{ExpandError, InternalError};
use crate::model::{canonical_image_ref, Configuration, SyncTask};

/// Expand every stage's `to` entries into tasks.
///
/// `use_explicit_tags` controls what an empty `ToEntry.tags` means (spec
/// §6.1): when `false` (the default), an empty list triggers a single
/// `get_image_tags` call against the fully qualified source image and one
/// task per tag it returns — the only place tag discovery happens. When
/// `true`, an empty list means there is nothing to do for that `ToEntry`.
pub async fn expand(
    config: &Configuration,
    registry: &dyn RegistryOps,
    use_explicit_tags: bool,
) -> Result<Vec<SyncTask>, ExpandError> {
    let mut tasks = Vec::new();

    for stage in &config.stages {
        let source = &config.registries[&stage.from.source];

        for to in &stage.to {
            let tags = if !to.tags.is_empty() {
                to.tags.clone()
            } else if use_explicit_tags {
                Vec::new()
            } else {
                let source_image = canonical_image_ref(&source.url, &stage.from.repository, None);
                registry.get_image_tags(&source_image).await?
            };

            for tag in tags {
                let task_id = SyncTask::make_task_id(
                    &stage.from.source,
                    &stage.from.repository,
                    &to.destination,
                    &to.repository,
                    &tag,
                    &stage.id,
                );

                tasks.push(SyncTask {
                    task_id,
                    stage_id: stage.id.clone(),
                    src_registry_key: stage.from.source.clone(),
                    dst_registry_key: to.destination.clone(),
                    src_repository: stage.from.repository.clone(),
                    dst_repository: to.repository.clone(),
                    tag,
                });
            }
        }
    }

    let unique: HashSet<&str> = tasks.iter().map(|t| t.task_id.as_str()).collect();
    if unique.len() != tasks.len() {
        return Err(ExpandError::Internal(InternalError::TaskIdCollision {
            generated: tasks.len(),
            unique: unique.len(),
        }));
    }

    log::info!("expanded {} sync tasks", tasks.len());
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FromEntry, Registry, Stage, ToEntry};
    use registry_client::{Secret, testing::FakeRegistryClient};
    use std::collections::HashMap;

    fn registry(url: &str) -> Registry {
        Registry {
            url: url.to_string(),
            user: Secret::new("u".to_string()),
            password: Secret::new("p".to_string()),
            skip_tls_verify: false,
        }
    }

    fn config_with_stage(stage: Stage) -> Configuration {
        let mut registries = HashMap::new();
        registries.insert("src".to_string(), registry("registry.example.com/src"));
        registries.insert("dst".to_string(), registry("registry.example.com/dst"));
        Configuration {
            registries,
            stages: vec![stage],
        }
    }

    #[tokio::test]
    async fn explicit_tags_need_no_registry_call() {
        let config = config_with_stage(Stage {
            id: "s1".to_string(),
            from: FromEntry {
                source: "src".to_string(),
                repository: "app".to_string(),
            },
            to: vec![ToEntry {
                destination: "dst".to_string(),
                repository: "app".to_string(),
                tags: vec!["1.0".to_string()],
            }],
            depends_on: vec![],
        });
        let fake = FakeRegistryClient::new();
        let tasks = expand(&config, &fake, false).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].tag, "1.0");
        assert_eq!(fake.digest_lookup_count(), 0);
        assert_eq!(tasks[0].task_id, "src/app:1.0 --> dst/app:1.0 #s1");
    }

    #[tokio::test]
    async fn empty_tags_with_explicit_flag_yields_nothing() {
        let config = config_with_stage(Stage {
            id: "s1".to_string(),
            from: FromEntry {
                source: "src".to_string(),
                repository: "app".to_string(),
            },
            to: vec![ToEntry {
                destination: "dst".to_string(),
                repository: "app".to_string(),
                tags: vec![],
            }],
            depends_on: vec![],
        });
        let fake = FakeRegistryClient::new();
        let tasks = expand(&config, &fake, true).await.unwrap();
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn empty_tags_without_the_flag_discovers_remote_tags_once() {
        let config = config_with_stage(Stage {
            id: "s1".to_string(),
            from: FromEntry {
                source: "src".to_string(),
                repository: "app".to_string(),
            },
            to: vec![ToEntry {
                destination: "dst".to_string(),
                repository: "app".to_string(),
                tags: vec![],
            }],
            depends_on: vec![],
        });
        let fake = FakeRegistryClient::new();
        fake.set_tags(
            "registry.example.com/src/app",
            vec!["1.0".to_string(), "2.0".to_string()],
        );
        let tasks = expand(&config, &fake, false).await.unwrap();
        assert_eq!(tasks.len(), 2);
    }
}
