//! Load and validate a sync plan document (spec §4.2).
//!
//! Mirrors the two-pass shape of the original `_models.py` loader: parse the
//! YAML into the `Raw*` shapes, resolve every `env_user`/`env_password`
//! reference against the process environment, then run the
//! referential-integrity checks before handing back a [`Configuration`] the
//! rest of the crate can trust.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use itertools::Itertools;
use registry_client::Secret;

use crate::errors::ConfigError;
use crate::model::{
    Configuration, FromEntry, RawConfiguration, RawRegistry, Registry, Stage, ToEntry,
};

/// Read and fully validate a configuration document from `path`.
pub fn load(path: &Path) -> Result<Configuration, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_str(&text, &path.display().to_string())
}

/// Same as [`load`] but from an in-memory string, for tests and for the
/// `--verify-only` CLI path that still wants a real file on disk named in
/// error messages.
pub fn load_str(text: &str, display_path: &str) -> Result<Configuration, ConfigError> {
    let raw: RawConfiguration =
        serde_yaml::from_str(text).map_err(|source| ConfigError::Yaml {
            path: display_path.to_string(),
            source,
        })?;
    resolve(raw)
}

fn resolve_registry(raw: RawRegistry) -> Result<Registry, ConfigError> {
    let user = read_env(&raw.env_user)?;
    let password = read_env(&raw.env_password)?;
    Ok(Registry {
        url: raw.url,
        user: Secret::new(user),
        password: Secret::new(password),
        skip_tls_verify: raw.skip_tls_verify,
    })
}

fn read_env(var: &str) -> Result<String, ConfigError> {
    std::env::var(var).map_err(|_| ConfigError::EnvVarMissing {
        var: var.to_string(),
    })
}

fn resolve(raw: RawConfiguration) -> Result<Configuration, ConfigError> {
    let mut registries = HashMap::with_capacity(raw.registries.len());
    for (key, registry) in raw.registries {
        registries.insert(key, resolve_registry(registry)?);
    }

    let stages: Vec<Stage> = raw
        .stages
        .into_iter()
        .map(|s| Stage {
            id: s.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            from: FromEntry {
                source: s.from.source,
                repository: s.from.repository,
            },
            to: s
                .to
                .into_iter()
                .map(|t| ToEntry {
                    destination: t.destination,
                    repository: t.repository,
                    tags: t.tags,
                })
                .collect(),
            depends_on: s.depends_on,
        })
        .collect();

    validate(&registries, &stages)?;

    Ok(Configuration { registries, stages })
}

/// The referential-integrity passes, in the order spec §4.2's testable
/// scenarios name them: duplicate ids, then unknown `depends_on`, then
/// self-dependency, then unknown destinations, then unknown sources.
fn validate(registries: &HashMap<String, Registry>, stages: &[Stage]) -> Result<(), ConfigError> {
    let mut duplicates: Vec<String> = stages.iter().map(|s| s.id.clone()).duplicates().collect();
    if !duplicates.is_empty() {
        duplicates.sort();
        return Err(ConfigError::DuplicateStageId { ids: duplicates });
    }

    let stage_ids: HashSet<&str> = stages.iter().map(|s| s.id.as_str()).collect();
    for stage in stages {
        for target in &stage.depends_on {
            if !stage_ids.contains(target.as_str()) {
                return Err(ConfigError::UnknownDependsOn {
                    stage_id: stage.id.clone(),
                    target: target.clone(),
                });
            }
        }
    }

    // Not caught by the existence check above, since a stage's own id is
    // trivially a member of stage_ids: an explicit pass is needed to reject
    // a stage listing itself in depends_on.
    for stage in stages {
        if stage.depends_on.iter().any(|target| target == &stage.id) {
            return Err(ConfigError::SelfDependency {
                stage_id: stage.id.clone(),
            });
        }
    }

    for stage in stages {
        if !registries.contains_key(&stage.from.source) {
            return Err(ConfigError::UnknownSource {
                stage_id: stage.id.clone(),
                source: stage.from.source.clone(),
            });
        }
        for to in &stage.to {
            if !registries.contains_key(&to.destination) {
                return Err(ConfigError::UnknownDestination {
                    stage_id: stage.id.clone(),
                    destination: to.destination.clone(),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn yaml_with(stages: &str) -> String {
        format!(
            r#"
registries:
  src:
    url: registry.example.com/src
    env_user: SRC_USER
    env_password: SRC_PASSWORD
  dst:
    url: registry.example.com/dst
    env_user: DST_USER
    env_password: DST_PASSWORD
stages:
{}
"#,
            stages
        )
    }

    // `std::env::set_var`/`remove_var` mutate process-wide state, and the
    // default test harness runs this module's tests on multiple threads in
    // the same process — serialize them on one lock so one test's env
    // mutation can't race another's.
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_env<F: FnOnce() -> R, R>(f: F) -> R {
        let _guard = lock_env();
        std::env::set_var("SRC_USER", "src-user");
        std::env::set_var("SRC_PASSWORD", "src-pass");
        std::env::set_var("DST_USER", "dst-user");
        std::env::set_var("DST_PASSWORD", "dst-pass");
        f()
    }

    #[test]
    fn generates_a_stage_id_when_absent() {
        with_env(|| {
            let doc = yaml_with(
                r#"
  - from: { source: src, repository: app }
    to:
      - { destination: dst, repository: app, tags: ["v1"] }
"#,
            );
            let config = load_str(&doc, "test.yaml").unwrap();
            assert_eq!(config.stages.len(), 1);
            assert!(!config.stages[0].id.is_empty());
        });
    }

    #[test]
    fn rejects_duplicate_stage_ids() {
        with_env(|| {
            let doc = yaml_with(
                r#"
  - id: a
    from: { source: src, repository: app }
    to:
      - { destination: dst, repository: app, tags: ["v1"] }
  - id: a
    from: { source: src, repository: app2 }
    to:
      - { destination: dst, repository: app2, tags: ["v1"] }
"#,
            );
            let err = load_str(&doc, "test.yaml").unwrap_err();
            assert_eq!(err.kind(), "duplicate-stage-id");
            assert!(err.to_string().contains("stages[#].id must be unique"));
        });
    }

    #[test]
    fn rejects_unknown_depends_on() {
        with_env(|| {
            let doc = yaml_with(
                r#"
  - id: a
    from: { source: src, repository: app }
    to:
      - { destination: dst, repository: app, tags: ["v1"] }
    depends_on: ["missing"]
"#,
            );
            let err = load_str(&doc, "test.yaml").unwrap_err();
            assert_eq!(err.kind(), "unknown-depends-on");
        });
    }

    #[test]
    fn rejects_self_dependency() {
        with_env(|| {
            let doc = yaml_with(
                r#"
  - id: a
    from: { source: src, repository: app }
    to:
      - { destination: dst, repository: app, tags: ["v1"] }
    depends_on: ["a"]
"#,
            );
            let err = load_str(&doc, "test.yaml").unwrap_err();
            assert_eq!(err.kind(), "self-dependency");
        });
    }

    #[test]
    fn rejects_unknown_registry_keys() {
        with_env(|| {
            let doc = yaml_with(
                r#"
  - id: a
    from: { source: nope, repository: app }
    to:
      - { destination: dst, repository: app, tags: ["v1"] }
"#,
            );
            let err = load_str(&doc, "test.yaml").unwrap_err();
            assert_eq!(err.kind(), "unknown-source");
        });
    }

    #[test]
    fn missing_env_var_is_reported_by_name() {
        let _guard = lock_env();
        std::env::set_var("SRC_PASSWORD", "src-pass");
        std::env::set_var("DST_USER", "dst-user");
        std::env::set_var("DST_PASSWORD", "dst-pass");
        std::env::remove_var("SRC_USER");
        let doc = yaml_with(
            r#"
  - id: a
    from: { source: src, repository: app }
    to:
      - { destination: dst, repository: app, tags: ["v1"] }
"#,
        );
        let err = load_str(&doc, "test.yaml").unwrap_err();
        assert_eq!(err.kind(), "env-var-missing");
        assert!(err.to_string().contains("SRC_USER"));
        std::env::set_var("SRC_USER", "src-user");
    }
}
