//! Adapter over the external `crane` registry CLI (spec §4.1, §6.4).
//!
//! Every operation is a subprocess invocation, following the same
//! `tokio::process::Command` + `.output()` shape the original
//! `_crane.py::_execute_command` uses for `asyncio.create_subprocess_exec`.
//! `get_digest` and `get_image_tags` are memoized per [`Cache`]; `copy` never
//! is (spec §4.1).

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::cache::Cache;
use crate::error::RegistryError;
use crate::secret::Secret;

const DIGEST_TIMEOUT: Duration = Duration::from_secs(30);
const TAGS_TIMEOUT: Duration = Duration::from_secs(60);

const NOT_FOUND_MARKER: &str = "unexpected status code 404";

/// The four operations the scheduler drives a registry through.
#[async_trait]
pub trait RegistryOps: Send + Sync {
    async fn login(
        &self,
        registry_url: &str,
        user: &Secret,
        password: &Secret,
    ) -> Result<(), RegistryError>;

    async fn get_digest(
        &self,
        image_ref: &str,
        skip_tls_verify: bool,
    ) -> Result<Option<String>, RegistryError>;

    async fn get_image_tags(&self, image_ref: &str) -> Result<Vec<String>, RegistryError>;

    async fn copy(
        &self,
        src_ref: &str,
        dst_ref: &str,
        src_skip_tls_verify: bool,
        dst_skip_tls_verify: bool,
    ) -> Result<(), RegistryError>;

    /// Empty all memoized `get_digest`/`get_image_tags` results (spec §4.5,
    /// between-batch cache reset).
    async fn clear_cache(&self);
}

#[derive(Clone, Eq, PartialEq, Hash)]
struct DigestKey {
    image_ref: String,
    skip_tls_verify: bool,
}

/// `crane`-backed implementation of [`RegistryOps`].
pub struct CraneRegistryClient {
    binary: String,
    digest_cache: Cache<DigestKey, Option<String>>,
    tags_cache: Cache<String, Vec<String>>,
}

impl CraneRegistryClient {
    /// Build a client invoking `crane` on `$PATH`.
    pub fn new() -> Self {
        Self::with_binary("crane".to_string())
    }

    /// Build a client invoking a specific binary, e.g. for tests that stub
    /// out the external tool.
    pub fn with_binary(binary: String) -> Self {
        CraneRegistryClient {
            binary,
            digest_cache: Cache::new(),
            tags_cache: Cache::new(),
        }
    }

    /// Run `self.binary` with `args`; `display_args` is what ends up in logs
    /// and in [`RegistryError::Command`] — for everything but `login` the two
    /// are identical, but `login` passes a `--password ***` stand-in here so
    /// the secret never reaches a log line or error message (spec §4.1, §7,
    /// §9 "Secrets").
    async fn execute(
        &self,
        args: Vec<String>,
        display_args: &[String],
    ) -> Result<String, RegistryError> {
        let redacted = self.command_line(display_args);
        log::debug!("running: {}", redacted);

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(RegistryError::Command {
                command: redacted,
                output: combined,
            });
        }

        log::debug!("'{}' finished with:\n{}", redacted, combined);
        Ok(combined)
    }

    fn command_line(&self, args: &[String]) -> String {
        let mut parts = vec![self.binary.clone()];
        parts.extend(args.iter().cloned());
        parts.join(" ")
    }

    /// Run a subprocess whose `args` contain no secret material.
    async fn execute_plain(&self, args: Vec<String>) -> Result<String, RegistryError> {
        let display = args.clone();
        self.execute(args, &display).await
    }
}

impl Default for CraneRegistryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistryOps for CraneRegistryClient {
    async fn login(
        &self,
        registry_url: &str,
        user: &Secret,
        password: &Secret,
    ) -> Result<(), RegistryError> {
        let args = vec![
            "auth".to_string(),
            "login".to_string(),
            registry_url.to_string(),
            "--username".to_string(),
            user.expose().to_string(),
            "--password".to_string(),
            password.expose().to_string(),
        ];
        let display_args = vec![
            "auth".to_string(),
            "login".to_string(),
            registry_url.to_string(),
            "--username".to_string(),
            "***".to_string(),
            "--password".to_string(),
            "***".to_string(),
        ];
        self.execute(args, &display_args).await?;
        Ok(())
    }

    async fn get_digest(
        &self,
        image_ref: &str,
        skip_tls_verify: bool,
    ) -> Result<Option<String>, RegistryError> {
        let key = DigestKey {
            image_ref: image_ref.to_string(),
            skip_tls_verify,
        };

        self.digest_cache
            .get_or_try_insert_with(key, || async {
                let mut args = vec!["digest".to_string(), image_ref.to_string()];
                if skip_tls_verify {
                    args.push("--insecure".to_string());
                }

                match timeout(DIGEST_TIMEOUT, self.execute_plain(args)).await {
                    Ok(Ok(digest)) => Ok(Some(digest.trim().to_string())),
                    Ok(Err(RegistryError::Command { output, .. }))
                        if output.contains(NOT_FOUND_MARKER) =>
                    {
                        Ok(None)
                    }
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(RegistryError::Timeout {
                        operation: format!("get_digest({})", image_ref),
                        seconds: DIGEST_TIMEOUT.as_secs(),
                    }),
                }
            })
            .await
    }

    async fn get_image_tags(&self, image_ref: &str) -> Result<Vec<String>, RegistryError> {
        self.tags_cache
            .get_or_try_insert_with(image_ref.to_string(), || async {
                let args = vec![
                    "ls".to_string(),
                    image_ref.to_string(),
                    "--omit-digest-tags".to_string(),
                ];

                match timeout(TAGS_TIMEOUT, self.execute_plain(args)).await {
                    Ok(Ok(output)) => Ok(output
                        .lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty())
                        .map(str::to_string)
                        .collect()),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(RegistryError::Timeout {
                        operation: format!("get_image_tags({})", image_ref),
                        seconds: TAGS_TIMEOUT.as_secs(),
                    }),
                }
            })
            .await
    }

    async fn copy(
        &self,
        src_ref: &str,
        dst_ref: &str,
        src_skip_tls_verify: bool,
        dst_skip_tls_verify: bool,
    ) -> Result<(), RegistryError> {
        let mut args = vec!["copy".to_string(), src_ref.to_string(), dst_ref.to_string()];
        if src_skip_tls_verify || dst_skip_tls_verify {
            args.push("--insecure".to_string());
        }
        self.execute_plain(args).await?;
        Ok(())
    }

    async fn clear_cache(&self) {
        self.digest_cache.clear().await;
        self.tags_cache.clear().await;
    }
}
