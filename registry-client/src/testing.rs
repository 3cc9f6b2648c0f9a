//! A deterministic, in-memory [`RegistryOps`] double for tests — the
//! "fake Registry Client" referenced throughout spec §8.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::client::RegistryOps;
use crate::error::RegistryError;
use crate::secret::Secret;

/// One recorded `copy` invocation, with its wall-clock start time so ordering
/// tests can assert "predecessor finished before successor started".
#[derive(Debug, Clone)]
pub struct CopyCall {
    pub src_ref: String,
    pub dst_ref: String,
    pub started_at: Instant,
    pub finished_at: Instant,
}

#[derive(Default)]
struct State {
    digests: HashMap<String, String>,
    tags: HashMap<String, Vec<String>>,
    digest_calls: u32,
    copy_calls: Vec<CopyCall>,
    logins: Vec<String>,
}

/// Fake registry backing a set of `(image_ref -> digest)` and
/// `(image_ref -> tags)` facts, with no subprocess involved.
pub struct FakeRegistryClient {
    state: Mutex<State>,
}

impl FakeRegistryClient {
    pub fn new() -> Self {
        FakeRegistryClient {
            state: Mutex::new(State::default()),
        }
    }

    pub fn set_digest(&self, image_ref: &str, digest: &str) {
        self.state
            .lock()
            .expect("lock")
            .digests
            .insert(image_ref.to_string(), digest.to_string());
    }

    pub fn set_tags(&self, image_ref: &str, tags: Vec<String>) {
        self.state
            .lock()
            .expect("lock")
            .tags
            .insert(image_ref.to_string(), tags);
    }

    pub fn digest_lookup_count(&self) -> u32 {
        self.state.lock().expect("lock").digest_calls
    }

    pub fn copy_calls(&self) -> Vec<CopyCall> {
        self.state.lock().expect("lock").copy_calls.clone()
    }

    pub fn logins(&self) -> Vec<String> {
        self.state.lock().expect("lock").logins.clone()
    }
}

impl Default for FakeRegistryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistryOps for FakeRegistryClient {
    async fn login(
        &self,
        registry_url: &str,
        _user: &Secret,
        _password: &Secret,
    ) -> Result<(), RegistryError> {
        self.state
            .lock()
            .expect("lock")
            .logins
            .push(registry_url.to_string());
        Ok(())
    }

    async fn get_digest(
        &self,
        image_ref: &str,
        _skip_tls_verify: bool,
    ) -> Result<Option<String>, RegistryError> {
        // A small real delay so ordering tests can observe non-zero
        // durations between predecessor completion and successor start.
        tokio::time::sleep(Duration::from_millis(1)).await;
        let mut state = self.state.lock().expect("lock");
        state.digest_calls += 1;
        Ok(state.digests.get(image_ref).cloned())
    }

    async fn get_image_tags(&self, image_ref: &str) -> Result<Vec<String>, RegistryError> {
        Ok(self
            .state
            .lock()
            .expect("lock")
            .tags
            .get(image_ref)
            .cloned()
            .unwrap_or_default())
    }

    async fn copy(
        &self,
        src_ref: &str,
        dst_ref: &str,
        _src_skip_tls_verify: bool,
        _dst_skip_tls_verify: bool,
    ) -> Result<(), RegistryError> {
        let started_at = Instant::now();
        tokio::time::sleep(Duration::from_millis(1)).await;
        let finished_at = Instant::now();

        // A copy also settles the destination digest to the source's, the
        // way a real registry would after the transfer completes.
        let mut state = self.state.lock().expect("lock");
        if let Some(digest) = state.digests.get(src_ref).cloned() {
            state.digests.insert(dst_ref.to_string(), digest);
        }
        state.copy_calls.push(CopyCall {
            src_ref: src_ref.to_string(),
            dst_ref: dst_ref.to_string(),
            started_at,
            finished_at,
        });
        Ok(())
    }

    async fn clear_cache(&self) {
        // Nothing is memoized in the fake beyond the facts set up by the
        // test; nothing to reset.
    }
}
