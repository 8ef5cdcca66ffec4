// pea: executor contract and host (C3, §4.3, §6)

// ACCEPTABLE: dispatch/save run only between `load`/`from_executor` and
// `close`; the `Option` is `None` only after close, which is a caller bug.
#![allow(clippy::expect_used)]

use std::marker::PhantomData;

use async_trait::async_trait;

use crate::error::{PeaError, PeaResult};
use crate::message::Envelope;

/// The domain-specific processor a Pea hosts. Out of scope per §1 ("a
/// black-box callable identified by a configuration source"); this trait is
/// the interface the embedding domain implements. Generic over the request
/// body type `R` so `call` can mutate it directly rather than only the
/// envelope wrapped around it.
#[async_trait]
pub trait Executor<R>: Send {
    /// Load from a config source. A distinguished `ConfigSourceBad` is the
    /// only retriable failure (§6, §9).
    fn load_config(source: &str, separated_workspace: bool, pea_id: usize, read_only: bool) -> PeaResult<Self>
    where
        Self: Sized;

    /// Sets the backreference to the owning Pea (§6: "attach(pea) sets the
    /// backreference"). Called once by `ExecutorHost::load`, right after
    /// `load_config` succeeds; `pea_identity` is a borrowed handle rather
    /// than a shared owner, per §9.
    fn attach(&mut self, pea_identity: &str);

    /// Dispatch on `request_type`, mutating the in-flight envelope and
    /// request in place. `partial_requests` carries the full set of sibling
    /// parts collected for this request id — empty for a single-part
    /// message, and populated only on the arrival that completes a
    /// multi-part one (§4.2, §4.4) — so a fan-in executor can fold sibling
    /// payloads into `request` before it is forwarded.
    async fn call(
        &mut self,
        request_type: &str,
        envelope: &mut Envelope,
        request: &mut R,
        partial_requests: &[R],
    ) -> PeaResult<()>;

    /// Persist state. Must be idempotent (§4.3, §8).
    async fn save(&mut self) -> PeaResult<()>;

    /// Release any resources held by the executor. Idempotent.
    async fn close(&mut self) -> PeaResult<()>;

    /// Identity used in error/log attribution.
    fn name(&self) -> &str;
}

/// Owns the Executor's lifecycle: load-with-fallback, dispatch, opportunistic
/// save, close. Mirrors the reference crate's pattern of wrapping a typed
/// client and reusing it across calls (`client.rs`/`circuit_breaker.rs`).
pub struct ExecutorHost<E, R> {
    executor: Option<E>,
    _request: PhantomData<R>,
}

impl<R, E: Executor<R>> ExecutorHost<E, R> {
    /// §4.3: load from `uses`; on `ConfigSourceBad` retry once from
    /// `uses_internal`; any other failure is fatal (`ExecutorLoadFailed`).
    /// Attaches `pea_identity` to whichever source succeeds (§6).
    pub fn load(
        uses: &str,
        uses_internal: &str,
        separated_workspace: bool,
        pea_id: usize,
        read_only: bool,
        pea_identity: &str,
    ) -> PeaResult<Self> {
        let mut executor = match E::load_config(uses, separated_workspace, pea_id, read_only) {
            Ok(e) => e,
            Err(err) if err.is_config_source_bad() => {
                E::load_config(uses_internal, separated_workspace, pea_id, read_only)
                    .map_err(|e| PeaError::ExecutorLoadFailed(e.to_string()))?
            }
            Err(err) => return Err(PeaError::ExecutorLoadFailed(err.to_string())),
        };
        executor.attach(pea_identity);
        Ok(Self {
            executor: Some(executor),
            _request: PhantomData,
        })
    }

    pub async fn dispatch(
        &mut self,
        request_type: &str,
        envelope: &mut Envelope,
        request: &mut R,
        partial_requests: &[R],
    ) -> PeaResult<()> {
        let executor = self.executor.as_mut().expect("executor host used after close");
        executor.call(request_type, envelope, request, partial_requests).await
    }

    pub async fn save(&mut self) -> PeaResult<()> {
        let executor = self.executor.as_mut().expect("executor host used after close");
        executor.save().await
    }

    pub fn executor_name(&self) -> &str {
        self.executor.as_ref().map(|e| e.name()).unwrap_or("<closed>")
    }

    /// Read-only access to the hosted executor, for callers that need to
    /// inspect state the trait doesn't otherwise expose (e.g. tests).
    pub fn executor(&self) -> Option<&E> {
        self.executor.as_ref()
    }

    /// Idempotent: calling close twice is a no-op the second time (§4.7, §8).
    pub async fn close(&mut self) -> PeaResult<()> {
        if let Some(mut executor) = self.executor.take() {
            executor.close().await?;
        }
        Ok(())
    }

    /// Wrap an already-constructed executor, bypassing `load` (and the
    /// `attach` call that goes with it). Used by tests that need to script
    /// failures `load_config` can't express.
    pub fn from_executor(executor: E) -> Self {
        Self {
            executor: Some(executor),
            _request: PhantomData,
        }
    }
}

/// The executor a Pea gets when `uses` is the default `_pass` source: does
/// nothing to the envelope or request and never fails. Lets a Pea be wired
/// up and run end to end (e.g. from `main.rs`) before a real domain
/// executor exists.
pub struct PassExecutor {
    name: String,
    attached_identity: Option<String>,
}

#[async_trait]
impl<R: Send> Executor<R> for PassExecutor {
    fn load_config(source: &str, _separated_workspace: bool, _pea_id: usize, _read_only: bool) -> PeaResult<Self> {
        Ok(Self {
            name: source.to_string(),
            attached_identity: None,
        })
    }

    fn attach(&mut self, pea_identity: &str) {
        self.attached_identity = Some(pea_identity.to_string());
    }

    async fn call(
        &mut self,
        _request_type: &str,
        _envelope: &mut Envelope,
        _request: &mut R,
        _partial_requests: &[R],
    ) -> PeaResult<()> {
        Ok(())
    }

    async fn save(&mut self) -> PeaResult<()> {
        Ok(())
    }

    async fn close(&mut self) -> PeaResult<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

pub mod test_support {
    //! A scriptable executor for exercising the hook pipeline and error
    //! policy without a real domain processor. Not a production
    //! implementation — kept alongside [`super::PassExecutor`] the same way
    //! `transport::mock` sits alongside the `Transport` trait, so both unit
    //! tests in this crate and integration tests under `tests/` can drive
    //! the pipeline's error paths without a real domain executor.
    use super::*;

    pub struct FakeExecutor<R> {
        pub name: String,
        pub call_count: usize,
        pub save_count: usize,
        pub close_count: usize,
        pub attached_identity: Option<String>,
        pub on_call: Box<dyn Fn(&str, &mut Envelope, &mut R, &[R]) -> PeaResult<()> + Send>,
    }

    impl<R> FakeExecutor<R> {
        pub fn ok(name: &str) -> Self {
            Self {
                name: name.to_string(),
                call_count: 0,
                save_count: 0,
                close_count: 0,
                attached_identity: None,
                on_call: Box::new(|_, _, _, _| Ok(())),
            }
        }

        pub fn failing(name: &str, err: impl Fn() -> PeaError + Send + 'static) -> Self {
            Self {
                name: name.to_string(),
                call_count: 0,
                save_count: 0,
                close_count: 0,
                attached_identity: None,
                on_call: Box::new(move |_, _, _, _| Err(err())),
            }
        }
    }

    #[async_trait]
    impl<R: Send + Sync> Executor<R> for FakeExecutor<R> {
        fn load_config(source: &str, _sep: bool, _pea_id: usize, _ro: bool) -> PeaResult<Self> {
            if source == "bad" {
                return Err(PeaError::ConfigSourceBad(source.to_string()));
            }
            if source == "fatal" {
                return Err(PeaError::ExecutorLoadFailed(source.to_string()));
            }
            Ok(FakeExecutor::ok(source))
        }

        fn attach(&mut self, pea_identity: &str) {
            self.attached_identity = Some(pea_identity.to_string());
        }

        async fn call(
            &mut self,
            request_type: &str,
            envelope: &mut Envelope,
            request: &mut R,
            partial_requests: &[R],
        ) -> PeaResult<()> {
            self.call_count += 1;
            (self.on_call)(request_type, envelope, request, partial_requests)
        }

        async fn save(&mut self) -> PeaResult<()> {
            self.save_count += 1;
            Ok(())
        }

        async fn close(&mut self) -> PeaResult<()> {
            self.close_count += 1;
            Ok(())
        }

        fn name(&self) -> &str {
            &self.name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::FakeExecutor;
    use super::*;

    #[test]
    #[allow(clippy::unwrap_used)] // Test code - unwrap is acceptable
    fn load_succeeds_from_primary_source() {
        let host = ExecutorHost::<FakeExecutor<u32>, u32>::load("good", "fallback", false, 0, false, "pea-0");
        assert!(host.is_ok());
        assert_eq!(host.unwrap().executor_name(), "good");
    }

    #[test]
    #[allow(clippy::unwrap_used)] // Test code - unwrap is acceptable
    fn config_source_bad_retries_fallback_exactly_once() {
        let host = ExecutorHost::<FakeExecutor<u32>, u32>::load("bad", "fallback", false, 0, false, "pea-0");
        assert!(host.is_ok());
        assert_eq!(host.unwrap().executor_name(), "fallback");
    }

    #[test]
    fn fallback_failure_is_fatal() {
        let host = ExecutorHost::<FakeExecutor<u32>, u32>::load("bad", "bad", false, 0, false, "pea-0");
        assert!(matches!(host, Err(PeaError::ExecutorLoadFailed(_))));
    }

    #[test]
    fn non_config_failure_never_retries_fallback() {
        let host = ExecutorHost::<FakeExecutor<u32>, u32>::load("fatal", "good", false, 0, false, "pea-0");
        assert!(matches!(host, Err(PeaError::ExecutorLoadFailed(_))));
    }

    #[test]
    #[allow(clippy::unwrap_used)] // Test code - unwrap is acceptable
    fn load_attaches_the_owning_pea_identity() {
        let host =
            ExecutorHost::<FakeExecutor<u32>, u32>::load("good", "fallback", false, 0, false, "pea-7").unwrap();
        assert_eq!(host.executor().unwrap().attached_identity.as_deref(), Some("pea-7"));
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)] // Test code - unwrap is acceptable
    async fn close_is_idempotent() {
        let mut host =
            ExecutorHost::<FakeExecutor<u32>, u32>::load("good", "fallback", false, 0, false, "pea-0").unwrap();
        host.close().await.unwrap();
        host.close().await.unwrap();
    }
}
