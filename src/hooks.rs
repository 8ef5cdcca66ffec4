// pea: hook pipeline (C4, §4.4) — pre-hook -> handle -> post-hook

use crate::aggregator::PartialBuffer;
use crate::clock::Clock;
use crate::config::SkipOnErrorType;
use crate::error::{PeaError, PeaResult};
use crate::executor::{Executor, ExecutorHost};
use crate::message::{Envelope, Message, StatusCode};
use crate::metrics::PeaMetrics;
use crate::outcome::Outcome;
use crate::policy::{classify, ErrorAction};

fn now_unix_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

struct PreHookOutput<R> {
    expect_parts: usize,
    complete: bool,
    collected_envelopes: Vec<Envelope>,
    /// Sibling parts' request bodies, in arrival order, populated only on
    /// the arrival that completes a multi-part request (§4.2, SPEC_FULL.md
    /// pre-hook's `partial_requests` exposure).
    collected_requests: Vec<R>,
}

/// §4.4 pre-hook. Pushes into the aggregator when `expect_parts > 1`; the
/// push-and-complete-check is one atomic `collect` call so the key is gone
/// "before the handler observes the merged state" (§3 invariant).
fn pre_hook<R: Clone>(
    pea_name: &str,
    identity: &str,
    num_part: usize,
    aggregator: &mut PartialBuffer<R>,
    envelope: &mut Envelope,
    request: &R,
) -> PreHookOutput<R> {
    envelope.add_route(pea_name, identity, now_unix_ms());

    let expect_parts = if envelope.is_data_request { num_part } else { 1 };

    if expect_parts > 1 {
        let (complete, envs, reqs) = aggregator.collect(expect_parts, envelope.clone(), request.clone());
        tracing::info!(
            request_id = %envelope.request_id,
            request_type = %envelope.request_type,
            parts = envs.len(),
            expect_parts,
            "recv (partial) from {}",
            envelope.colored_route(),
        );
        PreHookOutput {
            expect_parts,
            complete,
            collected_envelopes: envs,
            collected_requests: reqs,
        }
    } else {
        tracing::info!(
            request_id = %envelope.request_id,
            request_type = %envelope.request_type,
            "recv from {}",
            envelope.colored_route(),
        );
        PreHookOutput {
            expect_parts,
            complete: true,
            collected_envelopes: Vec::new(),
            collected_requests: Vec::new(),
        }
    }
}

/// §4.4 handle. Reducer-completeness is checked *before* the error-status
/// check so a reducer still collects every branch even when some carry
/// errors (§4.4 step 1 note).
async fn handle<E: Executor<R>, R>(
    pre: &PreHookOutput<R>,
    skip_on_error: SkipOnErrorType,
    executor_host: &mut ExecutorHost<E, R>,
    envelope: &mut Envelope,
    request: &mut R,
) -> PeaResult<()> {
    if pre.expect_parts > 1 && !pre.complete {
        return Err(PeaError::NoExplicitMessage);
    }

    if envelope.status != StatusCode::Error || skip_on_error < SkipOnErrorType::Handle {
        let request_type = envelope.request_type.clone();
        executor_host
            .dispatch(&request_type, envelope, request, &pre.collected_requests)
            .await
    } else {
        Err(PeaError::ChainedPodException)
    }
}

/// §4.4 post-hook. Returns `Ok(())` on success, or the watermark error if
/// memory is over the high watermark — the caller decides whether to still
/// send based on that.
async fn post_hook<E: Executor<R>, R>(
    clock: &mut Clock,
    executor_host: &mut ExecutorHost<E, R>,
    metrics: &PeaMetrics,
    pre: &PreHookOutput<R>,
    envelope: &mut Envelope,
) -> PeaResult<()> {
    clock.mark_active();

    if clock.should_dump() {
        executor_host.save().await?;
        clock.mark_dumped();
        metrics.record_dump();
    }

    if clock.over_memory_watermark() {
        return Err(PeaError::MemoryOverHighWatermark);
    }

    if pre.expect_parts > 1 {
        envelope.merge_envelope_from(&pre.collected_envelopes);
    }

    envelope.update_timestamp(now_unix_ms());
    Ok(())
}

/// Runs pre -> handle -> post for one inbound message and returns the
/// `Outcome` the request loop should act on (§4.4, §4.5, §9). This is the
/// only place that decides whether post-hook still needs to run on the
/// error path (`post_hook_done`, §4.4 closing note).
pub async fn run_pipeline<E: Executor<R>, R: Clone>(
    pea_name: &str,
    identity: &str,
    num_part: usize,
    skip_on_error: SkipOnErrorType,
    raise_error_early: bool,
    clock: &mut Clock,
    aggregator: &mut PartialBuffer<R>,
    executor_host: &mut ExecutorHost<E, R>,
    metrics: &PeaMetrics,
    msg: Message<R>,
) -> PeaResult<Outcome<R>> {
    metrics.record_received();
    let Message { mut envelope, mut request } = msg;

    let pre = pre_hook(pea_name, identity, num_part, aggregator, &mut envelope, &request);

    let handle_result = handle(&pre, skip_on_error, executor_host, &mut envelope, &mut request).await;

    let mut post_hook_done = false;
    let outcome = match handle_result {
        Ok(()) => {
            match post_hook(clock, executor_host, metrics, &pre, &mut envelope).await {
                Ok(()) => {
                    post_hook_done = true;
                    metrics.record_sent();
                    Ok(Outcome::Forward(envelope.clone(), request.clone()))
                }
                Err(err) => Err(err),
            }
        }
        Err(err) => Err(err),
    };

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            match classify(&err) {
                ErrorAction::Silent => {
                    metrics.record_suppressed();
                    tracing::debug!(request_id = %envelope.request_id, "suppressed: {err}");
                    Outcome::Suppress
                }
                ErrorAction::Backpressure => {
                    metrics.record_backpressure_drop();
                    tracing::error!(request_id = %envelope.request_id, "{err}");
                    Outcome::Suppress
                }
                ErrorAction::ChainedPassthrough => {
                    if !post_hook_done {
                        let _ = post_hook(clock, executor_host, metrics, &pre, &mut envelope).await;
                    }
                    envelope.add_chained_marker();
                    tracing::warn!(request_id = %envelope.request_id, "{err}");
                    metrics.record_sent();
                    Outcome::ForwardWithError(envelope, request)
                }
                ErrorAction::ExecutorFault => {
                    if raise_error_early {
                        return Err(err);
                    }
                    if !post_hook_done {
                        let _ = post_hook(clock, executor_host, metrics, &pre, &mut envelope).await;
                    }
                    let executor_name = executor_host.executor_name().to_string();
                    envelope.add_exception(err.to_string(), &executor_name);
                    tracing::error!(request_id = %envelope.request_id, executor = %executor_name, "{err}");
                    metrics.record_executor_error();
                    metrics.record_sent();
                    Outcome::ForwardWithError(envelope, request)
                }
                ErrorAction::Shutdown => {
                    tracing::info!(request_id = %envelope.request_id, "shutting down: {err}");
                    Outcome::Shutdown(envelope, request)
                }
            }
        }
    };

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::test_support::FakeExecutor;
    use crate::executor::ExecutorHost;

    fn envelope(id: &str, data_request: bool) -> Envelope {
        let mut e = Envelope::new(id, "search");
        e.is_data_request = data_request;
        e
    }

    fn host(name: &str) -> ExecutorHost<FakeExecutor<u32>, u32> {
        ExecutorHost::load(name, "fallback", false, 0, false, "test-pea").unwrap()
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)] // Test code - unwrap is acceptable
    async fn singleton_happy_path_forwards_and_updates_route() {
        let mut clock = Clock::new(60, 0, 0.0);
        let mut aggregator: PartialBuffer<u32> = PartialBuffer::new();
        let mut eh = host("ok");
        let metrics = PeaMetrics::new(100);

        let msg = Message::new(envelope("r1", true), 1u32);
        let outcome = run_pipeline(
            "my-pea",
            "id-1",
            1,
            SkipOnErrorType::Never,
            false,
            &mut clock,
            &mut aggregator,
            &mut eh,
            &metrics,
            msg,
        )
        .await
        .unwrap();

        match outcome {
            Outcome::Forward(env, _) => {
                assert_eq!(env.route.len(), 1);
                assert_eq!(env.route[0].pea_name, "my-pea");
                assert!(env.updated_at_unix_ms > 0);
            }
            _ => panic!("expected Forward"),
        }
        assert_eq!(metrics.snapshot().sent, 1);
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)] // Test code - unwrap is acceptable
    async fn tail_reduction_waits_for_all_parts() {
        let mut clock = Clock::new(60, 0, 0.0);
        let mut aggregator: PartialBuffer<u32> = PartialBuffer::new();
        let mut eh = host("ok");
        let metrics = PeaMetrics::new(100);

        for i in 0..2u32 {
            let msg = Message::new(envelope("r1", true), i);
            let outcome = run_pipeline(
                "tail",
                "id-t",
                3,
                SkipOnErrorType::Never,
                false,
                &mut clock,
                &mut aggregator,
                &mut eh,
                &metrics,
                msg,
            )
            .await
            .unwrap();
            assert!(matches!(outcome, Outcome::Suppress));
        }

        let msg = Message::new(envelope("r1", true), 2u32);
        let outcome = run_pipeline(
            "tail",
            "id-t",
            3,
            SkipOnErrorType::Never,
            false,
            &mut clock,
            &mut aggregator,
            &mut eh,
            &metrics,
            msg,
        )
        .await
        .unwrap();

        match outcome {
            Outcome::Forward(env, _) => {
                assert_eq!(env.route.len(), 3, "merged envelope carries all three routes");
            }
            _ => panic!("expected Forward on the completing arrival"),
        }
        assert!(aggregator.is_empty());
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)] // Test code - unwrap is acceptable
    async fn tail_reduction_exposes_sibling_requests_to_the_executor() {
        let mut clock = Clock::new(60, 0, 0.0);
        let mut aggregator: PartialBuffer<u32> = PartialBuffer::new();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let mut eh: ExecutorHost<FakeExecutor<u32>, u32> = ExecutorHost::from_executor(FakeExecutor {
            name: "reducer".to_string(),
            call_count: 0,
            save_count: 0,
            close_count: 0,
            attached_identity: None,
            on_call: Box::new(move |_, _, _, partial_requests| {
                seen2.lock().expect("mutex poisoned").extend_from_slice(partial_requests);
                Ok(())
            }),
        });
        let metrics = PeaMetrics::new(100);

        for i in 0..3u32 {
            let msg = Message::new(envelope("r1", true), i);
            let _ = run_pipeline(
                "tail",
                "id-t",
                3,
                SkipOnErrorType::Never,
                false,
                &mut clock,
                &mut aggregator,
                &mut eh,
                &metrics,
                msg,
            )
            .await
            .unwrap();
        }

        assert_eq!(*seen.lock().expect("mutex poisoned"), vec![0, 1, 2]);
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)] // Test code - unwrap is acceptable
    async fn chained_error_skips_executor_dispatch() {
        let mut clock = Clock::new(60, 0, 0.0);
        let mut aggregator: PartialBuffer<u32> = PartialBuffer::new();
        let mut eh = host("ok");
        let metrics = PeaMetrics::new(100);

        let mut env = envelope("r1", true);
        env.status = StatusCode::Error;
        let msg = Message::new(env, 1u32);
        let outcome = run_pipeline(
            "pea",
            "id",
            1,
            SkipOnErrorType::Handle,
            false,
            &mut clock,
            &mut aggregator,
            &mut eh,
            &metrics,
            msg,
        )
        .await
        .unwrap();

        match outcome {
            Outcome::ForwardWithError(env, _) => {
                assert!(env.exception.as_ref().unwrap().message.is_none());
            }
            _ => panic!("expected ForwardWithError"),
        }
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)] // Test code - unwrap is acceptable
    async fn executor_error_attaches_payload_and_identifies_executor() {
        let mut clock = Clock::new(60, 0, 0.0);
        let mut aggregator: PartialBuffer<u32> = PartialBuffer::new();
        let mut eh: ExecutorHost<FakeExecutor<u32>, u32> =
            ExecutorHost::from_executor(FakeExecutor::failing("ranker", || PeaError::ExecutorRuntime {
                executor: "ranker".to_string(),
                source: Box::new(std::io::Error::new(std::io::ErrorKind::Other, "boom")),
            }));
        let metrics = PeaMetrics::new(100);

        let msg = Message::new(envelope("r1", true), 1u32);
        let outcome = run_pipeline(
            "pea",
            "id",
            1,
            SkipOnErrorType::Never,
            false,
            &mut clock,
            &mut aggregator,
            &mut eh,
            &metrics,
            msg,
        )
        .await
        .unwrap();

        match outcome {
            Outcome::ForwardWithError(env, _) => {
                let exc = env.exception.unwrap();
                assert_eq!(exc.executor.as_deref(), Some("ranker"));
                assert!(exc.message.unwrap().contains("boom"));
            }
            _ => panic!("expected ForwardWithError"),
        }
        assert_eq!(metrics.snapshot().executor_errors, 1);
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)] // Test code - unwrap is acceptable
    async fn raise_error_early_propagates_instead_of_forwarding() {
        let mut clock = Clock::new(60, 0, 0.0);
        let mut aggregator: PartialBuffer<u32> = PartialBuffer::new();
        let mut eh: ExecutorHost<FakeExecutor<u32>, u32> =
            ExecutorHost::from_executor(FakeExecutor::failing("ranker", || PeaError::ExecutorRuntime {
                executor: "ranker".to_string(),
                source: Box::new(std::io::Error::new(std::io::ErrorKind::Other, "boom")),
            }));
        let metrics = PeaMetrics::new(100);

        let msg = Message::new(envelope("r1", true), 1u32);
        let result = run_pipeline(
            "pea",
            "id",
            1,
            SkipOnErrorType::Never,
            true,
            &mut clock,
            &mut aggregator,
            &mut eh,
            &metrics,
            msg,
        )
        .await;

        assert!(matches!(result, Err(PeaError::ExecutorRuntime { .. })));
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)] // Test code - unwrap is acceptable
    async fn memory_watermark_suppresses_send_but_keeps_loop_alive() {
        let mut clock = Clock::with_memory_probe(60, 0, 1.0, Box::new(|| 2.0));
        let mut aggregator: PartialBuffer<u32> = PartialBuffer::new();
        let mut eh = host("ok");
        let metrics = PeaMetrics::new(100);

        let msg = Message::new(envelope("r1", true), 1u32);
        let outcome = run_pipeline(
            "pea",
            "id",
            1,
            SkipOnErrorType::Never,
            false,
            &mut clock,
            &mut aggregator,
            &mut eh,
            &metrics,
            msg,
        )
        .await
        .unwrap();

        assert!(matches!(outcome, Outcome::Suppress));
        assert_eq!(metrics.snapshot().dropped_backpressure, 1);
    }
}
