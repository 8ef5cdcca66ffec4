// pea: scoped lifetime and request loop (C6, C7, §4.6, §4.7)

use tokio::sync::oneshot;

use crate::aggregator::PartialBuffer;
use crate::clock::Clock;
use crate::config::PeaConfig;
use crate::error::PeaResult;
use crate::executor::{Executor, ExecutorHost};
use crate::hooks::run_pipeline;
use crate::message::Message;
use crate::metrics::PeaMetrics;
use crate::outcome::Outcome;
use crate::transport::Transport;

const LATENCY_SAMPLE_CAPACITY: usize = 1024;

/// One worker in a pipeline: owns its executor, its transport, and the
/// clock/aggregator/metrics state threaded through the hook pipeline on
/// every turn. Mirrors the reference crate's `SidecarServer`, which composes
/// a client, metrics and health state behind a single entry point.
pub struct Pea<E: Executor<R>, T: Transport<R>, R: Clone + Send> {
    config: PeaConfig,
    name: String,
    clock: Clock,
    aggregator: PartialBuffer<R>,
    executor_host: ExecutorHost<E, R>,
    transport: T,
    metrics: PeaMetrics,
}

impl<E: Executor<R>, T: Transport<R>, R: Clone + Send> Pea<E, T, R> {
    /// §4.7 scoped entry: resolve the derived name, note any plugin sources
    /// (plugin loading itself is host-provided, out of scope here), then
    /// load the executor with its primary/fallback sources (§4.3) and
    /// attach it to this Pea's identity (§6).
    pub fn enter(config: PeaConfig, transport: T) -> PeaResult<Self> {
        for module in &config.py_modules {
            tracing::debug!(module = %module, "plugin source declared (loading is host-provided)");
        }

        let name = config.derived_name();
        let executor_host = ExecutorHost::load(
            &config.uses,
            &config.uses_internal,
            config.separated_workspace,
            config.pea_id,
            config.read_only,
            &config.identity,
        )?;
        let clock = Clock::new(config.max_idle_time, config.dump_interval, config.memory_hwm);

        tracing::info!(pea = %name, identity = %config.identity, "entered");

        Ok(Self {
            name,
            clock,
            aggregator: PartialBuffer::new(),
            executor_host,
            transport,
            metrics: PeaMetrics::new(LATENCY_SAMPLE_CAPACITY),
            config,
        })
    }

    /// Enter with an already-constructed executor host, skipping `load`.
    /// For tests that need to script executor behavior `load_config` can't
    /// express (e.g. "fail on the second call").
    pub fn enter_with_host(config: PeaConfig, transport: T, executor_host: ExecutorHost<E, R>) -> Self {
        let name = config.derived_name();
        let clock = Clock::new(config.max_idle_time, config.dump_interval, config.memory_hwm);
        Self {
            name,
            clock,
            aggregator: PartialBuffer::new(),
            executor_host,
            transport,
            metrics: PeaMetrics::new(LATENCY_SAMPLE_CAPACITY),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &PeaMetrics {
        &self.metrics
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// C6 request loop. `ready`, if given, is signalled exactly once after
    /// the Pea has entered and before the first `recv`, so a supervisor can
    /// wait for startup without racing the first message (§4.6 step 1).
    pub async fn run(&mut self, ready: Option<oneshot::Sender<()>>) -> PeaResult<()> {
        if let Some(tx) = ready {
            let _ = tx.send(());
        }

        loop {
            let msg = tokio::select! {
                biased;
                ctrl_c = tokio::signal::ctrl_c() => {
                    if ctrl_c.is_ok() {
                        tracing::info!(pea = %self.name, "user interrupt received, shutting down");
                    }
                    break;
                }
                recv = self.transport.recv() => match recv {
                    Ok(Some(msg)) => msg,
                    Ok(None) => {
                        tracing::info!(pea = %self.name, "transport exhausted, ending loop");
                        break;
                    }
                    Err(err) => {
                        tracing::error!(pea = %self.name, "transport failure: {err}");
                        break;
                    }
                },
            };

            let outcome = run_pipeline(
                &self.name,
                &self.config.identity,
                self.config.num_part,
                self.config.skip_on_error,
                self.config.raise_error_early,
                &mut self.clock,
                &mut self.aggregator,
                &mut self.executor_host,
                &self.metrics,
                msg,
            )
            .await?;

            if self.clock.should_dump() {
                self.transport.print_stats();
            }

            for orphan in self.aggregator.sweep(self.config.max_idle_time) {
                tracing::warn!(
                    pea = %self.name,
                    request_id = %orphan.request_id,
                    parts_collected = orphan.parts_collected,
                    "dropped an orphaned partial request"
                );
            }

            match outcome {
                Outcome::Forward(envelope, request) | Outcome::ForwardWithError(envelope, request) => {
                    self.transport.send_message(Message::new(envelope, request)).await?;
                }
                Outcome::Suppress => {}
                Outcome::Shutdown(envelope, request) => {
                    self.transport.send_message(Message::new(envelope, request)).await?;
                    break;
                }
            }
        }

        Ok(())
    }

    /// §4.7 scoped exit: close the executor, then the transport. Safe to
    /// call more than once.
    pub async fn teardown(&mut self) -> PeaResult<()> {
        self.executor_host.close().await?;
        self.transport.close().await?;
        tracing::info!(pea = %self.name, "torn down");
        Ok(())
    }
}
