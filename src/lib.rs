// pea: request loop and message-handling state machine for a single
// neural-search pipeline worker.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod aggregator;
pub mod clock;
pub mod config;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod message;
pub mod metrics;
pub mod outcome;
pub mod pea;
pub mod policy;
pub mod transport;

pub use config::{PeaConfig, PeaRole, SkipOnErrorType};
pub use error::{PeaError, PeaResult};
pub use executor::{Executor, ExecutorHost, PassExecutor};
pub use message::{Envelope, Message, StatusCode};
pub use metrics::{MetricsSnapshot, PeaMetrics};
pub use outcome::Outcome;
pub use pea::Pea;
pub use transport::Transport;

/// Install the process-wide tracing subscriber. Idempotent-safe to call once
/// at process start; a second call is a caller bug, not handled here.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
