// pea: error taxonomy

use thiserror::Error;

/// Pea result type
pub type PeaResult<T> = Result<T, PeaError>;

/// Fault conditions the request loop and hook pipeline can raise.
///
/// Every variant corresponds to a row in the error-policy table: the
/// dispatcher in `policy::classify` never inspects anything but the variant
/// to decide whether to forward, suppress, or shut down.
#[derive(Debug, Error)]
pub enum PeaError {
    /// The primary executor config source could not be loaded. Retriable
    /// exactly once against `uses_internal`.
    #[error("executor config source is bad: {0}")]
    ConfigSourceBad(String),

    /// Neither the primary nor the fallback config source could be loaded.
    /// Fatal: the scope never opens.
    #[error("executor failed to load: {0}")]
    ExecutorLoadFailed(String),

    /// A tail/reducer is still waiting on partial messages for this request.
    #[error("waiting for more partial messages")]
    NoExplicitMessage,

    /// The incoming message already carries an upstream error and
    /// `skip_on_error` says not to hand it to the executor.
    #[error("message carries a chained upstream error")]
    ChainedPodException,

    /// Resident memory exceeded the configured high watermark.
    #[error("memory usage above high watermark")]
    MemoryOverHighWatermark,

    /// Cooperative shutdown requested by upstream.
    #[error("request loop end signal received")]
    RequestLoopEnd,

    /// The transport failed to deliver or send a message.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// A process-level signal (e.g. SIGTERM) arrived.
    #[error("process signal received: {0}")]
    ProcessSignal(String),

    /// The user interrupted the process (Ctrl-C).
    #[error("user interrupt")]
    UserInterrupt,

    /// Anything else the executor raised while handling a request.
    #[error("executor runtime error in {executor}: {source}")]
    ExecutorRuntime {
        executor: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl PeaError {
    /// `ConfigSourceBad` is the only retriable failure kind, and only
    /// during executor load (§9: widening this would mask genuine load
    /// failures).
    pub fn is_config_source_bad(&self) -> bool {
        matches!(self, PeaError::ConfigSourceBad(_))
    }

    /// Errors that must not be forwarded and must not unwind the loop.
    pub fn is_silent(&self) -> bool {
        matches!(self, PeaError::NoExplicitMessage)
    }

    /// Errors that drop the current send but keep the loop running.
    pub fn is_backpressure(&self) -> bool {
        matches!(self, PeaError::MemoryOverHighWatermark)
    }

    /// Errors that forward the message and then tear down the loop.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PeaError::RequestLoopEnd
                | PeaError::TransportFailure(_)
                | PeaError::ProcessSignal(_)
                | PeaError::UserInterrupt
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_source_bad_is_the_only_retriable_kind() {
        assert!(PeaError::ConfigSourceBad("x".into()).is_config_source_bad());
        assert!(!PeaError::ExecutorLoadFailed("x".into()).is_config_source_bad());
        assert!(!PeaError::ChainedPodException.is_config_source_bad());
    }

    #[test]
    fn no_explicit_message_is_silent_only() {
        assert!(PeaError::NoExplicitMessage.is_silent());
        assert!(!PeaError::ChainedPodException.is_silent());
        assert!(!PeaError::MemoryOverHighWatermark.is_silent());
    }

    #[test]
    fn memory_watermark_is_backpressure_only() {
        assert!(PeaError::MemoryOverHighWatermark.is_backpressure());
        assert!(!PeaError::RequestLoopEnd.is_backpressure());
    }

    #[test]
    fn terminal_kinds_match_table() {
        assert!(PeaError::RequestLoopEnd.is_terminal());
        assert!(PeaError::TransportFailure("x".into()).is_terminal());
        assert!(PeaError::ProcessSignal("SIGTERM".into()).is_terminal());
        assert!(PeaError::UserInterrupt.is_terminal());
        assert!(!PeaError::ChainedPodException.is_terminal());
        assert!(!PeaError::NoExplicitMessage.is_terminal());
    }
}
