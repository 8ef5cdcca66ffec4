// pea: error policy (C5, §4.5, §7)

use crate::error::PeaError;

/// What the dispatcher does with a fault raised anywhere in the hook
/// pipeline, independent of which stage raised it. Mirrors the table in
/// §4.5/§7 exactly; `hooks::run_pipeline` is the only caller.
#[derive(Debug, PartialEq, Eq)]
pub enum ErrorAction {
    /// NoExplicitMessage: silently absorb, no send, loop continues.
    Silent,
    /// MemoryOverHighWatermark: log critical, no send, loop continues.
    Backpressure,
    /// ChainedPodException: mark the message with a chained-error marker
    /// (no payload) and forward.
    ChainedPassthrough,
    /// Any other executor runtime error: attach payload and forward, unless
    /// `raise_error_early` says to re-raise instead.
    ExecutorFault,
    /// RequestLoopEnd / transport failure / process signal / user
    /// interrupt: forward the original message, then tear down.
    Shutdown,
}

pub fn classify(err: &PeaError) -> ErrorAction {
    match err {
        PeaError::NoExplicitMessage => ErrorAction::Silent,
        PeaError::MemoryOverHighWatermark => ErrorAction::Backpressure,
        PeaError::ChainedPodException => ErrorAction::ChainedPassthrough,
        PeaError::RequestLoopEnd
        | PeaError::TransportFailure(_)
        | PeaError::ProcessSignal(_)
        | PeaError::UserInterrupt => ErrorAction::Shutdown,
        // ConfigSourceBad/ExecutorLoadFailed never reach here: they are
        // raised and handled entirely within executor load (§4.3, §9),
        // before the request loop starts.
        PeaError::ConfigSourceBad(_) | PeaError::ExecutorLoadFailed(_) | PeaError::ExecutorRuntime { .. } => {
            ErrorAction::ExecutorFault
        }
    }
}
