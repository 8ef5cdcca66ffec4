// pea: tagged outcome replacing exceptions-as-control-flow (§9 design note)

use crate::message::Envelope;

/// What the hook pipeline decided to do with one inbound message. The
/// dispatcher in `policy::classify` maps every `PeaError` kind onto exactly
/// one of these, instead of matching on raised conditions.
pub enum Outcome<R> {
    /// Send the message; the loop continues.
    Forward(Envelope, R),
    /// Do not send anything; the loop continues (NoExplicitMessage,
    /// MemoryOverHighWatermark).
    Suppress,
    /// Send the message, marked with an error payload; the loop continues
    /// (ChainedPodException, ExecutorRuntime unless `raise_error_early`).
    ForwardWithError(Envelope, R),
    /// Send the original message, then tear the loop down
    /// (RequestLoopEnd, transport/process signal, user interrupt).
    Shutdown(Envelope, R),
}
