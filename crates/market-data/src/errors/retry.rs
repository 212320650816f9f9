/// Classification for failover policy.
///
/// Used by the coordinator to decide what a provider error means for that
/// provider's state before moving on to the next one.
///
/// | Class | Next provider? | Failure metric? | Rate-limit hit? |
/// |-------|----------------|-----------------|-----------------|
/// | `Never` | No | No | No |
/// | `RateLimitBackoff` | Yes | Yes | Yes |
/// | `FailoverWithPenalty` | Yes | Yes | No |
/// | `NextProvider` | Yes | No | No |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Terminal: the request itself is invalid, or every option is exhausted.
    Never,

    /// The provider declared a rate-limit condition. Back the provider off
    /// (honoring any retry-after) and fail over.
    RateLimitBackoff,

    /// Failover to next provider and record a failure against this one.
    ///
    /// Used for timeouts, transport errors, empty and invalid payloads.
    /// Failures accumulate into the circuit breaker.
    FailoverWithPenalty,

    /// Try next provider without recording any penalty.
    ///
    /// Used when this provider can't serve the request shape (e.g. a
    /// timeframe it has no interval for) but another provider might.
    NextProvider,
}
