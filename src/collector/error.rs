use thiserror::Error;

/// Error kinds produced while running one sampling tick.
///
/// All of these are logged and contained to the tick that produced them —
/// nothing here ever unwinds out of `Sampler::tick`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectorError {
    #[error("malformed bpf event: {0}")]
    Decode(String),

    #[error("failed to resolve pod/container identity: {0}")]
    Resolve(String),

    #[error("failed to read node energy: {0}")]
    EnergyRead(String),

    #[error("monotonic counter went backwards")]
    Regression,

    #[error("u64 addition overflowed")]
    Overflow,

    #[error("attribution model unavailable: {0}")]
    ModelUnavailable(String),
}
