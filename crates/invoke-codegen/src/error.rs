use crate::target::RegClass;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A compiler-internal invariant was violated; the method cannot be compiled.
    #[error("Invariant violation: {0}")]
    Invariant(String),

    #[error("Temp register pool exhausted for {0:?} registers")]
    OutOfTemps(RegClass),

    #[error("Unsupported by target: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, Error>;
