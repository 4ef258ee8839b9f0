//! Decoding of the telemetry beacon broadcast by the OBC.
//!
//! A beacon carries no self-describing headers. Its layout is a fixed sequence of categories,
//! each a fixed run of bit fields, that the ground and the OBC agree on out-of-band.

mod beacon;
mod category;
pub mod field;

pub use beacon::{BeaconDecoder, BeaconLayout, CategoryLayout, DecodedBeacon, FieldLayout, TelemetrySnapshot};
pub use category::{Category, CategorySpec};
pub use field::{BitCursor, BitWriter, ByteOrder, FieldSpec, FieldValue, Presentation};

pub type TelemetryResult<T> = Result<T, TelemetryError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TelemetryError {
    /// A read would run past the end of the buffer
    #[error("reading {requested} bits at bit offset {offset} exceeds the {available} bit buffer")]
    OutOfRange { offset: usize, requested: usize, available: usize },
    /// A value was handed to the encoder that does not fit into its field
    #[error("value {value:#x} does not fit into {bits} bits")]
    ValueTooLarge { value: u64, bits: u8 },
    /// The static layout configuration is broken. Only expected during startup validation.
    #[error("inconsistent layout {name:?}: {reason}")]
    SpecInconsistency { name: String, reason: String },
    /// The beacon payload ended before all categories were decoded
    #[error("beacon payload of {available} bits ends inside category {category:?}, which needs {required} bits")]
    TruncatedPayload { category: String, available: usize, required: usize },
}

impl TelemetryError {
    pub(crate) fn inconsistent(name: impl Into<String>, reason: impl Into<String>) -> Self {
        TelemetryError::SpecInconsistency { name: name.into(), reason: reason.into() }
    }
}

/// Soft warning: bits left over after the last configured category was decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailingBytes {
    pub bits: usize,
}

impl std::fmt::Display for TrailingBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} trailing bits after the last category", self.bits)
    }
}
