use crate::record::Record;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A bit read would run past the end of the packet buffer.
    #[error("read of {requested} bits at bit {position} exceeds buffer of {available} bits")]
    OutOfBounds {
        position: usize,
        requested: usize,
        available: usize,
    },

    /// No length strategy resolved a size for a variable length field.
    #[error("unable to determine field length: {0}")]
    AmbiguousLength(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    /// A computed field size was not a usable bit count.
    #[error("invalid size: {0}")]
    InvalidSize(String),

    #[error("comparison failed: {0}")]
    Comparison(String),

    /// A criteria referenced a parameter that has not been decoded.
    #[error("unresolved reference to {0}")]
    UnresolvedReference(String),

    #[error("calibration query {query} outside of spline range [{min}, {max}] and extrapolation is disabled")]
    CalibrationRange { query: f64, min: f64, max: f64 },

    /// Container inheritance could not be resolved to exactly one packet type. The fields
    /// decoded before the failure are kept in `partial`.
    #[error("unrecognized packet type: {message}")]
    UnrecognizedPacketType {
        message: String,
        partial: Box<Record>,
    },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("duplicate {kind} name {name} bound to non-identical definitions")]
    DuplicateDefinition { kind: &'static str, name: String },

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("raw value {value} has no label in enumeration {type_name}")]
    Enumeration { type_name: String, value: i128 },

    #[error("failed to decode string: {0}")]
    StringDecode(String),

    /// Packet header field out of range.
    #[error("invalid packet header: {0}")]
    InvalidHeader(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
