//! Error types for tamperscope-probe

use serde::Serialize;

/// Result type for probe operations.
pub type Result<T> = std::result::Result<T, BitstreamError>;

/// A bitstream problem located at the offset of the unit that caused it.
///
/// These never abort an analysis run; the affected sample or candidate is
/// marked undecodable and the error kept as its reason.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[error("{kind} (unit at offset {offset})")]
pub struct BitstreamError {
    /// Absolute offset of the NAL unit (or record) in the file.
    pub offset: u64,
    pub kind: BitstreamErrorKind,
}

impl BitstreamError {
    pub fn new(offset: u64, kind: BitstreamErrorKind) -> Self {
        Self { offset, kind }
    }
}

/// Which parameter set a reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterSetKind {
    Vps,
    Sps,
    Pps,
}

impl std::fmt::Display for ParameterSetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Vps => "VPS",
            Self::Sps => "SPS",
            Self::Pps => "PPS",
        })
    }
}

/// What went wrong while reading a unit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BitstreamErrorKind {
    /// Ran out of bits while reading a field.
    #[error("truncated while reading {field}")]
    Truncated { field: &'static str },

    /// The NAL header's forbidden_zero_bit is set.
    #[error("forbidden_zero_bit set")]
    ForbiddenBit,

    /// An Exp-Golomb code with more than 31 leading zeros.
    #[error("exp-Golomb overflow in {field}")]
    ExpGolombOverflow { field: &'static str },

    /// A field value outside its legal range.
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: u64 },

    /// A slice or PPS refers to a parameter set that was never seen.
    #[error("reference to undefined {kind} {id}")]
    UndefinedParameterSet { kind: ParameterSetKind, id: u32 },

    /// A NAL length prefix points past the end of the data.
    #[error("NAL length {declared} exceeds {available} available bytes")]
    LengthOverrun { declared: u64, available: u64 },

    /// A zero-length NAL unit.
    #[error("empty NAL unit")]
    EmptyUnit,

    /// A decoder configuration record could not be read.
    #[error("invalid configuration record: {0}")]
    InvalidConfig(String),

    /// A syntax feature the parser does not handle.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

impl BitstreamErrorKind {
    /// Attach a unit offset.
    pub fn at(self, offset: u64) -> BitstreamError {
        BitstreamError::new(offset, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = BitstreamErrorKind::UndefinedParameterSet {
            kind: ParameterSetKind::Pps,
            id: 3,
        }
        .at(4096);
        assert_eq!(
            err.to_string(),
            "reference to undefined PPS 3 (unit at offset 4096)"
        );
    }

    #[test]
    fn test_serialize_tagged() {
        let err = BitstreamErrorKind::ExpGolombOverflow { field: "slice_type" }.at(8);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"]["type"], "exp_golomb_overflow");
        assert_eq!(json["offset"], 8);
    }
}
