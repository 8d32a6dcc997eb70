//! Error types for the report codec and config digester.

use thiserror::Error;

/// Errors from building or decoding a wire report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    /// `build_report` was called without observations.
    #[error("cannot build report from empty attributed observations")]
    EmptyObservations,

    /// More observations than the one-byte count field can describe.
    #[error("too many observations: {count} (max {max})")]
    TooManyObservations {
        /// Observations supplied.
        count: usize,
        /// Largest encodable count.
        max: usize,
    },

    /// Observer index does not address a slot in the presence vector.
    #[error("observer index {observer} out of range (max {max})")]
    ObserverOutOfRange {
        /// Offending observer index.
        observer: u8,
        /// Largest valid index.
        max: usize,
    },

    /// Input ends before the fixed header does.
    #[error("report too short: {len} bytes, need at least {min}")]
    Truncated {
        /// Bytes received.
        len: usize,
        /// Minimum header length.
        min: usize,
    },

    /// Total length disagrees with the declared observation count.
    #[error("report length mismatch: expected {expected} bytes for {count} observations, got {actual}")]
    LengthMismatch {
        /// Declared observation count.
        count: usize,
        /// Length implied by the count.
        expected: usize,
        /// Length received.
        actual: usize,
    },

    /// Report declares zero observations, so there is no median.
    #[error("report contains no observations")]
    NoObservations,
}

/// Errors from computing a config digest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DigestError {
    /// Chain id does not fit its one-byte length prefix.
    #[error("chain id is too long: {len} bytes (max 255)")]
    ChainIdTooLong {
        /// Chain id length in bytes.
        len: usize,
    },

    /// Contract address is not valid bech32.
    #[error("invalid contract address '{address}': {reason}")]
    InvalidContractAddress {
        /// The address as given.
        address: String,
        /// Decoder message.
        reason: String,
    },

    /// A list does not fit its one-byte length prefix.
    #[error("too many {field}: {len} (max 255)")]
    TooMany {
        /// Which list overflowed (`signers` or `transmitters`).
        field: &'static str,
        /// Its length.
        len: usize,
    },

    /// A config blob does not fit its four-byte length prefix.
    #[error("{field} is too large: {len} bytes")]
    BlobTooLarge {
        /// Which blob overflowed.
        field: &'static str,
        /// Its length.
        len: usize,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
