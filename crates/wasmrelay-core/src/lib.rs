//! # wasmrelay-core
//!
//! Pure, I/O-free building blocks shared by the wasmrelay crates:
//!
//! - **Report codec**: [`ReportCodec`] trait and [`WasmReportCodec`], the
//!   fixed-layout binary report the on-chain aggregator contract parses
//! - **Observations**: [`ParsedObservation`], one oracle's contribution to a round
//! - **Config digest**: [`ConfigDigester`] hashing a [`ContractConfig`] into a
//!   prefixed [`ConfigDigest`]
//! - **Errors**: [`ReportError`] and [`DigestError`] via `thiserror`

#![deny(unsafe_code)]

pub mod digest;
pub mod errors;
pub mod report;

pub use digest::{CONFIG_DIGEST_PREFIX, ConfigDigest, ConfigDigester, ContractConfig};
pub use errors::{DigestError, ReportError};
pub use report::{ParsedObservation, ReportCodec, WasmReportCodec, upper_median};
