//! Wire report codec for the on-chain OCR2 aggregator.
//!
//! A report is a fixed-layout byte string the contract parses directly:
//!
//! ```text
//! ┌───────────┬────────────────────┬───────┬──────────────────────┬──────────┐
//! │ timestamp │ observer presence  │ count │ count × observation  │ fee rate │
//! │ u32 BE    │ 32 × u8            │ u8    │ 16-byte BE i128 each │ u64 BE   │
//! └───────────┴────────────────────┴───────┴──────────────────────┴──────────┘
//! ```
//!
//! Observations are stored in ascending observer order. Any change to widths
//! or ordering breaks compatibility with the deployed contract.

use serde::{Deserialize, Serialize};

use crate::errors::ReportError;

/// Width of the observation timestamp.
pub const TIMESTAMP_LEN: usize = 4;
/// Width of the observer presence vector.
pub const OBSERVERS_LEN: usize = 32;
/// Offset of the observation count byte.
pub const COUNT_OFFSET: usize = TIMESTAMP_LEN + OBSERVERS_LEN;
/// Length of everything before the first observation.
pub const PREFIX_LEN: usize = COUNT_OFFSET + 1;
/// Width of one encoded observation.
pub const OBSERVATION_LEN: usize = 16;
/// Width of the trailing fee-conversion rate.
pub const FEE_RATE_LEN: usize = 8;

const MAX_OBSERVATIONS: usize = u8::MAX as usize;

/// One oracle's parsed contribution to a reporting round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedObservation {
    /// Round timestamp (unix seconds).
    pub timestamp: u32,
    /// Observed value.
    pub value: i128,
    /// Fee-coin conversion rate observed alongside the value.
    pub fee_rate: u64,
    /// Index of the observing oracle.
    pub observer: u8,
}

/// Builds and reads median wire reports.
pub trait ReportCodec {
    /// Encode a non-empty set of observations into a report.
    fn build_report(&self, observations: &[ParsedObservation]) -> Result<Vec<u8>, ReportError>;

    /// Recover the consensus median value from a report.
    fn median_from_report(&self, report: &[u8]) -> Result<i128, ReportError>;

    /// Exact byte length of a report carrying `n` observations.
    fn max_report_length(&self, n: usize) -> usize;
}

/// Codec for the CosmWasm OCR2 aggregator contract.
#[derive(Clone, Copy, Debug, Default)]
pub struct WasmReportCodec;

impl ReportCodec for WasmReportCodec {
    fn build_report(&self, observations: &[ParsedObservation]) -> Result<Vec<u8>, ReportError> {
        let Some(first) = observations.first() else {
            return Err(ReportError::EmptyObservations);
        };
        let count = u8::try_from(observations.len()).map_err(|_| {
            ReportError::TooManyObservations {
                count: observations.len(),
                max: MAX_OBSERVATIONS,
            }
        })?;

        let mut sorted = observations.to_vec();
        sorted.sort_by_key(|o| o.observer);

        let mut presence = [0u8; OBSERVERS_LEN];
        for o in &sorted {
            let slot = presence.get_mut(usize::from(o.observer)).ok_or(
                ReportError::ObserverOutOfRange {
                    observer: o.observer,
                    max: OBSERVERS_LEN - 1,
                },
            )?;
            *slot = o.observer;
        }

        let mut fee_rates: Vec<u64> = sorted.iter().map(|o| o.fee_rate).collect();
        let fee_rate = upper_median(&mut fee_rates).ok_or(ReportError::EmptyObservations)?;

        let mut report = Vec::with_capacity(report_length(sorted.len()));
        report.extend_from_slice(&first.timestamp.to_be_bytes());
        report.extend_from_slice(&presence);
        report.push(count);
        for o in &sorted {
            report.extend_from_slice(&o.value.to_be_bytes());
        }
        report.extend_from_slice(&fee_rate.to_be_bytes());
        Ok(report)
    }

    fn median_from_report(&self, report: &[u8]) -> Result<i128, ReportError> {
        let count = checked_count(report)?;
        if count == 0 {
            return Err(ReportError::NoObservations);
        }

        let block = &report[PREFIX_LEN..PREFIX_LEN + count * OBSERVATION_LEN];
        let mut values: Vec<i128> = block
            .chunks_exact(OBSERVATION_LEN)
            .map(|chunk| {
                let mut buf = [0u8; OBSERVATION_LEN];
                buf.copy_from_slice(chunk);
                i128::from_be_bytes(buf)
            })
            .collect();

        upper_median(&mut values).ok_or(ReportError::NoObservations)
    }

    fn max_report_length(&self, n: usize) -> usize {
        report_length(n)
    }
}

/// Byte length of a report carrying `n` observations.
pub const fn report_length(n: usize) -> usize {
    PREFIX_LEN + OBSERVATION_LEN * n + FEE_RATE_LEN
}

/// Read the observation timestamp from a well-formed report.
pub fn timestamp_from_report(report: &[u8]) -> Result<u32, ReportError> {
    let _ = checked_count(report)?;
    let mut buf = [0u8; TIMESTAMP_LEN];
    buf.copy_from_slice(&report[..TIMESTAMP_LEN]);
    Ok(u32::from_be_bytes(buf))
}

/// Read the trailing fee-conversion rate from a well-formed report.
pub fn fee_rate_from_report(report: &[u8]) -> Result<u64, ReportError> {
    let _ = checked_count(report)?;
    let mut buf = [0u8; FEE_RATE_LEN];
    buf.copy_from_slice(&report[report.len() - FEE_RATE_LEN..]);
    Ok(u64::from_be_bytes(buf))
}

/// Sort `values` and pick the element at `n / 2`.
///
/// For even counts this is the upper of the two central elements, matching
/// the contract (`{-2, -1}` yields `-1`). Returns `None` for an empty slice.
pub fn upper_median<T: Ord + Copy>(values: &mut [T]) -> Option<T> {
    values.sort_unstable();
    values.get(values.len() / 2).copied()
}

/// Validate the total length against the count byte and return the count.
fn checked_count(report: &[u8]) -> Result<usize, ReportError> {
    let Some(&count) = report.get(COUNT_OFFSET) else {
        return Err(ReportError::Truncated {
            len: report.len(),
            min: PREFIX_LEN,
        });
    };
    let count = usize::from(count);
    let expected = report_length(count);
    if report.len() != expected {
        return Err(ReportError::LengthMismatch {
            count,
            expected,
            actual: report.len(),
        });
    }
    Ok(count)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const ONE_WITH_18_DECIMALS: u64 = 1_000_000_000_000_000_000;

    fn obs(observer: u8, value: i128, fee_rate: u64) -> ParsedObservation {
        ParsedObservation {
            timestamp: 1_633_364_819,
            value,
            fee_rate,
            observer,
        }
    }

    #[test]
    fn build_report_layout() {
        let codec = WasmReportCodec;
        let n = 4;
        let observations: Vec<_> = (0..n)
            .map(|i| obs(i, 1_234_567_890, ONE_WITH_18_DECIMALS))
            .collect();

        let report = codec.build_report(&observations).unwrap();

        let total = PREFIX_LEN + OBSERVATION_LEN * usize::from(n) + FEE_RATE_LEN;
        assert_eq!(report.len(), total);
        assert_eq!(report[..4], observations[0].timestamp.to_be_bytes());

        let mut expected_observers = [0u8; 32];
        for i in 0..n {
            expected_observers[usize::from(i)] = i;
        }
        assert_eq!(report[4..36], expected_observers);
        assert_eq!(report[36], n);

        for i in 0..usize::from(n) {
            let at = PREFIX_LEN + OBSERVATION_LEN * i;
            assert_eq!(
                report[at..at + OBSERVATION_LEN],
                1_234_567_890_i128.to_be_bytes(),
                "observation #{i}"
            );
        }
        assert_eq!(
            report[total - FEE_RATE_LEN..],
            ONE_WITH_18_DECIMALS.to_be_bytes()
        );
    }

    #[test]
    fn observations_are_written_in_observer_order() {
        let codec = WasmReportCodec;
        let report = codec
            .build_report(&[obs(5, 50, 1), obs(1, 10, 1), obs(3, 30, 1)])
            .unwrap();

        assert_eq!(report[4 + 1], 1);
        assert_eq!(report[4 + 3], 3);
        assert_eq!(report[4 + 5], 5);
        assert_eq!(report[4], 0);

        let values: Vec<i128> = report[PREFIX_LEN..PREFIX_LEN + 3 * OBSERVATION_LEN]
            .chunks_exact(OBSERVATION_LEN)
            .map(|c| i128::from_be_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(values, vec![10, 30, 50]);
    }

    #[test]
    fn timestamp_comes_from_first_observation() {
        let codec = WasmReportCodec;
        let mut late = obs(0, 1, 1);
        late.timestamp = 99;
        let mut early = obs(1, 1, 1);
        early.timestamp = 7;
        let report = codec.build_report(&[late, early]).unwrap();
        assert_eq!(timestamp_from_report(&report).unwrap(), 99);
    }

    #[test]
    fn fee_rate_is_upper_median() {
        let codec = WasmReportCodec;
        let report = codec
            .build_report(&[obs(0, 1, 300), obs(1, 1, 100), obs(2, 1, 400), obs(3, 1, 200)])
            .unwrap();
        assert_eq!(fee_rate_from_report(&report).unwrap(), 300);
    }

    #[test]
    fn negative_values_use_twos_complement() {
        let codec = WasmReportCodec;
        let report = codec.build_report(&[obs(0, -1, 1)]).unwrap();
        assert_eq!(report[PREFIX_LEN..PREFIX_LEN + OBSERVATION_LEN], [0xff; 16]);
    }

    #[test]
    fn median_from_onchain_report() {
        let codec = WasmReportCodec;
        #[rustfmt::skip]
        let report: Vec<u8> = vec![
            97, 91, 43, 83, // observations_timestamp
            0, 1, 2, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // observers
            2, // len
            0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 73, 150, 2, 210, // observation 1
            0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 73, 150, 2, 210, // observation 2
            13, 224, 182, 179, 167, 100, 0, 0, // fee rate (1 with 18 decimal places)
        ];
        assert_eq!(codec.median_from_report(&report).unwrap(), 1_234_567_890);
        assert_eq!(fee_rate_from_report(&report).unwrap(), ONE_WITH_18_DECIMALS);
        assert_eq!(timestamp_from_report(&report).unwrap(), 0x615B_2B53);
    }

    #[test]
    fn build_report_requires_observations() {
        assert_matches!(
            WasmReportCodec.build_report(&[]),
            Err(ReportError::EmptyObservations)
        );
    }

    #[test]
    fn build_report_rejects_out_of_range_observer() {
        assert_matches!(
            WasmReportCodec.build_report(&[obs(32, 1, 1)]),
            Err(ReportError::ObserverOutOfRange { observer: 32, .. })
        );
    }

    #[test]
    fn build_report_rejects_oversized_count() {
        let observations = vec![obs(0, 1, 1); 256];
        assert_matches!(
            WasmReportCodec.build_report(&observations),
            Err(ReportError::TooManyObservations { count: 256, .. })
        );
    }

    #[test]
    fn median_rejects_truncated_input() {
        assert_matches!(
            WasmReportCodec.median_from_report(&[0u8; 10]),
            Err(ReportError::Truncated { len: 10, .. })
        );
    }

    #[test]
    fn median_rejects_short_body_for_declared_count() {
        let mut report = WasmReportCodec
            .build_report(&[obs(0, 1, 1), obs(1, 2, 1)])
            .unwrap();
        let _ = report.pop();
        assert_matches!(
            WasmReportCodec.median_from_report(&report),
            Err(ReportError::LengthMismatch { count: 2, .. })
        );
    }

    #[test]
    fn median_rejects_zero_count() {
        let report = vec![0u8; report_length(0)];
        assert_matches!(
            WasmReportCodec.median_from_report(&report),
            Err(ReportError::NoObservations)
        );
    }

    #[test]
    fn max_report_length_formula() {
        let codec = WasmReportCodec;
        assert_eq!(codec.max_report_length(0), 45);
        assert_eq!(codec.max_report_length(1), 61);
        assert_eq!(codec.max_report_length(31), 4 + 32 + 1 + 16 * 31 + 8);
    }

    fn median_of(values: &[i128]) -> i128 {
        let codec = WasmReportCodec;
        let observations: Vec<_> = values
            .iter()
            .enumerate()
            .map(|(i, &v)| obs(u8::try_from(i).unwrap(), v, 1))
            .collect();
        let report = codec.build_report(&observations).unwrap();
        assert_eq!(report.len(), codec.max_report_length(values.len()));
        codec.median_from_report(&report).unwrap()
    }

    #[test]
    fn median_table() {
        let cases: &[(&str, &[i128], i128)] = &[
            ("2 positive one zero", &[0, 10, 20], 10),
            ("one zero", &[0], 0),
            ("two equal", &[1, 1], 1),
            ("one negative one positive", &[-1, 1], 1),
            ("two negative", &[-2, -1], -1),
            ("three negative", &[-5, -3, -1], -3),
        ];
        for (name, values, expected) in cases {
            assert_eq!(median_of(values), *expected, "{name}");
        }
    }

    #[test]
    fn median_for_every_count_up_to_31() {
        for n in 1..32 {
            assert_eq!(median_of(&vec![1; n]), 1, "observations={n}");
        }
    }

    #[test]
    fn median_ignores_observer_order() {
        let codec = WasmReportCodec;
        let report = codec
            .build_report(&[obs(0, 90, 1), obs(1, -4, 1), obs(2, 17, 1), obs(3, 3, 1)])
            .unwrap();
        assert_eq!(codec.median_from_report(&report).unwrap(), 17);
    }

    #[test]
    fn upper_median_of_empty_is_none() {
        let mut empty: [i128; 0] = [];
        assert_eq!(upper_median(&mut empty), None);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn observations() -> impl Strategy<Value = Vec<ParsedObservation>> {
            proptest::collection::vec((any::<i128>(), any::<u64>()), 1..=32).prop_map(|pairs| {
                pairs
                    .into_iter()
                    .enumerate()
                    .map(|(i, (value, fee_rate))| ParsedObservation {
                        timestamp: 1,
                        value,
                        fee_rate,
                        observer: u8::try_from(i).unwrap(),
                    })
                    .collect()
            })
        }

        /// Arbitrary bytes whose length agrees with their count byte.
        fn well_sized_bytes() -> impl Strategy<Value = Vec<u8>> {
            (0u8..=40).prop_flat_map(|count| {
                proptest::collection::vec(any::<u8>(), report_length(usize::from(count))).prop_map(
                    move |mut bytes| {
                        bytes[COUNT_OFFSET] = count;
                        bytes
                    },
                )
            })
        }

        proptest! {
            #[test]
            fn median_matches_rule(obs in observations()) {
                let codec = WasmReportCodec;
                let report = codec.build_report(&obs).unwrap();
                let mut values: Vec<i128> = obs.iter().map(|o| o.value).collect();
                values.sort_unstable();
                prop_assert_eq!(codec.median_from_report(&report).unwrap(), values[values.len() / 2]);
            }

            #[test]
            fn length_matches_max_report_length(obs in observations()) {
                let codec = WasmReportCodec;
                let report = codec.build_report(&obs).unwrap();
                prop_assert_eq!(report.len(), codec.max_report_length(obs.len()));
            }

            #[test]
            fn accepted_reports_reencode(bytes in well_sized_bytes()) {
                let codec = WasmReportCodec;
                let count = bytes[COUNT_OFFSET];
                let decoded = codec.median_from_report(&bytes);
                if count > 0 {
                    prop_assert!(decoded.is_ok());
                }
                if let Ok(median) = decoded {
                    let single = ParsedObservation { timestamp: 1, value: median, fee_rate: 1, observer: 0 };
                    let report = codec.build_report(&[single]).unwrap();
                    prop_assert_eq!(codec.median_from_report(&report).unwrap(), median);
                }
            }

            #[test]
            fn mutated_valid_reports_never_panic(
                obs in observations(),
                flip in any::<usize>(),
                byte in any::<u8>(),
            ) {
                let codec = WasmReportCodec;
                let mut report = codec.build_report(&obs).unwrap();
                let at = flip % report.len();
                report[at] = byte;
                if let Ok(median) = codec.median_from_report(&report) {
                    let single = ParsedObservation { timestamp: 1, value: median, fee_rate: 1, observer: 0 };
                    prop_assert!(codec.build_report(&[single]).is_ok());
                }
            }
        }
    }
}
