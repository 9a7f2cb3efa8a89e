use serde::{Deserialize, Serialize};

use crate::error::{Result, SimplexError};
use crate::signal::RRSeries;

/// Three non-negative proportions summing to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimplexPoint(pub [f64; 3]);

impl SimplexPoint {
    /// Divide each interval of a triplet by the triplet's sum.
    pub fn from_triplet(triplet: [f64; 3]) -> Option<Self> {
        let sum: f64 = triplet.iter().sum();
        if sum == 0.0 || !sum.is_finite() {
            return None;
        }
        Some(Self(triplet.map(|x| x / sum)))
    }

    pub fn components(&self) -> [f64; 3] {
        self.0
    }

    pub fn sum(&self) -> f64 {
        self.0.iter().sum()
    }
}

/// Triplets produced from one RR series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripletNormalization {
    pub points: Vec<SimplexPoint>,
    /// Trailing intervals left over after the last full triplet (0, 1 or 2).
    pub discarded: usize,
}

/// Partition `rr` into consecutive, non-overlapping triplets and map each one
/// onto the simplex. Up to two trailing intervals are dropped.
pub fn normalize_triplets(rr: &RRSeries) -> Result<TripletNormalization> {
    let usable = rr.rr.len() / 3 * 3;
    if usable == 0 {
        return Err(SimplexError::InsufficientIntervals {
            available: rr.rr.len(),
        });
    }
    for (index, &value) in rr.rr[..usable].iter().enumerate() {
        if !value.is_finite() {
            return Err(SimplexError::NonFiniteInterval { index, value });
        }
        if value < 0.0 {
            return Err(SimplexError::NegativeInterval { index, value });
        }
    }

    let points = rr.rr[..usable]
        .chunks_exact(3)
        .enumerate()
        .map(|(index, chunk)| {
            SimplexPoint::from_triplet([chunk[0], chunk[1], chunk[2]])
                .ok_or(SimplexError::ZeroSumTriplet { index })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(TripletNormalization {
        points,
        discarded: rr.rr.len() - usable,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rr(values: &[f64]) -> RRSeries {
        RRSeries {
            rr: values.to_vec(),
        }
    }

    #[test]
    fn equal_intervals_land_on_the_centroid() {
        let out = normalize_triplets(&rr(&[1.0, 1.0, 1.0])).unwrap();
        assert_eq!(out.points.len(), 1);
        for c in out.points[0].components() {
            assert!((c - 1.0 / 3.0).abs() < 1e-12);
        }
        assert_eq!(out.discarded, 0);
    }

    #[test]
    fn fewer_than_three_intervals_is_insufficient() {
        for n in 0..3 {
            let err = normalize_triplets(&rr(&vec![0.8; n])).unwrap_err();
            assert!(matches!(err, SimplexError::InsufficientIntervals { available } if available == n));
        }
    }

    #[test]
    fn truncation_keeps_floor_of_len_over_three() {
        let data = [
            0.82, 0.78, 0.80, 0.79, 0.83, 0.77, 0.84, 0.88, 0.86, 0.81, 0.79, 0.82, 0.85, 0.78,
            0.80, 0.79, 0.83, 0.84, 0.82, 0.81,
        ];
        for len in 3..=data.len() {
            let out = normalize_triplets(&rr(&data[..len])).unwrap();
            assert_eq!(out.points.len(), len / 3);
            assert_eq!(out.discarded, len % 3);
            for p in &out.points {
                assert!((p.sum() - 1.0).abs() < 1e-9);
                assert!(p.components().iter().all(|&c| c >= 0.0));
            }
        }
    }

    #[test]
    fn triplets_do_not_overlap_and_keep_order() {
        let out = normalize_triplets(&rr(&[1.0, 2.0, 1.0, 3.0, 1.0, 1.0, 9.0])).unwrap();
        assert_eq!(out.points[0].components(), [0.25, 0.5, 0.25]);
        assert_eq!(out.points[1].components(), [0.6, 0.2, 0.2]);
        assert_eq!(out.discarded, 1);
    }

    #[test]
    fn zero_sum_triplet_reports_its_position() {
        let err = normalize_triplets(&rr(&[1.0, 1.0, 1.0, 0.0, 0.0, 0.0])).unwrap_err();
        assert!(matches!(err, SimplexError::ZeroSumTriplet { index: 1 }));
    }

    #[test]
    fn negative_interval_is_rejected() {
        let err = normalize_triplets(&rr(&[1.0, -1.0, 1.0])).unwrap_err();
        assert!(matches!(err, SimplexError::NegativeInterval { index: 1, .. }));
    }

    #[test]
    fn non_finite_intervals_are_rejected() {
        let parsed =
            crate::io::text::parse_rr_series("NaN\n1.0\n1.0\ninf\n1.0\n1.0\n").unwrap();
        let err = normalize_triplets(&parsed).unwrap_err();
        assert!(matches!(err, SimplexError::NonFiniteInterval { index: 0, .. }));
        assert!(err.is_client_error());

        let err = normalize_triplets(&rr(&[1.0, 1.0, 1.0, f64::INFINITY, 1.0, 1.0])).unwrap_err();
        assert!(matches!(err, SimplexError::NonFiniteInterval { index: 3, .. }));

        // a trailing NaN beyond the last full triplet is simply discarded
        let out = normalize_triplets(&rr(&[1.0, 2.0, 1.0, f64::NAN])).unwrap();
        assert_eq!(out.points.len(), 1);
        assert!((out.points[0].sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn overflowing_sum_is_not_a_simplex_point() {
        assert!(SimplexPoint::from_triplet([f64::MAX, f64::MAX, 1.0]).is_none());
    }

    #[test]
    fn simplex_point_serializes_as_array() {
        let p = SimplexPoint([0.25, 0.5, 0.25]);
        assert_eq!(serde_json::to_string(&p).unwrap(), "[0.25,0.5,0.25]");
    }
}
