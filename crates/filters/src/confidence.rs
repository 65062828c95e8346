use scanalign_core::PointSet;
use serde::{Deserialize, Serialize};

/// Coarse confidence classes reported by depth sensors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl ConfidenceLevel {
    /// Minimum per-point confidence admitted at this level.
    pub fn threshold(self) -> f32 {
        match self {
            ConfidenceLevel::Low => 0.0,
            ConfidenceLevel::Medium => 0.5,
            ConfidenceLevel::High => 1.0,
        }
    }
}

/// Keep points whose confidence is at least `min_confidence`.
///
/// Sets without confidence values pass through unchanged. A NaN confidence
/// is treated as zero.
pub fn confidence_filter(set: &PointSet, min_confidence: f32) -> PointSet {
    let Some(confidence) = set.confidence.as_ref() else {
        return set.clone();
    };

    let keep: Vec<usize> = confidence
        .iter()
        .enumerate()
        .filter(|(_, c)| {
            let c = if c.is_nan() { 0.0 } else { **c };
            c >= min_confidence
        })
        .map(|(i, _)| i)
        .collect();

    set.select(&keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scored() -> PointSet {
        PointSet::from_xyz(vec![0.0, 1.0, 2.0, 3.0], vec![0.0; 4], vec![0.0; 4])
            .with_confidence(vec![0.0, 0.5, 1.0, f32::NAN])
    }

    #[test]
    fn medium_drops_low_and_nan() {
        let out = confidence_filter(&scored(), ConfidenceLevel::Medium.threshold());
        assert_eq!(out.x, vec![1.0, 2.0]);
    }

    #[test]
    fn low_keeps_everything_but_nan_still_counts_as_zero() {
        let out = confidence_filter(&scored(), ConfidenceLevel::Low.threshold());
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn high_keeps_only_full_confidence() {
        let out = confidence_filter(&scored(), ConfidenceLevel::High.threshold());
        assert_eq!(out.x, vec![2.0]);
    }

    #[test]
    fn missing_confidence_passes() {
        let set = PointSet::from_xyz(vec![1.0], vec![2.0], vec![3.0]);
        assert_eq!(confidence_filter(&set, 0.9).len(), 1);
    }

    proptest! {
        #[test]
        fn survivors_meet_threshold(
            conf in prop::collection::vec(0.0f32..1.0, 0..200),
            threshold in 0.0f32..1.0,
        ) {
            let n = conf.len();
            let set = PointSet::from_xyz(vec![0.0; n], vec![0.0; n], vec![0.0; n])
                .with_confidence(conf);
            let out = confidence_filter(&set, threshold);
            prop_assert!(out.len() <= n);
            for c in out.confidence.unwrap_or_default() {
                prop_assert!(c >= threshold);
            }
        }
    }
}
