//! Congestion state classification.
//!
//! Single source of truth for the saturation thresholds, so the scorer's
//! mercy logic and the allocation engine's lane-compatibility lookup always
//! speak the same language.

use greenwave_protocol::CongestionState;

/// Saturation above this fraction is high congestion ("be strict").
const SAFE_THRESHOLD: f64 = 0.50;
/// Saturation above this fraction is moderate congestion.
const LESS_CONGESTION_THRESHOLD: f64 = 0.20;

/// Classify a saturation fraction (0.0–1.0) into a congestion state.
///
/// Boundaries are exclusive on the low side: exactly 0.50 is still
/// `LessCongestion`, exactly 0.20 is still `MoreLesserCongestion`.
pub fn classify(saturation: f64) -> CongestionState {
    if saturation > SAFE_THRESHOLD {
        CongestionState::Safe
    } else if saturation > LESS_CONGESTION_THRESHOLD {
        CongestionState::LessCongestion
    } else {
        CongestionState::MoreLesserCongestion
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn boundaries_fall_into_lower_bucket() {
        assert_eq!(classify(0.51), CongestionState::Safe);
        assert_eq!(classify(0.50), CongestionState::LessCongestion);
        assert_eq!(classify(0.21), CongestionState::LessCongestion);
        assert_eq!(classify(0.20), CongestionState::MoreLesserCongestion);
        assert_eq!(classify(0.0), CongestionState::MoreLesserCongestion);
    }

    #[test]
    fn extremes() {
        assert_eq!(classify(1.0), CongestionState::Safe);
        assert_eq!(classify(-0.1), CongestionState::MoreLesserCongestion);
    }
}
