//! User reputation record attached to orders and peers.

use serde::{Deserialize, Serialize};

/// Aggregate rating for a trading peer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Rating {
    pub total_reviews: u64,
    pub total_rating: f64,
    pub last_rating: u8,
    pub max_rate: u8,
    pub min_rate: u8,
}

impl Rating {
    /// Average over all reviews; 0 when there are none.
    pub fn average(&self) -> f64 {
        if self.total_reviews == 0 {
            0.0
        } else {
            self.total_rating / self.total_reviews as f64
        }
    }

    /// Check the record's internal invariants.
    pub fn is_consistent(&self) -> bool {
        self.min_rate <= self.max_rate
            && self.min_rate <= self.last_rating
            && self.last_rating <= self.max_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_with_no_reviews_is_zero() {
        assert_eq!(Rating::default().average(), 0.0);
    }

    #[test]
    fn average_is_total_over_reviews() {
        let rating = Rating {
            total_reviews: 4,
            total_rating: 18.0,
            last_rating: 5,
            max_rate: 5,
            min_rate: 1,
        };
        assert!((rating.average() - 4.5).abs() < f64::EPSILON);
        assert!(rating.is_consistent());
    }

    #[test]
    fn inconsistent_bounds_detected() {
        let rating = Rating {
            total_reviews: 1,
            total_rating: 5.0,
            last_rating: 7,
            max_rate: 5,
            min_rate: 1,
        };
        assert!(!rating.is_consistent());
    }

    #[test]
    fn serde_round_trip() {
        let rating = Rating {
            total_reviews: 2,
            total_rating: 9.0,
            last_rating: 4,
            max_rate: 5,
            min_rate: 4,
        };
        let json = serde_json::to_string(&rating).unwrap();
        assert_eq!(serde_json::from_str::<Rating>(&json).unwrap(), rating);
    }
}
