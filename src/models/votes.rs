use serde::{Deserialize, Serialize};
use ts_rs::TS;

pub const MIN_RATING: f64 = 0.5;
pub const MAX_RATING: f64 = 5.0;

/// A user's rating of a movie. One per (movie, user).
#[derive(TS, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../web/src/bindings/votes.ts")]
#[ts(rename_all = "camelCase")]
pub struct Vote {
    #[ts(type = "number")]
    pub id: i64,
    #[ts(type = "number")]
    pub movie_id: i64,
    pub user_id: String,
    pub rating: f64,
    pub created_at: String,
    pub updated_at: String,
}

/// Returns an error message unless `value` is a half step in 0.5..=5.0
pub fn validate_rating(value: f64) -> Result<(), String> {
    if !value.is_finite() || !(MIN_RATING..=MAX_RATING).contains(&value) {
        return Err(format!(
            "Rating must be between {} and {}",
            MIN_RATING, MAX_RATING
        ));
    }
    if (value * 2.0).fract() != 0.0 {
        return Err("Rating must be a multiple of 0.5".to_string());
    }
    Ok(())
}

/// Community rating for a movie, computed client-side
#[derive(TS, Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../web/src/bindings/votes.ts")]
#[ts(rename_all = "camelCase")]
pub struct RatingSummary {
    pub average: Option<f64>,
    pub total: usize,
}

impl RatingSummary {
    pub fn from_ratings(ratings: &[f64]) -> Self {
        if ratings.is_empty() {
            return Self::default();
        }
        let sum: f64 = ratings.iter().sum();
        Self {
            average: Some(sum / ratings.len() as f64),
            total: ratings.len(),
        }
    }
}
