use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::movies::MovieDetails;

/// Locally bookmarked movie.
///
/// This is a snapshot taken when the movie was favorited, not a live
/// reference into the catalog. Field names match the stored JSON layout.
#[derive(TS, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[ts(export, export_to = "../web/src/bindings/favorites.ts")]
pub struct Favorite {
    #[ts(type = "number")]
    pub id: i64,
    pub title: String,
    pub poster: String,
    #[serde(default)]
    pub release_date: Option<String>,
}

impl Favorite {
    /// Build a favorite snapshot from catalog details
    pub fn from_movie(movie: &MovieDetails, image_base: &str) -> Self {
        Self {
            id: movie.id,
            title: movie.title.clone(),
            poster: poster_url(image_base, movie.poster_path.as_deref()),
            release_date: movie.release_date.clone(),
        }
    }
}

/// Full poster URL at the w500 size the detail and favorites views use
pub fn poster_url(image_base: &str, poster_path: Option<&str>) -> String {
    format!(
        "{}/w500{}",
        image_base.trim_end_matches('/'),
        poster_path.unwrap_or_default()
    )
}
