//! Read-only client for the movie catalog (TMDB v3)

use reqwest::Client;

use crate::models::favorites::{poster_url, Favorite};
use crate::models::movies::MovieDetails;

pub const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/3";
pub const DEFAULT_IMAGE_BASE: &str = "https://image.tmdb.org/t/p";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug)]
pub enum CatalogError {
    /// Network-level failure
    Request(String),
    /// Non-success status from the catalog
    Status { status: u16, message: String },
    /// Body did not decode as movie details
    Parse(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Request(msg) => write!(f, "Catalog request failed: {}", msg),
            CatalogError::Status { status, message } => {
                write!(f, "Catalog error ({}): {}", status, message)
            }
            CatalogError::Parse(msg) => write!(f, "Failed to parse catalog response: {}", msg),
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<CatalogError> for String {
    fn from(e: CatalogError) -> Self {
        e.to_string()
    }
}

// ============================================================================
// Client
// ============================================================================

pub struct CatalogClient {
    client: Client,
    base_url: String,
    image_base: String,
    api_key: String,
}

impl CatalogClient {
    pub fn new(base_url: &str, image_base: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            image_base: image_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn image_base(&self) -> &str {
        &self.image_base
    }

    pub fn movie_url(&self, movie_id: i64) -> String {
        format!("{}/movie/{}", self.base_url, movie_id)
    }

    pub async fn fetch_movie(&self, movie_id: i64) -> Result<MovieDetails, CatalogError> {
        let response = self
            .client
            .get(self.movie_url(movie_id))
            .query(&[("api_key", self.api_key.as_str()), ("language", "en-US")])
            .send()
            .await
            .map_err(|e| CatalogError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CatalogError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(CatalogError::Status {
                status: status.as_u16(),
                message: status_message(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| CatalogError::Parse(e.to_string()))
    }

    pub fn poster_url(&self, poster_path: Option<&str>) -> String {
        poster_url(&self.image_base, poster_path)
    }

    pub fn favorite_for(&self, movie: &MovieDetails) -> Favorite {
        Favorite::from_movie(movie, &self.image_base)
    }
}

/// TMDB reports errors as `{"status_code": .., "status_message": ".."}`
fn status_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("status_message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIGHT_CLUB: &str = r#"{
        "adult": false,
        "id": 550,
        "title": "Fight Club",
        "overview": "A ticking-time-bomb insomniac...",
        "poster_path": "/pB8BM7pdSp6B6Ih7QZ4DrQ3PmJK.jpg",
        "release_date": "1999-10-15",
        "runtime": 139,
        "genres": [{"id": 18, "name": "Drama"}],
        "vote_average": 8.4,
        "vote_count": 26280,
        "tagline": "Mischief. Mayhem. Soap."
    }"#;

    #[test]
    fn decodes_movie_details() {
        let movie: MovieDetails = serde_json::from_str(FIGHT_CLUB).unwrap();
        assert_eq!(movie.id, 550);
        assert_eq!(movie.runtime, Some(139));
        assert_eq!(movie.genres[0].name, "Drama");
        assert_eq!(movie.release_year(), Some("1999"));
    }

    #[test]
    fn favorite_snapshot_uses_the_w500_poster() {
        let client = CatalogClient::new(DEFAULT_BASE_URL, "https://image.tmdb.org/t/p/", "key");
        let movie: MovieDetails = serde_json::from_str(FIGHT_CLUB).unwrap();
        let favorite = client.favorite_for(&movie);
        assert_eq!(
            favorite.poster,
            "https://image.tmdb.org/t/p/w500/pB8BM7pdSp6B6Ih7QZ4DrQ3PmJK.jpg"
        );
        assert_eq!(favorite.release_date.as_deref(), Some("1999-10-15"));
        assert_eq!(client.movie_url(550), "https://api.themoviedb.org/3/movie/550");
    }

    #[test]
    fn status_message_prefers_the_catalog_text() {
        let body = r#"{"status_code":34,"status_message":"The resource you requested could not be found."}"#;
        assert_eq!(
            status_message(body),
            "The resource you requested could not be found."
        );
        assert_eq!(status_message("Bad Gateway"), "Bad Gateway");
    }
}
