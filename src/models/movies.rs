use serde::{Deserialize, Serialize};
use ts_rs::TS;

#[derive(TS, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[ts(export, export_to = "../web/src/bindings/movies.ts")]
pub struct Genre {
    #[ts(type = "number")]
    pub id: i64,
    pub name: String,
}

/// Movie details as returned by the catalog's `movie/{id}` endpoint.
///
/// Only the fields the client renders are kept; everything else in the
/// catalog payload is ignored on deserialization.
#[derive(TS, Serialize, Deserialize, Clone, Debug)]
#[ts(export, export_to = "../web/src/bindings/movies.ts")]
pub struct MovieDetails {
    #[ts(type = "number")]
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub overview: String,
    pub poster_path: Option<String>,
    pub release_date: Option<String>,
    #[ts(type = "number | null")]
    pub runtime: Option<i64>,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    #[ts(type = "number")]
    pub vote_count: i64,
}

impl MovieDetails {
    /// Four-digit release year, if the catalog knows the release date
    pub fn release_year(&self) -> Option<&str> {
        self.release_date
            .as_deref()
            .and_then(|d| d.get(..4))
            .filter(|year| year.bytes().all(|b| b.is_ascii_digit()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn released(date: Option<&str>) -> MovieDetails {
        serde_json::from_value(serde_json::json!({
            "id": 603,
            "title": "The Matrix",
            "poster_path": null,
            "release_date": date,
            "runtime": 136
        }))
        .unwrap()
    }

    #[test]
    fn year_is_the_leading_four_digits() {
        assert_eq!(released(Some("1999-03-30")).release_year(), Some("1999"));
        assert_eq!(released(Some("1999")).release_year(), Some("1999"));
    }

    #[test]
    fn unusable_dates_have_no_year() {
        assert_eq!(released(None).release_year(), None);
        assert_eq!(released(Some("")).release_year(), None);
        assert_eq!(released(Some("199")).release_year(), None);
        // Multi-byte characters inside the first four bytes.
        assert_eq!(released(Some("19é9-01-01")).release_year(), None);
        assert_eq!(released(Some("年1999")).release_year(), None);
        assert_eq!(released(Some("TBA-soon")).release_year(), None);
    }
}
