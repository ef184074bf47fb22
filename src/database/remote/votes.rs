// Remote CRUD operations for votes table

use super::common::{Query, RemoteError, SupabaseClient};
use crate::models::votes::Vote;
use serde::{Deserialize, Serialize};

pub const TABLE: &str = "votes";

/// Conflict target of the vote upsert: one vote per user per movie
pub const VOTE_KEY: &str = "movie_id,user_id";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoteRow {
    pub id: i64,
    pub movie_id: i64,
    pub user_id: String,
    pub rating: f64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<VoteRow> for Vote {
    fn from(row: VoteRow) -> Self {
        Vote {
            id: row.id,
            movie_id: row.movie_id,
            user_id: row.user_id,
            rating: row.rating,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<&Vote> for VoteRow {
    fn from(v: &Vote) -> Self {
        VoteRow {
            id: v.id,
            movie_id: v.movie_id,
            user_id: v.user_id.clone(),
            rating: v.rating,
            created_at: v.created_at.clone(),
            updated_at: v.updated_at.clone(),
        }
    }
}

#[derive(Serialize)]
struct VotePayload<'a> {
    movie_id: i64,
    user_id: &'a str,
    rating: f64,
    updated_at: &'a str,
}

/// Fetch the user's vote for a movie. PostgREST's "no rows" answer is
/// mapped to `None` by `select_single`.
pub async fn fetch_vote(
    client: &SupabaseClient,
    movie_id: i64,
    user_id: &str,
    access_token: Option<&str>,
) -> Result<Option<Vote>, RemoteError> {
    let query = Query::new()
        .select("*")
        .eq("movie_id", movie_id)
        .eq("user_id", user_id);
    let row: Option<VoteRow> = client.select_single(TABLE, &query, access_token).await?;
    Ok(row.map(Vote::from))
}

pub async fn fetch_votes(
    client: &SupabaseClient,
    movie_id: i64,
    access_token: Option<&str>,
) -> Result<Vec<Vote>, RemoteError> {
    let query = Query::new().select("*").eq("movie_id", movie_id);
    let rows: Vec<VoteRow> = client.select(TABLE, &query, access_token).await?;
    Ok(rows.into_iter().map(Vote::from).collect())
}

/// Insert or update the vote for (movie, user) in a single request
pub async fn upsert_vote(
    client: &SupabaseClient,
    movie_id: i64,
    user_id: &str,
    rating: f64,
    access_token: Option<&str>,
) -> Result<Vote, RemoteError> {
    let now = chrono::Utc::now().to_rfc3339();
    let payload = VotePayload {
        movie_id,
        user_id,
        rating,
        updated_at: &now,
    };
    let row: VoteRow = client
        .upsert(TABLE, VOTE_KEY, &payload, access_token)
        .await?;
    Ok(row.into())
}

pub async fn delete_vote(
    client: &SupabaseClient,
    id: i64,
    access_token: Option<&str>,
) -> Result<(), RemoteError> {
    client
        .delete(TABLE, &Query::new().eq("id", id), access_token)
        .await
}
