// Remote CRUD operations for comments table

use super::common::{Query, RemoteError, SupabaseClient};
use crate::models::comments::Comment;
use serde::{Deserialize, Serialize};

pub const TABLE: &str = "comments";

/// Row layout of the comments table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommentRow {
    pub id: i64,
    pub movie_id: i64,
    pub user_id: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Comment {
            id: row.id,
            movie_id: row.movie_id,
            user_id: row.user_id,
            content: row.content,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<&Comment> for CommentRow {
    fn from(c: &Comment) -> Self {
        CommentRow {
            id: c.id,
            movie_id: c.movie_id,
            user_id: c.user_id.clone(),
            content: c.content.clone(),
            created_at: c.created_at.clone(),
            updated_at: c.updated_at.clone(),
        }
    }
}

/// Payload for inserting a comment. Timestamps are filled in by the
/// table defaults.
#[derive(Serialize)]
struct NewCommentPayload<'a> {
    movie_id: i64,
    user_id: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct CommentUpdatePayload<'a> {
    content: &'a str,
    updated_at: &'a str,
}

/// Fetch comments for a movie, newest first
pub async fn fetch_comments(
    client: &SupabaseClient,
    movie_id: i64,
    access_token: Option<&str>,
) -> Result<Vec<Comment>, RemoteError> {
    let query = Query::new()
        .select("*")
        .eq("movie_id", movie_id)
        .order_desc("created_at");
    let rows: Vec<CommentRow> = client.select(TABLE, &query, access_token).await?;
    Ok(rows.into_iter().map(Comment::from).collect())
}

pub async fn insert_comment(
    client: &SupabaseClient,
    movie_id: i64,
    user_id: &str,
    content: &str,
    access_token: Option<&str>,
) -> Result<Comment, RemoteError> {
    let payload = NewCommentPayload {
        movie_id,
        user_id,
        content,
    };
    let row: CommentRow = client.insert(TABLE, &payload, access_token).await?;
    Ok(row.into())
}

/// Update comment content. Row-level security limits this to the author;
/// a filtered-out row comes back as `None`.
pub async fn update_comment(
    client: &SupabaseClient,
    id: i64,
    content: &str,
    access_token: Option<&str>,
) -> Result<Option<Comment>, RemoteError> {
    let now = chrono::Utc::now().to_rfc3339();
    let payload = CommentUpdatePayload {
        content,
        updated_at: &now,
    };
    let row: Option<CommentRow> = client
        .update(TABLE, &Query::new().eq("id", id), &payload, access_token)
        .await?;
    Ok(row.map(Comment::from))
}

pub async fn delete_comment(
    client: &SupabaseClient,
    id: i64,
    access_token: Option<&str>,
) -> Result<(), RemoteError> {
    client
        .delete(TABLE, &Query::new().eq("id", id), access_token)
        .await
}
