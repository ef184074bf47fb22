use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Maximum comment length accepted by the comment form
pub const MAX_COMMENT_LENGTH: usize = 500;

/// A comment row as stored in the backend
#[derive(TS, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../web/src/bindings/comments.ts")]
#[ts(rename_all = "camelCase")]
pub struct Comment {
    #[ts(type = "number")]
    pub id: i64,
    #[ts(type = "number")]
    pub movie_id: i64,
    pub user_id: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Author display fields resolved from the profiles table
#[derive(TS, Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../web/src/bindings/comments.ts")]
#[ts(rename_all = "camelCase")]
pub struct CommentAuthor {
    pub email: Option<String>,
    pub full_name: Option<String>,
}

/// Comment enriched with its author's display fields
#[derive(TS, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../web/src/bindings/comments.ts")]
#[ts(rename_all = "camelCase")]
pub struct CommentWithAuthor {
    #[serde(flatten)]
    #[ts(flatten)]
    pub comment: Comment,
    pub author: Option<CommentAuthor>,
}

impl CommentWithAuthor {
    pub fn id(&self) -> i64 {
        self.comment.id
    }

    /// Name shown next to the comment: full name, then the email's local
    /// part, then a generic placeholder.
    pub fn display_name(&self) -> String {
        let author = self.author.as_ref();
        if let Some(name) = author
            .and_then(|a| a.full_name.as_deref())
            .filter(|n| !n.trim().is_empty())
        {
            return name.to_string();
        }
        if let Some(local) = author
            .and_then(|a| a.email.as_deref())
            .and_then(|e| e.split('@').next())
            .filter(|l| !l.is_empty())
        {
            return local.to_string();
        }
        "Anonymous User".to_string()
    }

    pub fn is_authored_by(&self, user_id: &str) -> bool {
        self.comment.user_id == user_id
    }
}

/// What a comment list view renders
#[derive(TS, Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../web/src/bindings/comments.ts")]
#[ts(rename_all = "camelCase")]
pub struct CommentsView {
    #[ts(type = "number")]
    pub movie_id: i64,
    pub comments: Vec<CommentWithAuthor>,
    pub loading: bool,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(author: Option<CommentAuthor>) -> CommentWithAuthor {
        CommentWithAuthor {
            comment: Comment {
                id: 1,
                movie_id: 550,
                user_id: "u-1".to_string(),
                content: "Great pacing".to_string(),
                created_at: "2024-05-01T10:00:00+00:00".to_string(),
                updated_at: "2024-05-01T10:00:00+00:00".to_string(),
            },
            author,
        }
    }

    #[test]
    fn display_name_prefers_full_name() {
        let c = comment(Some(CommentAuthor {
            email: Some("ada@example.com".to_string()),
            full_name: Some("Ada Lovelace".to_string()),
        }));
        assert_eq!(c.display_name(), "Ada Lovelace");
    }

    #[test]
    fn display_name_falls_back_to_email_then_placeholder() {
        let c = comment(Some(CommentAuthor {
            email: Some("ada@example.com".to_string()),
            full_name: None,
        }));
        assert_eq!(c.display_name(), "ada");
        assert_eq!(comment(None).display_name(), "Anonymous User");
    }

    #[test]
    fn serializes_flat_for_the_front_end() {
        let value = serde_json::to_value(comment(None)).unwrap();
        assert_eq!(value["movieId"], 550);
        assert_eq!(value["content"], "Great pacing");
        assert!(value["author"].is_null());
    }
}
