// Shared types and utilities for remote Supabase operations

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// PostgREST code for "JSON object requested, multiple (or no) rows returned"
pub const NO_ROWS_CODE: &str = "PGRST116";

/// Error type for Supabase operations
#[derive(Debug)]
pub enum RemoteError {
    /// HTTP request failed
    RequestFailed(String),
    /// Supabase API returned an error
    ApiError {
        status: u16,
        code: Option<String>,
        message: String,
    },
    /// Failed to parse response
    ParseError(String),
    /// Missing required field
    MissingField(String),
}

impl RemoteError {
    /// True for the PostgREST "no rows" error, which callers treat as an
    /// empty result rather than a failure
    pub fn is_no_rows(&self) -> bool {
        matches!(self, RemoteError::ApiError { code: Some(code), .. } if code == NO_ROWS_CODE)
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::RequestFailed(msg) => write!(f, "Request failed: {}", msg),
            RemoteError::ApiError { message, .. } => write!(f, "{}", message),
            RemoteError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            RemoteError::MissingField(field) => write!(f, "Missing required field: {}", field),
        }
    }
}

impl std::error::Error for RemoteError {}

impl From<RemoteError> for String {
    fn from(e: RemoteError) -> Self {
        e.to_string()
    }
}

/// Error body shape shared by PostgREST and GoTrue
#[derive(Debug, Deserialize, Default)]
struct ErrorBody {
    code: Option<serde_json::Value>,
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

/// Turn a non-success response body into a [`RemoteError::ApiError`]
pub fn api_error(status: u16, body: &str) -> RemoteError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed.code.map(|c| match c {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    });
    let message = parsed
        .message
        .or(parsed.msg)
        .or(parsed.error_description)
        .or(parsed.error)
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("Supabase API error {}", status)
            } else {
                body.to_string()
            }
        });
    RemoteError::ApiError {
        status,
        code,
        message,
    }
}

/// PostgREST query string builder
#[derive(Debug, Clone, Default)]
pub struct Query {
    params: Vec<(String, String)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.params.push(("select".to_string(), columns.to_string()));
        self
    }

    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.params
            .push((column.to_string(), format!("eq.{}", value.to_string())));
        self
    }

    pub fn in_list(mut self, column: &str, values: &[String]) -> Self {
        self.params
            .push((column.to_string(), format!("in.({})", values.join(","))));
        self
    }

    pub fn order_desc(mut self, column: &str) -> Self {
        self.params
            .push(("order".to_string(), format!("{}.desc", column)));
        self
    }

    pub fn on_conflict(mut self, columns: &str) -> Self {
        self.params
            .push(("on_conflict".to_string(), columns.to_string()));
        self
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

/// Supabase client configuration
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    /// Create a new Supabase client
    pub fn new(base_url: String, anon_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    pub(crate) fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    /// Attach the project key and bearer token. Anonymous callers use the
    /// anon key as the bearer, which PostgREST maps to the `anon` role.
    fn authorize(&self, builder: RequestBuilder, access_token: Option<&str>) -> RequestBuilder {
        builder
            .header("apikey", &self.anon_key)
            .header(
                "Authorization",
                format!("Bearer {}", access_token.unwrap_or(&self.anon_key)),
            )
    }

    pub(crate) fn public_post(&self, url: &str) -> RequestBuilder {
        self.client
            .post(url)
            .header("apikey", &self.anon_key)
            .header("Content-Type", "application/json")
    }

    /// Select all rows matching the query
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &Query,
        access_token: Option<&str>,
    ) -> Result<Vec<T>, RemoteError> {
        let req = self
            .authorize(self.client.get(self.rest_url(table)), access_token)
            .query(query.params());
        let res = send(req).await?;
        parse_json(res).await
    }

    /// Select exactly one row. No matching row is `Ok(None)`.
    pub async fn select_single<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &Query,
        access_token: Option<&str>,
    ) -> Result<Option<T>, RemoteError> {
        let req = self
            .authorize(self.client.get(self.rest_url(table)), access_token)
            .header("Accept", "application/vnd.pgrst.object+json")
            .query(query.params());
        match send(req).await {
            Ok(res) => parse_json(res).await.map(Some),
            Err(e) if e.is_no_rows() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Insert a new record and return the stored row
    pub async fn insert<P: Serialize, T: DeserializeOwned>(
        &self,
        table: &str,
        payload: &P,
        access_token: Option<&str>,
    ) -> Result<T, RemoteError> {
        let req = self
            .authorize(self.client.post(self.rest_url(table)), access_token)
            .query(&[("select", "*")])
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation")
            .json(payload);
        let res = send(req).await?;
        single_row(parse_json(res).await?, "insert")
    }

    /// Insert, or merge into the row that collides on `on_conflict`
    pub async fn upsert<P: Serialize, T: DeserializeOwned>(
        &self,
        table: &str,
        on_conflict: &str,
        payload: &P,
        access_token: Option<&str>,
    ) -> Result<T, RemoteError> {
        let query = Query::new().on_conflict(on_conflict).select("*");
        let req = self
            .authorize(self.client.post(self.rest_url(table)), access_token)
            .query(query.params())
            .header("Content-Type", "application/json")
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(payload);
        let res = send(req).await?;
        single_row(parse_json(res).await?, "upsert")
    }

    /// Update matching records and return the first updated row, if any
    pub async fn update<P: Serialize, T: DeserializeOwned>(
        &self,
        table: &str,
        query: &Query,
        payload: &P,
        access_token: Option<&str>,
    ) -> Result<Option<T>, RemoteError> {
        let req = self
            .authorize(self.client.patch(self.rest_url(table)), access_token)
            .query(query.params())
            .query(&[("select", "*")])
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation")
            .json(payload);
        let res = send(req).await?;
        let mut rows: Vec<T> = parse_json(res).await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    /// Delete matching records
    pub async fn delete(
        &self,
        table: &str,
        query: &Query,
        access_token: Option<&str>,
    ) -> Result<(), RemoteError> {
        let req = self
            .authorize(self.client.delete(self.rest_url(table)), access_token)
            .query(query.params());
        send(req).await?;
        Ok(())
    }
}

pub(crate) async fn send(req: RequestBuilder) -> Result<Response, RemoteError> {
    let res = req
        .send()
        .await
        .map_err(|e| RemoteError::RequestFailed(e.to_string()))?;

    if !res.status().is_success() {
        let status = res.status().as_u16();
        let text = res.text().await.unwrap_or_default();
        return Err(api_error(status, &text));
    }
    Ok(res)
}

pub(crate) async fn parse_json<T: DeserializeOwned>(res: Response) -> Result<T, RemoteError> {
    let body = res
        .text()
        .await
        .map_err(|e| RemoteError::ParseError(e.to_string()))?;
    serde_json::from_str(&body)
        .map_err(|e| RemoteError::ParseError(format!("Failed to parse response: {}", e)))
}

fn single_row<T>(mut rows: Vec<T>, op: &str) -> Result<T, RemoteError> {
    // Response is an array with one element
    rows.pop()
        .ok_or_else(|| RemoteError::ParseError(format!("No row returned from {}", op)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_rows_error_is_recognized() {
        let body = r#"{"code":"PGRST116","details":"The result contains 0 rows","hint":null,"message":"JSON object requested, multiple (or no) rows returned"}"#;
        let err = api_error(406, body);
        assert!(err.is_no_rows());
        assert_eq!(
            err.to_string(),
            "JSON object requested, multiple (or no) rows returned"
        );
    }

    #[test]
    fn auth_errors_use_their_description() {
        let body = r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#;
        let err = api_error(400, body);
        assert!(!err.is_no_rows());
        assert_eq!(err.to_string(), "Invalid login credentials");
    }

    #[test]
    fn numeric_codes_and_empty_bodies() {
        let err = api_error(422, r#"{"code":422,"msg":"User already registered"}"#);
        match &err {
            RemoteError::ApiError { code, .. } => assert_eq!(code.as_deref(), Some("422")),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(err.to_string(), "User already registered");
        assert_eq!(api_error(500, "").to_string(), "Supabase API error 500");
    }

    #[test]
    fn query_builds_postgrest_filters() {
        let q = Query::new()
            .select("*")
            .eq("movie_id", 550)
            .order_desc("created_at")
            .in_list("id", &["a".to_string(), "b".to_string()]);
        assert_eq!(
            q.params(),
            &[
                ("select".to_string(), "*".to_string()),
                ("movie_id".to_string(), "eq.550".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
                ("id".to_string(), "in.(a,b)".to_string()),
            ]
        );
    }
}
