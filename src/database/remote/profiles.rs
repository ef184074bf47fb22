// Remote read operations for profiles table

use super::common::{Query, RemoteError, SupabaseClient};
use crate::models::profiles::Profile;

pub const TABLE: &str = "profiles";
const COLUMNS: &str = "id,full_name,email";

pub async fn fetch_profile(
    client: &SupabaseClient,
    user_id: &str,
    access_token: Option<&str>,
) -> Result<Option<Profile>, RemoteError> {
    let query = Query::new().select(COLUMNS).eq("id", user_id);
    client.select_single(TABLE, &query, access_token).await
}

/// Fetch several profiles in one request
pub async fn fetch_profiles(
    client: &SupabaseClient,
    user_ids: &[String],
    access_token: Option<&str>,
) -> Result<Vec<Profile>, RemoteError> {
    if user_ids.is_empty() {
        return Ok(Vec::new());
    }
    let query = Query::new().select(COLUMNS).in_list("id", user_ids);
    client.select(TABLE, &query, access_token).await
}
