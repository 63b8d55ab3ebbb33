//! Client seams: table access and authentication.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::query::Query;

/// Row-level access to BaaS tables.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Rows matching `query`.
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>>;

    /// Insert rows and return them as stored.
    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>>;

    /// Insert or replace the row identified by the `on_conflict` columns.
    async fn upsert(&self, table: &str, row: Value, on_conflict: &[&str]) -> Result<Value>;

    /// Merge `patch` into every matching row and return the updated rows.
    async fn update(&self, table: &str, query: &Query, patch: Value) -> Result<Vec<Value>>;

    /// Delete matching rows and return them.
    async fn delete(&self, table: &str, query: &Query) -> Result<Vec<Value>>;

    /// Number of matching rows.
    async fn count(&self, table: &str, query: &Query) -> Result<u64>;

    /// Call a stored procedure.
    async fn rpc(&self, function: &str, args: Value) -> Result<Value>;

    /// A view of this store that acts with the given user's access token,
    /// so row-level security policies apply.
    fn as_user(&self, access_token: &str) -> Arc<dyn TableStore>;

    /// Project this store talks to.
    fn endpoint(&self) -> &str {
        "memory://local"
    }
}

/// Decode JSON rows into typed rows.
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(Error::from))
        .collect()
}

/// Decode the first row, failing with `NotFound` when there is none.
pub fn decode_first<T: DeserializeOwned>(rows: Vec<Value>, what: &str) -> Result<T> {
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| Error::NotFound(what.to_string()))?;
    Ok(serde_json::from_value(row)?)
}

/// Encode a typed row.
pub fn encode_row<T: Serialize>(row: &T) -> Result<Value> {
    Ok(serde_json::to_value(row)?)
}

/// Typed select.
pub async fn fetch<T: DeserializeOwned>(
    store: &dyn TableStore,
    table: &str,
    query: &Query,
) -> Result<Vec<T>> {
    decode_rows(store.select(table, query).await?)
}

/// Typed single-row insert.
pub async fn insert_one<T>(store: &dyn TableStore, table: &str, row: &T) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let stored = store.insert(table, vec![encode_row(row)?]).await?;
    decode_first(stored, table)
}

/// Authenticated user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Server-controlled role (`admin`, `member`, ...).
    #[serde(default = "default_role")]
    pub role: String,
    /// User-editable metadata.
    #[serde(default)]
    pub metadata: Value,
}

fn default_role() -> String {
    "member".to_string()
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Tokens issued on sign-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub user: User,
}

/// Result of a sign-up: a session is only present when the account needs no
/// email confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignUp {
    pub user: User,
    pub session: Option<Session>,
}

/// Email/password pair.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Fields a user may change on their own account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Account operations of the BaaS auth service.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session>;

    async fn sign_up(&self, credentials: &Credentials, metadata: Value) -> Result<SignUp>;

    /// Send a password-reset email. Succeeds whether or not the address exists.
    async fn reset_password(&self, email: &str, redirect_to: Option<&str>) -> Result<()>;

    async fn update_user(&self, access_token: &str, update: &UserUpdate) -> Result<User>;

    /// Resolve an access token to its user.
    async fn get_user(&self, access_token: &str) -> Result<User>;
}
