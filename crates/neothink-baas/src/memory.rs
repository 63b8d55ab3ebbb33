//! In-process BaaS for local development and tests.
//!
//! Tables are JSON rows behind a `DashMap`; each table operation holds that
//! table's shard lock, so single calls are atomic. Row-level security is not
//! emulated.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::RngCore;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::query::{Query, compare};
use crate::store::{
    AuthProvider, Credentials, Session, SignUp, TableStore, User, UserUpdate,
};

/// Name of the atomic rate-limit procedure.
pub const INCREMENT_RATE_LIMIT: &str = "increment_rate_limit";

/// Postgres definition of [`INCREMENT_RATE_LIMIT`] and its table. Hosted
/// projects need it deployed before using the BaaS rate-limit backend.
pub const INCREMENT_RATE_LIMIT_SQL: &str = include_str!("../sql/increment_rate_limit.sql");

#[derive(Debug, Clone)]
struct MemoryUser {
    user: User,
    password_hash: String,
}

#[derive(Default)]
struct Inner {
    tables: DashMap<String, Vec<Value>>,
    users: DashMap<String, MemoryUser>,
    sessions: DashMap<String, String>,
    reset_requests: DashMap<String, u32>,
}

/// Shared in-memory backend. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryBaas {
    inner: Arc<Inner>,
}

fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn merge(target: &mut Value, patch: &Value) {
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
    }
}

fn same_key(a: &Value, b: &Value, columns: &[&str]) -> bool {
    columns.iter().all(|c| {
        let left = a.get(*c).unwrap_or(&Value::Null);
        let right = b.get(*c).unwrap_or(&Value::Null);
        compare(left, right) == Some(std::cmp::Ordering::Equal)
    })
}

impl MemoryBaas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a confirmed account directly. Used to seed admins and fixtures.
    pub fn seed_user(&self, email: &str, password: &str, role: &str) -> User {
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: Some(email.to_string()),
            role: role.to_string(),
            metadata: json!({}),
        };
        self.inner.users.insert(
            email.to_ascii_lowercase(),
            MemoryUser {
                user: user.clone(),
                password_hash: hash_password(password),
            },
        );
        user
    }

    /// Sign a seeded user in without going through the trait.
    pub fn issue_session(&self, user: &User) -> String {
        let token = random_token();
        self.inner.sessions.insert(token.clone(), user.id.clone());
        token
    }

    /// Number of password-reset requests recorded for `email`.
    pub fn reset_requests(&self, email: &str) -> u32 {
        self.inner
            .reset_requests
            .get(&email.to_ascii_lowercase())
            .map(|n| *n)
            .unwrap_or(0)
    }

    /// Snapshot of a table.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.inner
            .tables
            .get(table)
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }

    fn user_by_id(&self, id: &str) -> Option<MemoryUser> {
        self.inner
            .users
            .iter()
            .find(|entry| entry.value().user.id == id)
            .map(|entry| entry.value().clone())
    }

    fn user_for_token(&self, access_token: &str) -> Result<MemoryUser> {
        let user_id = self
            .inner
            .sessions
            .get(access_token)
            .map(|id| id.clone())
            .ok_or_else(|| Error::Unauthorized("invalid access token".to_string()))?;
        self.user_by_id(&user_id)
            .ok_or_else(|| Error::Unauthorized("user no longer exists".to_string()))
    }

    fn session_for(&self, user: &User) -> Session {
        Session {
            access_token: self.issue_session(user),
            refresh_token: random_token(),
            expires_in: 3600,
            user: user.clone(),
        }
    }

    /// Fixed-window counter update, same contract as the SQL procedure:
    /// returns the row after the update plus whether the request is allowed.
    fn increment_rate_limit(&self, args: &Value) -> Result<Value> {
        let identifier = args
            .get("identifier")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Decode("identifier is required".to_string()))?;
        let window_seconds = args
            .get("window_seconds")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::Decode("window_seconds is required".to_string()))?;
        let max_requests = args
            .get("max_requests")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::Decode("max_requests is required".to_string()))?;
        let now = match args.get("now").and_then(Value::as_str) {
            Some(ts) => DateTime::parse_from_rfc3339(ts)
                .map_err(|e| Error::Decode(e.to_string()))?
                .with_timezone(&Utc),
            None => Utc::now(),
        };

        let mut table = self
            .inner
            .tables
            .entry(neothink_core::tables::RATE_LIMITS.to_string())
            .or_default();
        let existing = table
            .iter()
            .position(|r| r.get("identifier").and_then(Value::as_str) == Some(identifier));

        let fresh = json!({ "identifier": identifier, "count": 1, "window_start": now });
        let (row, allowed) = match existing {
            None => {
                table.push(fresh.clone());
                (fresh, true)
            }
            Some(index) => {
                let row = &mut table[index];
                let window_start = row
                    .get("window_start")
                    .and_then(Value::as_str)
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or(now);
                let count = row.get("count").and_then(Value::as_i64).unwrap_or(0);

                if now >= window_start + Duration::seconds(window_seconds) {
                    *row = fresh.clone();
                    (fresh, true)
                } else if count >= max_requests {
                    (row.clone(), false)
                } else {
                    row["count"] = json!(count + 1);
                    (row.clone(), true)
                }
            }
        };

        let mut result = row;
        result["allowed"] = json!(allowed);
        Ok(result)
    }
}

#[async_trait]
impl TableStore for MemoryBaas {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        Ok(query.apply(self.rows(table)))
    }

    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>> {
        let mut stored = Vec::with_capacity(rows.len());
        let mut entry = self.inner.tables.entry(table.to_string()).or_default();
        for mut row in rows {
            if !row.is_object() {
                return Err(Error::Decode(format!("row for {} is not an object", table)));
            }
            if row.get("id").is_none_or(Value::is_null) {
                row["id"] = json!(Uuid::new_v4());
            }
            entry.push(row.clone());
            stored.push(row);
        }
        Ok(stored)
    }

    async fn upsert(&self, table: &str, row: Value, on_conflict: &[&str]) -> Result<Value> {
        if !row.is_object() {
            return Err(Error::Decode(format!("row for {} is not an object", table)));
        }
        let mut entry = self.inner.tables.entry(table.to_string()).or_default();
        match entry.iter_mut().find(|r| same_key(r, &row, on_conflict)) {
            Some(existing) => {
                merge(existing, &row);
                Ok(existing.clone())
            }
            None => {
                entry.push(row.clone());
                Ok(row)
            }
        }
    }

    async fn update(&self, table: &str, query: &Query, patch: Value) -> Result<Vec<Value>> {
        let mut updated = Vec::new();
        if let Some(mut rows) = self.inner.tables.get_mut(table) {
            for row in rows.iter_mut().filter(|r| query.matches(r)) {
                merge(row, &patch);
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        let mut removed = Vec::new();
        if let Some(mut rows) = self.inner.tables.get_mut(table) {
            let (gone, kept): (Vec<Value>, Vec<Value>) =
                rows.drain(..).partition(|r| query.matches(r));
            *rows = kept;
            removed = gone;
        }
        Ok(removed)
    }

    async fn count(&self, table: &str, query: &Query) -> Result<u64> {
        let rows = self.rows(table);
        Ok(rows.iter().filter(|r| query.matches(r)).count() as u64)
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value> {
        match function {
            INCREMENT_RATE_LIMIT => self.increment_rate_limit(&args),
            other => Err(Error::Unsupported(format!("rpc {}", other))),
        }
    }

    fn as_user(&self, _access_token: &str) -> Arc<dyn TableStore> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl AuthProvider for MemoryBaas {
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session> {
        let account = self
            .inner
            .users
            .get(&credentials.email.to_ascii_lowercase())
            .map(|u| u.clone())
            .filter(|u| u.password_hash == hash_password(&credentials.password))
            .ok_or_else(|| Error::Unauthorized("Invalid login credentials".to_string()))?;
        Ok(self.session_for(&account.user))
    }

    async fn sign_up(&self, credentials: &Credentials, metadata: Value) -> Result<SignUp> {
        let key = credentials.email.to_ascii_lowercase();
        if self.inner.users.contains_key(&key) {
            return Err(Error::Rejected("User already registered".to_string()));
        }
        let mut user = self.seed_user(&credentials.email, &credentials.password, "member");
        if metadata.is_object() {
            user.metadata = metadata;
            if let Some(mut account) = self.inner.users.get_mut(&key) {
                account.user = user.clone();
            }
        }
        let session = self.session_for(&user);
        Ok(SignUp {
            user,
            session: Some(session),
        })
    }

    async fn reset_password(&self, email: &str, _redirect_to: Option<&str>) -> Result<()> {
        *self
            .inner
            .reset_requests
            .entry(email.to_ascii_lowercase())
            .or_insert(0) += 1;
        Ok(())
    }

    async fn update_user(&self, access_token: &str, update: &UserUpdate) -> Result<User> {
        let account = self.user_for_token(access_token)?;
        let old_key = account
            .user
            .email
            .clone()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if let Some(email) = &update.email {
            let new_key = email.to_ascii_lowercase();
            if new_key != old_key && self.inner.users.contains_key(&new_key) {
                return Err(Error::Rejected("email already in use".to_string()));
            }
        }
        let (_, mut account) = self
            .inner
            .users
            .remove(&old_key)
            .ok_or_else(|| Error::NotFound("user".to_string()))?;

        if let Some(password) = &update.password {
            account.password_hash = hash_password(password);
        }
        if let Some(data) = &update.data {
            if account.user.metadata.is_null() {
                account.user.metadata = json!({});
            }
            merge(&mut account.user.metadata, data);
        }
        if let Some(email) = &update.email {
            account.user.email = Some(email.clone());
        }

        let new_key = account
            .user
            .email
            .clone()
            .unwrap_or_default()
            .to_ascii_lowercase();
        let user = account.user.clone();
        self.inner.users.insert(new_key, account);
        Ok(user)
    }

    async fn get_user(&self, access_token: &str) -> Result<User> {
        Ok(self.user_for_token(access_token)?.user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate_args(now: DateTime<Utc>) -> Value {
        json!({
            "identifier": "hub:1.2.3.4:/api/auth/login",
            "window_seconds": 60,
            "max_requests": 2,
            "now": now,
        })
    }

    #[tokio::test]
    async fn test_crud_roundtrip() {
        let baas = MemoryBaas::new();
        baas.insert("feedback", vec![json!({ "platform": "hub", "rating": 4 })])
            .await
            .unwrap();
        baas.insert("feedback", vec![json!({ "platform": "immortals", "rating": 2 })])
            .await
            .unwrap();

        let hub = Query::new().eq("platform", "hub");
        assert_eq!(baas.count("feedback", &hub).await.unwrap(), 1);

        let updated = baas
            .update("feedback", &hub, json!({ "status": "reviewed" }))
            .await
            .unwrap();
        assert_eq!(updated[0]["status"], "reviewed");
        assert!(updated[0]["id"].is_string());

        let removed = baas.delete("feedback", &hub).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(baas.count("feedback", &Query::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_key() {
        let baas = MemoryBaas::new();
        let key = ["user_id", "platform"];
        baas.upsert("prefs", json!({ "user_id": "u1", "platform": "hub", "v": 1 }), &key)
            .await
            .unwrap();
        baas.upsert("prefs", json!({ "user_id": "u1", "platform": "hub", "v": 2 }), &key)
            .await
            .unwrap();
        baas.upsert("prefs", json!({ "user_id": "u1", "platform": "immortals", "v": 3 }), &key)
            .await
            .unwrap();

        let rows = baas.rows("prefs");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["v"], 2);
    }

    #[tokio::test]
    async fn test_increment_rate_limit_window() {
        let baas = MemoryBaas::new();
        let start = Utc::now();

        let first = baas.rpc(INCREMENT_RATE_LIMIT, rate_args(start)).await.unwrap();
        assert_eq!(first["count"], 1);
        assert_eq!(first["allowed"], true);

        let second = baas.rpc(INCREMENT_RATE_LIMIT, rate_args(start)).await.unwrap();
        assert_eq!(second["count"], 2);
        assert_eq!(second["allowed"], true);

        let third = baas.rpc(INCREMENT_RATE_LIMIT, rate_args(start)).await.unwrap();
        assert_eq!(third["allowed"], false);

        let later = baas
            .rpc(INCREMENT_RATE_LIMIT, rate_args(start + Duration::seconds(61)))
            .await
            .unwrap();
        assert_eq!(later["count"], 1);
        assert_eq!(later["allowed"], true);
    }

    #[test]
    fn test_procedure_sql_matches_contract() {
        assert!(INCREMENT_RATE_LIMIT_SQL
            .contains(&format!("function public.{}(", INCREMENT_RATE_LIMIT)));
        for column in ["count integer", "window_start timestamptz", "allowed boolean"] {
            assert!(INCREMENT_RATE_LIMIT_SQL.contains(column), "missing {}", column);
        }
        for arg in ["identifier", "window_seconds", "max_requests"] {
            assert!(INCREMENT_RATE_LIMIT_SQL.contains(arg), "missing {}", arg);
        }
    }

    #[tokio::test]
    async fn test_unknown_rpc_is_unsupported() {
        let baas = MemoryBaas::new();
        let err = baas.rpc("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_auth_flow() {
        let baas = MemoryBaas::new();
        let creds = Credentials {
            email: "Ada@Example.com".to_string(),
            password: "correct horse".to_string(),
        };

        let signup = baas.sign_up(&creds, json!({ "name": "Ada" })).await.unwrap();
        assert_eq!(signup.user.metadata["name"], "Ada");
        assert!(baas.sign_up(&creds, json!({})).await.is_err());

        let session = baas.sign_in(&creds).await.unwrap();
        let me = baas.get_user(&session.access_token).await.unwrap();
        assert_eq!(me.id, signup.user.id);

        let bad = Credentials {
            email: creds.email.clone(),
            password: "wrong".to_string(),
        };
        assert!(matches!(baas.sign_in(&bad).await, Err(Error::Unauthorized(_))));

        let update = UserUpdate {
            password: Some("new password".to_string()),
            ..Default::default()
        };
        baas.update_user(&session.access_token, &update).await.unwrap();
        assert!(baas.sign_in(&creds).await.is_err());

        baas.reset_password("ada@example.com", None).await.unwrap();
        assert_eq!(baas.reset_requests("ADA@example.com"), 1);
        assert!(baas.get_user("bogus").await.is_err());
    }

    #[tokio::test]
    async fn test_email_change_to_taken_address_rejected() {
        let baas = MemoryBaas::new();
        let other = baas.seed_user("grace@example.com", "pw-grace", "member");
        baas.seed_user("ada@example.com", "pw-ada", "member");
        let session = baas
            .sign_in(&Credentials {
                email: "ada@example.com".to_string(),
                password: "pw-ada".to_string(),
            })
            .await
            .unwrap();

        let update = UserUpdate {
            email: Some("Grace@Example.com".to_string()),
            ..Default::default()
        };
        let err = baas.update_user(&session.access_token, &update).await.unwrap_err();
        assert!(matches!(err, Error::Rejected(_)));

        // Both accounts are untouched.
        let grace = baas
            .sign_in(&Credentials {
                email: "grace@example.com".to_string(),
                password: "pw-grace".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(grace.user.id, other.id);
        let me = baas.get_user(&session.access_token).await.unwrap();
        assert_eq!(me.email.as_deref(), Some("ada@example.com"));

        // Changing only the case of your own address is allowed.
        let update = UserUpdate {
            email: Some("ADA@example.com".to_string()),
            ..Default::default()
        };
        assert!(baas.update_user(&session.access_token, &update).await.is_ok());
    }
}
