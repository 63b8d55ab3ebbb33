//! Remote BaaS over HTTP (PostgREST tables + GoTrue auth).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{Error, Result};
use crate::query::Query;
use crate::store::{
    AuthProvider, Credentials, Session, SignUp, TableStore, User, UserUpdate,
};

/// HTTP client for one BaaS project.
///
/// Every request carries the project key in `apikey`. The bearer token is the
/// same key unless the store was derived with [`TableStore::as_user`].
#[derive(Clone)]
pub struct RestBaas {
    client: Client,
    base_url: String,
    api_key: String,
    bearer: String,
}

impl RestBaas {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url, api_key))
    }

    /// Share a connection pool between several projects.
    pub fn with_client(client: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            bearer: api_key.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.request_as(method, path, &self.bearer)
    }

    fn request_as(&self, method: Method, path: &str, bearer: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
    }

    fn table_path(table: &str) -> String {
        format!("/rest/v1/{}", table)
    }

    async fn send(builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!(category = "baas", status = status.as_u16(), "BaaS request failed");
        Err(Error::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn json_rows(response: Response) -> Result<Vec<Value>> {
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Value>(&text)? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            other => Ok(vec![other]),
        }
    }

    /// Send an auth request and map the GoTrue error body.
    async fn auth_call(builder: RequestBuilder, failure: AuthFailure) -> Result<Value> {
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if status.is_success() {
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_str(&text)?);
        }

        let message = auth_error_message(&text);
        Err(match (status, failure) {
            (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, _) => Error::Unauthorized(message),
            (StatusCode::BAD_REQUEST, AuthFailure::Credentials) => Error::Unauthorized(message),
            (s, _) if s.is_client_error() => Error::Rejected(message),
            (s, _) => Error::Status {
                status: s.as_u16(),
                body: text,
            },
        })
    }
}

#[derive(Clone, Copy)]
enum AuthFailure {
    /// 400 means bad credentials.
    Credentials,
    /// 400 means the request was refused.
    Request,
}

fn auth_error_message(body: &str) -> String {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    ["msg", "error_description", "message", "error"]
        .iter()
        .find_map(|k| parsed.get(*k).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| "authentication failed".to_string())
}

/// User object as returned by GoTrue.
#[derive(Debug, Deserialize)]
struct RemoteUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    app_metadata: Value,
    #[serde(default)]
    user_metadata: Value,
}

impl From<RemoteUser> for User {
    fn from(remote: RemoteUser) -> Self {
        let role = remote
            .app_metadata
            .get("role")
            .and_then(Value::as_str)
            .unwrap_or("member")
            .to_string();
        User {
            id: remote.id,
            email: remote.email,
            role,
            metadata: remote.user_metadata,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RemoteSession {
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    expires_in: u64,
    user: RemoteUser,
}

impl From<RemoteSession> for Session {
    fn from(remote: RemoteSession) -> Self {
        Session {
            access_token: remote.access_token,
            refresh_token: remote.refresh_token,
            expires_in: remote.expires_in,
            user: remote.user.into(),
        }
    }
}

/// Sign-up returns a session when confirmation is off, a bare user otherwise.
fn parse_sign_up(body: Value) -> Result<SignUp> {
    if body.get("access_token").is_some() {
        let session: RemoteSession = serde_json::from_value(body)?;
        let session: Session = session.into();
        return Ok(SignUp {
            user: session.user.clone(),
            session: Some(session),
        });
    }
    let user = match body.get("user") {
        Some(user) => user.clone(),
        None => body,
    };
    let user: RemoteUser = serde_json::from_value(user)?;
    Ok(SignUp {
        user: user.into(),
        session: None,
    })
}

/// Parse the total from a `Content-Range: 0-9/42` header.
fn parse_content_range(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.parse().ok()
}

#[async_trait]
impl TableStore for RestBaas {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        let builder = self
            .request(Method::GET, &Self::table_path(table))
            .query(&[("select", "*")])
            .query(&query.to_params());
        Self::json_rows(Self::send(builder).await?).await
    }

    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>> {
        let builder = self
            .request(Method::POST, &Self::table_path(table))
            .header("Prefer", "return=representation")
            .json(&rows);
        Self::json_rows(Self::send(builder).await?).await
    }

    async fn upsert(&self, table: &str, row: Value, on_conflict: &[&str]) -> Result<Value> {
        let builder = self
            .request(Method::POST, &Self::table_path(table))
            .query(&[("on_conflict", on_conflict.join(","))])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&[row]);
        let rows = Self::json_rows(Self::send(builder).await?).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::Decode(format!("upsert into {} returned no row", table)))
    }

    async fn update(&self, table: &str, query: &Query, patch: Value) -> Result<Vec<Value>> {
        let builder = self
            .request(Method::PATCH, &Self::table_path(table))
            .query(&query.to_params())
            .header("Prefer", "return=representation")
            .json(&patch);
        Self::json_rows(Self::send(builder).await?).await
    }

    async fn delete(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        let builder = self
            .request(Method::DELETE, &Self::table_path(table))
            .query(&query.to_params())
            .header("Prefer", "return=representation");
        Self::json_rows(Self::send(builder).await?).await
    }

    async fn count(&self, table: &str, query: &Query) -> Result<u64> {
        let builder = self
            .request(Method::HEAD, &Self::table_path(table))
            .query(&[("select", "*")])
            .query(&query.to_params())
            .header("Prefer", "count=exact");
        let response = Self::send(builder).await?;
        response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range)
            .ok_or_else(|| Error::Decode("missing Content-Range header".to_string()))
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value> {
        let builder = self
            .request(Method::POST, &format!("/rest/v1/rpc/{}", function))
            .json(&args);
        let response = Self::send(builder).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        // Set-returning functions come back as an array.
        match serde_json::from_str::<Value>(&text)? {
            Value::Array(mut rows) if rows.len() == 1 => Ok(rows.remove(0)),
            other => Ok(other),
        }
    }

    fn as_user(&self, access_token: &str) -> Arc<dyn TableStore> {
        let mut scoped = self.clone();
        scoped.bearer = access_token.to_string();
        Arc::new(scoped)
    }

    fn endpoint(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl AuthProvider for RestBaas {
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session> {
        let builder = self
            .request(Method::POST, "/auth/v1/token")
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": credentials.email, "password": credentials.password }));
        let body = Self::auth_call(builder, AuthFailure::Credentials).await?;
        let session: RemoteSession = serde_json::from_value(body)?;
        Ok(session.into())
    }

    async fn sign_up(&self, credentials: &Credentials, metadata: Value) -> Result<SignUp> {
        let builder = self.request(Method::POST, "/auth/v1/signup").json(&json!({
            "email": credentials.email,
            "password": credentials.password,
            "data": metadata,
        }));
        parse_sign_up(Self::auth_call(builder, AuthFailure::Request).await?)
    }

    async fn reset_password(&self, email: &str, redirect_to: Option<&str>) -> Result<()> {
        let mut builder = self
            .request(Method::POST, "/auth/v1/recover")
            .json(&json!({ "email": email }));
        if let Some(redirect_to) = redirect_to {
            builder = builder.query(&[("redirect_to", redirect_to)]);
        }
        Self::auth_call(builder, AuthFailure::Request).await?;
        Ok(())
    }

    async fn update_user(&self, access_token: &str, update: &UserUpdate) -> Result<User> {
        let builder = self
            .request_as(Method::PUT, "/auth/v1/user", access_token)
            .json(update);
        let body = Self::auth_call(builder, AuthFailure::Request).await?;
        let user: RemoteUser = serde_json::from_value(body)?;
        Ok(user.into())
    }

    async fn get_user(&self, access_token: &str) -> Result<User> {
        let builder = self.request_as(Method::GET, "/auth/v1/user", access_token);
        let body = Self::auth_call(builder, AuthFailure::Credentials).await?;
        let user: RemoteUser = serde_json::from_value(body)?;
        Ok(user.into())
    }
}
