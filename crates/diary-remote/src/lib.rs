//! Remote note store backed by the diary HTTP API.
//!
//! Routes (JSON bodies, bearer token on `/notes`):
//!
//! ```text
//! POST   /auth/register   {username, password} -> {id, username}
//! POST   /auth/token      {username, password} -> {token, user_id, username}
//! GET    /notes                                -> [note]
//! GET    /notes/:id                            -> note | 404
//! POST   /notes           {header, body}       -> note
//! PUT    /notes/:id       {header, body}       -> 200 | 404
//! DELETE /notes/:id                            -> 200/204 | 404
//! ```
//!
//! The server scopes notes by token, so `user_id` arguments only fill in the
//! returned notes.

use diary_core::{format_timestamp, parse_timestamp, Error, Note, NoteStore, Session};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct CredentialsRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct NoteRequest<'a> {
    header: &'a str,
    body: &'a str,
}

#[derive(Deserialize)]
struct UserResponse {
    id: i64,
    username: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
    user_id: i64,
    username: String,
}

#[derive(Deserialize)]
struct NoteRow {
    id: i64,
    #[serde(default)]
    user_id: Option<i64>,
    #[serde(default)]
    header: Option<String>,
    #[serde(default)]
    body: Option<String>,
    created_at: String,
    updated_at: String,
}

impl NoteRow {
    fn into_note(self, user_id: i64) -> Note {
        Note {
            id: self.id,
            user_id: self.user_id.unwrap_or(user_id),
            header: self.header.unwrap_or_default(),
            body: self.body.unwrap_or_default(),
            created_at: normalize_timestamp(self.created_at),
            updated_at: normalize_timestamp(self.updated_at),
        }
    }
}

/// Rewrite "2024-01-01T10:00:00.123Z" as "2024-01-01 10:00:00".
/// Unparseable values are kept so the categorizer can report them.
fn normalize_timestamp(raw: String) -> String {
    match parse_timestamp(&raw) {
        Ok(dt) => format_timestamp(dt),
        Err(_) => raw,
    }
}

/// HTTP API note store.
pub struct RemoteStore {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl RemoteStore {
    pub fn new(base_url: &str) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Remote(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Use a token obtained from an earlier [`NoteStore::authenticate`].
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, Error> {
        match self.token {
            Some(ref token) => Ok(builder.bearer_auth(token)),
            None => Err(Error::Auth("not logged in".into())),
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, Error> {
        builder
            .send()
            .await
            .map_err(|e| Error::Remote(format!("Request failed: {}", e)))
    }

    async fn json<T: for<'de> Deserialize<'de>>(resp: Response) -> Result<T, Error> {
        resp.json()
            .await
            .map_err(|e| Error::Remote(format!("Failed to parse response: {}", e)))
    }

    fn require_password(password: Option<&str>) -> Result<&str, Error> {
        password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::Auth("password required".into()))
    }
}

/// Turn non-success statuses into errors.
async fn check_status(resp: Response) -> Result<Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let text = resp.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(Error::Auth(format!("HTTP {}: {}", status, text)))
        }
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT => {
            Err(Error::Validation(format!("HTTP {}: {}", status, text)))
        }
        _ => Err(Error::Remote(format!("HTTP {}: {}", status, text))),
    }
}

#[async_trait::async_trait(?Send)]
impl NoteStore for RemoteStore {
    async fn register_user(&self, username: &str, password: Option<&str>) -> Result<Session, Error> {
        let password = Self::require_password(password)?;

        let resp = self
            .send(
                self.client
                    .post(self.url("/auth/register"))
                    .json(&CredentialsRequest { username, password }),
            )
            .await?;
        let user: UserResponse = Self::json(check_status(resp).await?).await?;
        debug!(user_id = user.id, username = %user.username, "registered remote user");

        self.authenticate(username, Some(password)).await
    }

    async fn authenticate(&self, username: &str, password: Option<&str>) -> Result<Session, Error> {
        let password = Self::require_password(password)?;

        let resp = self
            .send(
                self.client
                    .post(self.url("/auth/token"))
                    .json(&CredentialsRequest { username, password }),
            )
            .await?;
        let token: TokenResponse = Self::json(check_status(resp).await?).await?;

        Ok(Session {
            user_id: token.user_id,
            username: token.username,
            token: Some(token.token),
        })
    }

    async fn list_notes(&self, user_id: i64) -> Result<Vec<Note>, Error> {
        let resp = self
            .send(self.authorized(self.client.get(self.url("/notes")))?)
            .await?;
        let rows: Vec<NoteRow> = Self::json(check_status(resp).await?).await?;

        Ok(rows.into_iter().map(|r| r.into_note(user_id)).collect())
    }

    async fn get_note(&self, user_id: i64, id: i64) -> Result<Option<Note>, Error> {
        let resp = self
            .send(self.authorized(self.client.get(self.url(&format!("/notes/{}", id))))?)
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let row: NoteRow = Self::json(check_status(resp).await?).await?;
        Ok(Some(row.into_note(user_id)))
    }

    async fn create_note(&self, user_id: i64, header: &str, body: &str) -> Result<Note, Error> {
        let resp = self
            .send(
                self.authorized(self.client.post(self.url("/notes")))?
                    .json(&NoteRequest { header, body }),
            )
            .await?;
        let row: NoteRow = Self::json(check_status(resp).await?).await?;

        Ok(row.into_note(user_id))
    }

    async fn update_note(
        &self,
        _user_id: i64,
        id: i64,
        header: &str,
        body: &str,
    ) -> Result<bool, Error> {
        let resp = self
            .send(
                self.authorized(self.client.put(self.url(&format!("/notes/{}", id))))?
                    .json(&NoteRequest { header, body }),
            )
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(resp).await?;
        Ok(true)
    }

    async fn delete_note(&self, _user_id: i64, id: i64) -> Result<bool, Error> {
        let resp = self
            .send(self.authorized(self.client.delete(self.url(&format!("/notes/{}", id))))?)
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(resp).await?;
        Ok(true)
    }
}
