//! PostgREST-backed remote store (Supabase-style REST interface).
//!
//! Lookups are `GET /rest/v1/{table}` with `eq.` filters on every column of
//! the key shape, `anchor_verse=is.null` for the unanchored shapes, newest
//! first, limit one. Inserts are `POST` with `Prefer: return=minimal`.

use async_trait::async_trait;
use lectio_core::{RemoteError, RemoteRow, RemoteStoreConfig, VerseRange};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::RemoteCommentaryStore;

const SELECT_COLUMNS: &str = "book,chapter,start_verse,end_verse,anchor_verse,commentary,created_at";
const UNIQUE_VIOLATION: &str = "23505";

/// Remote store talking to a PostgREST endpoint.
#[derive(Clone)]
pub struct PostgrestCommentaryStore {
    client: Client,
    base_url: String,
    api_key: String,
    table: String,
}

#[derive(Debug, Serialize)]
struct InsertRow<'a> {
    book: &'a str,
    chapter: u32,
    start_verse: u32,
    end_verse: u32,
    anchor_verse: Option<u32>,
    commentary: &'a str,
}

#[derive(Debug, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl PostgrestCommentaryStore {
    /// Create a store for `table` under `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self::with_client(Client::new(), base_url, api_key, table)
    }

    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            table: table.into(),
        }
    }

    /// Build from configuration, applying the configured request timeout.
    pub fn from_config(config: &RemoteStoreConfig) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RemoteError::Query {
                reason: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self::with_client(
            client,
            config.base_url.clone(),
            config.api_key.clone(),
            config.table.clone(),
        ))
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    /// Run a filtered select and return the newest row.
    async fn select_one(&self, filters: Vec<(&str, String)>) -> Result<Option<RemoteRow>, RemoteError> {
        let mut query: Vec<(&str, String)> = vec![
            ("select", SELECT_COLUMNS.to_string()),
            ("order", "created_at.desc".to_string()),
            ("limit", "1".to_string()),
        ];
        query.extend(filters);

        let response = self
            .authorized(self.client.get(self.table_url()))
            .query(&query)
            .send()
            .await
            .map_err(|e| RemoteError::Query {
                reason: format!("HTTP request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Query {
                reason: format!("status {}: {}", status.as_u16(), error_message(&body)),
            });
        }

        let rows: Vec<RemoteRow> = response.json().await.map_err(|e| RemoteError::Query {
            reason: format!("Failed to parse response: {}", e),
        })?;
        Ok(rows.into_iter().next())
    }
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<PostgrestError>(body) {
        Ok(PostgrestError {
            message: Some(message),
            ..
        }) => message,
        _ if body.is_empty() => "Unknown error".to_string(),
        _ => body.to_string(),
    }
}

fn range_filters(book: &str, chapter: u32, range: VerseRange) -> Vec<(&'static str, String)> {
    vec![
        ("book", format!("eq.{}", book)),
        ("chapter", format!("eq.{}", chapter)),
        ("start_verse", format!("eq.{}", range.start)),
        ("end_verse", format!("eq.{}", range.end)),
    ]
}

#[async_trait]
impl RemoteCommentaryStore for PostgrestCommentaryStore {
    async fn find_by_anchor_key(
        &self,
        book: &str,
        chapter: u32,
        range: VerseRange,
        anchor: u32,
    ) -> Result<Option<RemoteRow>, RemoteError> {
        let mut filters = range_filters(book, chapter, range);
        filters.push(("anchor_verse", format!("eq.{}", anchor)));
        self.select_one(filters).await
    }

    async fn find_by_range_key(
        &self,
        book: &str,
        chapter: u32,
        range: VerseRange,
    ) -> Result<Option<RemoteRow>, RemoteError> {
        let mut filters = range_filters(book, chapter, range);
        filters.push(("anchor_verse", "is.null".to_string()));
        self.select_one(filters).await
    }

    async fn find_by_single_verse_key(
        &self,
        book: &str,
        chapter: u32,
        verse: u32,
    ) -> Result<Option<RemoteRow>, RemoteError> {
        self.find_by_range_key(book, chapter, VerseRange::new(verse, verse))
            .await
    }

    async fn find_by_anchor_verse(
        &self,
        book: &str,
        chapter: u32,
        anchor: u32,
    ) -> Result<Option<RemoteRow>, RemoteError> {
        self.select_one(vec![
            ("book", format!("eq.{}", book)),
            ("chapter", format!("eq.{}", chapter)),
            ("anchor_verse", format!("eq.{}", anchor)),
        ])
        .await
    }

    async fn insert(&self, row: &RemoteRow) -> Result<(), RemoteError> {
        let body = InsertRow {
            book: &row.book,
            chapter: row.chapter,
            start_verse: row.start_verse,
            end_verse: row.end_verse,
            anchor_verse: row.anchor_verse,
            commentary: &row.commentary,
        };

        let response = self
            .authorized(self.client.post(self.table_url()))
            .header("Prefer", "return=minimal")
            .json(&body)
            .send()
            .await
            .map_err(|e| RemoteError::Insert {
                reason: format!("HTTP request failed: {}", e),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        let code = serde_json::from_str::<PostgrestError>(&text)
            .ok()
            .and_then(|e| e.code);
        if status == StatusCode::CONFLICT || code.as_deref() == Some(UNIQUE_VIOLATION) {
            Err(RemoteError::Duplicate {
                reason: error_message(&text),
            })
        } else {
            Err(RemoteError::Insert {
                reason: format!("status {}: {}", status.as_u16(), error_message(&text)),
            })
        }
    }
}

impl std::fmt::Debug for PostgrestCommentaryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgrestCommentaryStore")
            .field("base_url", &self.base_url)
            .field("table", &self.table)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
