//! Client for the Notion content API
//!
//! Retrieves a page and its block tree: children are paginated with a
//! cursor and recursively expanded depth-first, so the caller receives one
//! fully materialized document.

use crate::error::NotionError;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

const NOTION_VERSION: &str = "2022-06-28";
const DEFAULT_BASE_URL: &str = "https://api.notion.com/v1";
const PAGE_SIZE: u32 = 100;
const DEFAULT_TITLE: &str = "Untitled";

/// The simplified document shape served by the docs API
#[derive(Debug, Serialize)]
pub struct PageDocument {
    pub id: String,
    pub title: String,
    pub blocks: Vec<Value>,
}

pub struct NotionClient {
    http: reqwest::Client,
    base_url: String,
}

impl NotionClient {
    pub fn new(token: &str) -> anyhow::Result<Self> {
        Self::with_base_url(token, DEFAULT_BASE_URL)
    }

    /// Point the client at a different API root (used by tests)
    pub fn with_base_url(token: &str, base_url: &str) -> anyhow::Result<Self> {
        use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| anyhow::anyhow!("Notion API token contains invalid header characters"))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert("Notion-Version", HeaderValue::from_static(NOTION_VERSION));

        let http = reqwest::Client::builder().default_headers(headers).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json(&self, path: &str) -> Result<Value, NotionError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.get(&url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response
                .json::<Value>()
                .await
                .ok()
                .and_then(|v| {
                    v.get("message")
                        .and_then(Value::as_str)
                        .map(String::from)
                })
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                });
            return Err(NotionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }

    pub async fn retrieve_page(&self, page_id: &str) -> Result<Value, NotionError> {
        self.get_json(&format!("/pages/{}", page_id)).await
    }

    /// All children of a block, following pagination cursors in order
    pub async fn block_children_all(&self, block_id: &str) -> Result<Vec<Value>, NotionError> {
        let mut blocks = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut path = format!("/blocks/{}/children?page_size={}", block_id, PAGE_SIZE);
            if let Some(ref c) = cursor {
                path.push_str("&start_cursor=");
                path.push_str(c);
            }
            let page = self.get_json(&path).await?;

            let results = page
                .get("results")
                .and_then(Value::as_array)
                .ok_or_else(|| NotionError::InvalidPayload("missing 'results' array".into()))?;
            blocks.extend(results.iter().cloned());

            let has_more = page.get("has_more").and_then(Value::as_bool).unwrap_or(false);
            if !has_more {
                break;
            }
            cursor = page
                .get("next_cursor")
                .and_then(Value::as_str)
                .map(String::from);
            if cursor.is_none() {
                break;
            }
        }

        Ok(blocks)
    }

    /// Depth-first expansion: every block flagged `has_children` gets its
    /// fully expanded subtree attached under a `children` field
    fn expand_blocks<'a>(
        &'a self,
        mut blocks: Vec<Value>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Value>, NotionError>> + Send + 'a>> {
        Box::pin(async move {
            for block in blocks.iter_mut() {
                let has_children = block
                    .get("has_children")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if !has_children {
                    continue;
                }
                let id = match block.get("id").and_then(Value::as_str) {
                    Some(id) => id.to_string(),
                    None => continue,
                };

                let children = self.block_children_all(&id).await?;
                let children = self.expand_blocks(children).await?;
                if let Some(obj) = block.as_object_mut() {
                    obj.insert("children".to_string(), Value::Array(children));
                }
            }
            Ok(blocks)
        })
    }

    pub async fn block_tree(&self, block_id: &str) -> Result<Vec<Value>, NotionError> {
        let top_level = self.block_children_all(block_id).await?;
        self.expand_blocks(top_level).await
    }

    /// Assemble the `{ id, title, blocks }` document for a page
    pub async fn page_document(&self, page_id: &str) -> Result<PageDocument, NotionError> {
        let page = self.retrieve_page(page_id).await?;
        let blocks = self.block_tree(page_id).await?;
        let title = extract_title(&page, &blocks);
        let id = page
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or(page_id)
            .to_string();

        debug!(page_id, title = %title, blocks = blocks.len(), "Assembled page document");

        Ok(PageDocument { id, title, blocks })
    }
}

/// Concatenated plain text of a rich_text array
fn rich_text_plain(value: &Value) -> String {
    value
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("plain_text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .concat()
        })
        .unwrap_or_default()
}

/// Title fallback chain: a title-kind page property, else the text of the
/// first heading block among the top-level blocks, else a fixed default
pub fn extract_title(page: &Value, blocks: &[Value]) -> String {
    if let Some(properties) = page.get("properties").and_then(Value::as_object) {
        for property in properties.values() {
            if property.get("type").and_then(Value::as_str) == Some("title") {
                let text = rich_text_plain(property.get("title").unwrap_or(&Value::Null));
                if !text.is_empty() {
                    return text;
                }
            }
        }
    }

    for block in blocks {
        let kind = block.get("type").and_then(Value::as_str).unwrap_or("");
        if kind.starts_with("heading") {
            let text = block
                .get(kind)
                .map(|b| rich_text_plain(b.get("rich_text").unwrap_or(&Value::Null)))
                .unwrap_or_default();
            if !text.is_empty() {
                return text;
            }
        }
    }

    DEFAULT_TITLE.to_string()
}
