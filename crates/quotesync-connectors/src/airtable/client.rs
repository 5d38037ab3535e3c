use std::collections::HashMap;

use async_trait::async_trait;
use quotesync::RecordStore;
use quotesync_api::{Fields, TransportError, TransportErrorKind};
use reqwest::header::HeaderMap;
use reqwest::{Method, Url};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::models::{NewRecord, RecordPage, RecordUpdate, WriteRequest};
use crate::http;

const BASE_URL: &str = "https://api.airtable.com/v0";

/// Rate limiter key for the Airtable API.
pub const API_NAME: &str = "airtable";

/// Safety stop for list pagination.
const MAX_PAGES: usize = 100;

pub struct AirtableClient {
    base_url: Url,
    default_headers: HeaderMap,
    client: reqwest::Client,
}

impl AirtableClient {
    pub fn new(api_key: &str) -> anyhow::Result<Self> {
        Self::with_base_url(BASE_URL, api_key)
    }

    pub fn with_base_url(base_url: &str, api_key: &str) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| anyhow::anyhow!("Invalid Airtable base URL {}: {}", base_url, e))?;
        Ok(Self {
            base_url,
            default_headers: http::bearer_headers(api_key)?,
            client: http::build_client()?,
        })
    }

    /// `<root>/<base>/<table>`, with the table name percent-encoded.
    fn table_url(&self, base: &str, table: &str) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                TransportError::new(
                    TransportErrorKind::Client,
                    format!("Base URL {} cannot carry a path", self.base_url),
                )
            })?
            .pop_if_empty()
            .push(base)
            .push(table);
        Ok(url)
    }

    async fn send<B: Serialize>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
        operation: &str,
    ) -> Result<RecordPage, TransportError> {
        let url_text = url.to_string();
        let mut request = self
            .client
            .request(method, url)
            .headers(http::with_trace_context(&self.default_headers));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| http::request_error(e, &url_text, operation))?;
        let text = http::read_body(response, &url_text).await?;
        http::decode(&text, &url_text)
    }

    async fn write<T: Serialize>(
        &self,
        method: Method,
        base: &str,
        table: &str,
        records: Vec<T>,
        operation: &str,
    ) -> Result<Vec<String>, TransportError> {
        let url = self.table_url(base, table)?;
        let body = WriteRequest {
            records,
            typecast: false,
        };
        let page = self.send(method, url, Some(&body), operation).await?;
        Ok(page.records.into_iter().map(|r| r.id).collect())
    }
}

/// `OR({field}='a',{field}='b')` with quotes and backslashes escaped.
pub fn filter_formula(key_field: &str, keys: &[String]) -> String {
    let field = key_field.replace('}', "\\}");
    let clauses: Vec<String> = keys
        .iter()
        .map(|key| {
            let escaped = key.replace('\\', "\\\\").replace('\'', "\\'");
            format!("{{{}}}='{}'", field, escaped)
        })
        .collect();
    format!("OR({})", clauses.join(","))
}

#[async_trait]
impl RecordStore for AirtableClient {
    fn api_name(&self) -> &str {
        API_NAME
    }

    #[tracing::instrument(
        name = "airtable.find_existing",
        skip(self, keys),
        fields(keys = keys.len())
    )]
    async fn find_existing(
        &self,
        base: &str,
        table: &str,
        key_field: &str,
        keys: &[String],
    ) -> Result<HashMap<String, String>, TransportError> {
        let mut found = HashMap::new();
        if keys.is_empty() {
            return Ok(found);
        }
        let formula = filter_formula(key_field, keys);
        let mut offset: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut url = self.table_url(base, table)?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("filterByFormula", &formula);
                query.append_pair("fields[]", key_field);
                if let Some(offset) = &offset {
                    query.append_pair("offset", offset);
                }
            }
            let page = self
                .send::<()>(Method::GET, url, None, "look up records")
                .await?;
            for record in page.records {
                if let Some(key) = record.fields.get(key_field).and_then(key_text) {
                    found.entry(key).or_insert(record.id);
                }
            }
            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        debug!(
            "[AirtableClient] {}: {} of {} key(s) already exist",
            table,
            found.len(),
            keys.len()
        );
        Ok(found)
    }

    #[tracing::instrument(
        name = "airtable.create",
        skip(self, records),
        fields(records = records.len())
    )]
    async fn create_records(
        &self,
        base: &str,
        table: &str,
        records: &[Fields],
    ) -> Result<Vec<String>, TransportError> {
        let payload: Vec<NewRecord<'_>> =
            records.iter().map(|fields| NewRecord { fields }).collect();
        let ids = self
            .write(Method::POST, base, table, payload, "create records")
            .await?;
        info!("[AirtableClient] {}: created {} record(s)", table, ids.len());
        Ok(ids)
    }

    #[tracing::instrument(
        name = "airtable.update",
        skip(self, records),
        fields(records = records.len())
    )]
    async fn update_records(
        &self,
        base: &str,
        table: &str,
        records: &[(String, Fields)],
    ) -> Result<Vec<String>, TransportError> {
        let payload: Vec<RecordUpdate<'_>> = records
            .iter()
            .map(|(id, fields)| RecordUpdate { id, fields })
            .collect();
        let ids = self
            .write(Method::PATCH, base, table, payload, "update records")
            .await?;
        info!("[AirtableClient] {}: updated {} record(s)", table, ids.len());
        Ok(ids)
    }
}

/// Key fields may come back as text or as numbers.
fn key_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
