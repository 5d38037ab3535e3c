use async_trait::async_trait;
use quotesync::ProposalSource;
use quotesync_api::{Contact, ContentBlock, Counterparty, ProposalHeader, TransportError};
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::models::{OfforteCompany, OfforteContact, OfforteContent, OfforteProposal};
use crate::http;

const BASE_URL: &str = "https://connect.offorte.com/api/v2";

/// Rate limiter key for the Offorte API.
pub const API_NAME: &str = "offorte";

pub struct OfforteClient {
    base_url: String,
    default_headers: HeaderMap,
    client: reqwest::Client,
}

impl OfforteClient {
    pub fn new(account: &str, api_key: &str) -> anyhow::Result<Self> {
        Self::with_base_url(&format!("{}/{}", BASE_URL, account), api_key)
    }

    /// Point the client at a different account root, e.g. a mock server.
    pub fn with_base_url(base_url: &str, api_key: &str) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            default_headers: http::bearer_headers(api_key)?,
            client: http::build_client()?,
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        operation: &str,
    ) -> Result<T, TransportError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("[OfforteClient] GET {}", url);

        let response = self
            .client
            .get(&url)
            .headers(http::with_trace_context(&self.default_headers))
            .send()
            .await
            .map_err(|e| http::request_error(e, &url, operation))?;

        let text = http::read_body(response, &url).await?;
        http::decode(&text, &url)
    }
}

#[async_trait]
impl ProposalSource for OfforteClient {
    fn api_name(&self) -> &str {
        API_NAME
    }

    #[tracing::instrument(name = "offorte.fetch_header", skip(self))]
    async fn fetch_header(&self, proposal_id: i64) -> Result<ProposalHeader, TransportError> {
        let proposal: OfforteProposal = self
            .get(&format!("/proposals/{}", proposal_id), "fetch proposal")
            .await?;
        Ok(proposal.into())
    }

    #[tracing::instrument(name = "offorte.fetch_content", skip(self))]
    async fn fetch_content(&self, proposal_id: i64) -> Result<Vec<ContentBlock>, TransportError> {
        let content: OfforteContent = self
            .get(&format!("/proposals/{}/content", proposal_id), "fetch proposal content")
            .await?;
        let blocks = content.into_blocks();
        debug!(
            "[OfforteClient] proposal {} content: {} block(s)",
            proposal_id,
            blocks.len()
        );
        Ok(blocks)
    }

    #[tracing::instrument(name = "offorte.fetch_company", skip(self))]
    async fn fetch_counterparty(
        &self,
        counterparty_id: i64,
    ) -> Result<Counterparty, TransportError> {
        let company: OfforteCompany = self
            .get(&format!("/companies/{}", counterparty_id), "fetch company")
            .await?;
        Ok(company.into())
    }

    #[tracing::instrument(name = "offorte.fetch_contact", skip(self))]
    async fn fetch_contact(&self, contact_id: i64) -> Result<Contact, TransportError> {
        let contact: OfforteContact = self
            .get(&format!("/contacts/{}", contact_id), "fetch contact")
            .await?;
        Ok(contact.into())
    }
}
