//! Source fetch client.
//!
//! [`ProposalSource`] is the seam to the quoting platform; [`FetchClient`]
//! assembles a complete [`Proposal`] from it, passing every call through
//! the shared rate limiter and the retry policy.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use quotesync_api::{
    Contact, ContentBlock, Counterparty, FetchError, Proposal, ProposalHeader, TransportError,
};
use tracing::{debug, error, info, Span};

use crate::rate_limiter::RateLimiter;
use crate::retry::RetryPolicy;

/// Contacts beyond this many are not fetched.
pub const MAX_CONTACTS: usize = 5;

#[async_trait]
pub trait ProposalSource: Send + Sync {
    /// Rate limiter key of the API behind this source.
    fn api_name(&self) -> &str;

    async fn fetch_header(&self, proposal_id: i64) -> Result<ProposalHeader, TransportError>;

    async fn fetch_content(&self, proposal_id: i64) -> Result<Vec<ContentBlock>, TransportError>;

    async fn fetch_counterparty(
        &self,
        counterparty_id: i64,
    ) -> Result<Counterparty, TransportError>;

    async fn fetch_contact(&self, contact_id: i64) -> Result<Contact, TransportError>;
}

pub struct FetchClient {
    source: Arc<dyn ProposalSource>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl FetchClient {
    pub fn new(
        source: Arc<dyn ProposalSource>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            source,
            limiter,
            retry,
        }
    }

    /// Fetch a proposal with its counterparty, contacts and (optionally)
    /// pricing content. Either the whole graph is returned or an error.
    #[tracing::instrument(
        name = "fetch.proposal",
        skip(self),
        fields(api = self.source.api_name(), blocks = tracing::field::Empty)
    )]
    pub async fn fetch_proposal(
        &self,
        proposal_id: i64,
        include_content: bool,
    ) -> Result<Proposal, FetchError> {
        let header = self
            .call(proposal_id, "fetch_header", || self.source.fetch_header(proposal_id))
            .await?;
        debug!(
            "[FetchClient] header for proposal {} (number {})",
            proposal_id, header.number
        );

        let counterparty_ref = header.counterparty_ref;
        let contact_ids: Vec<i64> = header.contact_ids.iter().copied().take(MAX_CONTACTS).collect();
        let mut proposal = Proposal::from_header(header);

        if proposal.counterparty.is_none() {
            if let Some(counterparty_id) = counterparty_ref {
                let counterparty = self
                    .call(proposal_id, "fetch_counterparty", || {
                        self.source.fetch_counterparty(counterparty_id)
                    })
                    .await?;
                proposal.counterparty = Some(counterparty);
            }
        }

        for contact_id in contact_ids {
            let contact = self
                .call(proposal_id, "fetch_contact", || self.source.fetch_contact(contact_id))
                .await?;
            proposal.contacts.push(contact);
        }

        if include_content {
            proposal.blocks = self
                .call(proposal_id, "fetch_content", || self.source.fetch_content(proposal_id))
                .await?;
        }

        Span::current().record("blocks", proposal.blocks.len());
        info!(
            "[FetchClient] fetched proposal {}: {} contact(s), {} content block(s)",
            proposal_id,
            proposal.contacts.len(),
            proposal.blocks.len()
        );
        Ok(proposal)
    }

    async fn call<T, F, Fut>(
        &self,
        proposal_id: i64,
        operation: &str,
        request: F,
    ) -> Result<T, FetchError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let limiter = &self.limiter;
        let api = self.source.api_name();
        let request = &request;
        self.retry
            .run(operation, move |_| async move {
                limiter.acquire(api).await;
                request().await
            })
            .await
            .map_err(|exhausted| {
                let err =
                    FetchError::from_transport(proposal_id, &exhausted.error, exhausted.attempts);
                error!("[FetchClient] {} failed: {}", operation, err);
                err
            })
    }
}
