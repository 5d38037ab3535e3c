//! Fake quoting platform.
//!
//! Serves proposals registered up front. Failures can be queued for the next
//! N calls or made permanent, and every call is timestamped so tests can
//! check retry and rate limit spacing under a paused clock.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use quotesync_api::{
    Contact, ContentBlock, Counterparty, ProposalHeader, TransportError, TransportErrorKind,
};
use tokio::time::Instant;

use crate::source::ProposalSource;

#[derive(Default)]
struct SourceState {
    headers: HashMap<i64, ProposalHeader>,
    content: HashMap<i64, Vec<ContentBlock>>,
    counterparties: HashMap<i64, Counterparty>,
    contacts: HashMap<i64, Contact>,
    queued_failures: VecDeque<TransportError>,
    permanent_failure: Option<TransportError>,
    calls: Vec<(String, Instant)>,
}

pub struct FakeProposalSource {
    api_name: String,
    state: Mutex<SourceState>,
}

impl Default for FakeProposalSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeProposalSource {
    pub fn new() -> Self {
        Self {
            api_name: "offorte".to_string(),
            state: Mutex::new(SourceState::default()),
        }
    }

    pub fn with_api_name(mut self, api_name: impl Into<String>) -> Self {
        self.api_name = api_name.into();
        self
    }

    pub fn with_proposal(self, header: ProposalHeader, blocks: Vec<ContentBlock>) -> Self {
        {
            let mut state = self.state();
            state.content.insert(header.id, blocks);
            state.headers.insert(header.id, header);
        }
        self
    }

    pub fn with_counterparty(self, id: i64, counterparty: Counterparty) -> Self {
        self.state().counterparties.insert(id, counterparty);
        self
    }

    pub fn with_contact(self, contact: Contact) -> Self {
        self.state().contacts.insert(contact.id, contact);
        self
    }

    /// Fail the next `count` calls with `error`.
    pub fn fail_next(&self, count: usize, error: TransportError) {
        let mut state = self.state();
        for _ in 0..count {
            state.queued_failures.push_back(error.clone());
        }
    }

    /// Fail every call from now on.
    pub fn fail_always(&self, error: TransportError) {
        self.state().permanent_failure = Some(error);
    }

    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    /// Operation names in call order.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.iter().map(|(op, _)| op.clone()).collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.state().calls.iter().map(|(_, at)| *at).collect()
    }

    fn state(&self) -> MutexGuard<'_, SourceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, operation: &str) -> Result<MutexGuard<'_, SourceState>, TransportError> {
        let mut state = self.state();
        state.calls.push((operation.to_string(), Instant::now()));
        if let Some(err) = state.permanent_failure.clone() {
            return Err(err);
        }
        if let Some(err) = state.queued_failures.pop_front() {
            return Err(err);
        }
        Ok(state)
    }
}

fn not_found(what: &str, id: i64) -> TransportError {
    TransportError::new(TransportErrorKind::NotFound, format!("{what} {id} not found"))
}

#[async_trait]
impl ProposalSource for FakeProposalSource {
    fn api_name(&self) -> &str {
        &self.api_name
    }

    async fn fetch_header(&self, proposal_id: i64) -> Result<ProposalHeader, TransportError> {
        let state = self.begin("fetch_header")?;
        state
            .headers
            .get(&proposal_id)
            .cloned()
            .ok_or_else(|| not_found("proposal", proposal_id))
    }

    async fn fetch_content(&self, proposal_id: i64) -> Result<Vec<ContentBlock>, TransportError> {
        let state = self.begin("fetch_content")?;
        state
            .content
            .get(&proposal_id)
            .cloned()
            .ok_or_else(|| not_found("proposal", proposal_id))
    }

    async fn fetch_counterparty(
        &self,
        counterparty_id: i64,
    ) -> Result<Counterparty, TransportError> {
        let state = self.begin("fetch_counterparty")?;
        state
            .counterparties
            .get(&counterparty_id)
            .cloned()
            .ok_or_else(|| not_found("company", counterparty_id))
    }

    async fn fetch_contact(&self, contact_id: i64) -> Result<Contact, TransportError> {
        let state = self.begin("fetch_contact")?;
        state
            .contacts
            .get(&contact_id)
            .cloned()
            .ok_or_else(|| not_found("contact", contact_id))
    }
}
