//! Sync orchestrator.
//!
//! Drives one proposal through fetch, parse, transform and upsert. A failed
//! fetch ends the run with a failed report and no table results; anything
//! after that is collected per table and the run carries on.

use std::sync::Arc;

use chrono::NaiveDate;
use quotesync_api::{SyncJob, SyncReport};
use tokio::time::Instant;
use tracing::{info, warn, Span};
use uuid::Uuid;

use crate::config::{ConfigError, EngineConfig, TableConfig};
use crate::parser::ContentParser;
use crate::rate_limiter::RateLimiter;
use crate::source::{FetchClient, ProposalSource};
use crate::store::RecordStore;
use crate::sync_client::TargetSyncClient;
use crate::transform::RecordTransformer;

pub struct SyncOrchestrator {
    fetch: FetchClient,
    parser: ContentParser,
    transformer: RecordTransformer,
    sync: TargetSyncClient,
    tables: Vec<TableConfig>,
    include_content: bool,
    fixed_today: Option<NaiveDate>,
}

impl SyncOrchestrator {
    /// Wire the pipeline from `config`. The limiter is shared with every
    /// other orchestrator of the process talking to the same APIs.
    pub fn new(
        config: &EngineConfig,
        source: Arc<dyn ProposalSource>,
        store: Arc<dyn RecordStore>,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            fetch: FetchClient::new(source, limiter.clone(), config.retry),
            parser: ContentParser::from_config(&config.parser)?,
            transformer: RecordTransformer::from_config(config),
            sync: TargetSyncClient::new(store, limiter, config.retry, &config.sync),
            tables: config.tables.clone(),
            include_content: config.include_content,
            fixed_today: None,
        })
    }

    /// Pin the date used for "today" derivations.
    pub fn with_fixed_today(mut self, today: NaiveDate) -> Self {
        self.fixed_today = Some(today);
        self
    }

    /// Sync one proposal under a fresh correlation id.
    pub async fn process(&self, proposal_id: i64) -> SyncReport {
        let job = SyncJob {
            proposal_id,
            correlation_id: Uuid::new_v4().to_string(),
        };
        self.process_job(&job).await
    }

    #[tracing::instrument(
        name = "sync.process",
        skip(self, job),
        fields(
            proposal_id = job.proposal_id,
            correlation_id = %job.correlation_id,
            success = tracing::field::Empty
        )
    )]
    pub async fn process_job(&self, job: &SyncJob) -> SyncReport {
        let started = Instant::now();
        info!("[Orchestrator] processing proposal {}", job.proposal_id);

        let proposal = match self
            .fetch
            .fetch_proposal(job.proposal_id, self.include_content)
            .await
        {
            Ok(proposal) => proposal,
            Err(err) => {
                warn!("[Orchestrator] aborting run: {}", err);
                let report = SyncReport::fetch_failed(&job.correlation_id, &err)
                    .finish(elapsed_ms(started));
                Span::current().record("success", false);
                return report;
            }
        };

        let mut report = SyncReport::new(&job.correlation_id, job.proposal_id);
        report.proposal_number = Some(proposal.number.clone());

        let parsed = self.parser.parse(&proposal.blocks, &proposal.number);
        report.element_count = parsed.elements.len();
        report
            .warnings
            .extend(parsed.warnings.iter().map(ToString::to_string));

        let today = self
            .fixed_today
            .unwrap_or_else(|| chrono::Local::now().date_naive());
        let output = self
            .transformer
            .transform(&proposal, &parsed.elements, &self.tables, today);
        report.warnings.extend(output.warnings);

        for batch in &output.tables {
            if batch.records.is_empty() {
                continue;
            }
            let result = self.sync.upsert(batch).await;
            report.add_table_result(result);
        }

        let report = report.finish(elapsed_ms(started));
        Span::current().record("success", report.success);
        info!(
            "[Orchestrator] proposal {} done: success={}, elements={}, records={}, errors={}, {} ms",
            job.proposal_id,
            report.success,
            report.element_count,
            report.total_records(),
            report.errors.len(),
            report.duration_ms
        );
        report
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
