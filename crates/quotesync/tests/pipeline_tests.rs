//! End-to-end runs of the orchestrator against the in-memory fakes.

use std::sync::Arc;

use chrono::NaiveDate;
use quotesync::testing::{fixtures, FakeProposalSource, MemoryRecordStore};
use quotesync::{EngineConfig, RateLimiter, SyncOrchestrator};
use quotesync_api::{ContentBlock, ErrorKind, Money, SyncJob, TransportError};
use serde_json::json;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()
}

fn source_with(blocks: Vec<ContentBlock>) -> Arc<FakeProposalSource> {
    Arc::new(
        FakeProposalSource::new()
            .with_proposal(fixtures::header(), blocks)
            .with_counterparty(fixtures::COUNTERPARTY_ID, fixtures::counterparty())
            .with_contact(fixtures::contact()),
    )
}

fn orchestrator(
    source: Arc<FakeProposalSource>,
    store: Arc<MemoryRecordStore>,
) -> SyncOrchestrator {
    let config = EngineConfig::embedded().unwrap();
    SyncOrchestrator::new(&config, source, store, Arc::new(RateLimiter::unlimited()))
        .unwrap()
        .with_fixed_today(today())
}

#[tokio::test(start_paused = true)]
async fn full_run_populates_every_table() {
    let mut blocks = fixtures::window_blocks(2);
    blocks.push(fixtures::door_block(2));
    let store = Arc::new(MemoryRecordStore::new());
    let report = orchestrator(source_with(blocks), store.clone())
        .process(fixtures::PROPOSAL_ID)
        .await;

    assert!(report.success, "errors: {:?}", report.errors);
    assert_eq!(report.proposal_number.as_deref(), Some(fixtures::PROPOSAL_NUMBER));
    assert_eq!(report.element_count, 3);
    assert_eq!(report.per_table.len(), 9);
    assert_eq!(report.per_table["deur_specificaties"].created, 1);
    assert_eq!(report.per_table["facturatie"].created, 3);
    assert_eq!(report.per_table["subproducten"].created, 2);
    assert_eq!(report.total_records(), report.total_created());
    assert!(uuid::Uuid::parse_str(&report.correlation_id).is_ok());

    let portal = store.records("Klantenportaal");
    assert_eq!(portal.len(), 1);
    assert_eq!(portal[0].fields["Offorte ID"], json!("4711"));
    assert_eq!(portal[0].fields["Klantnaam"], json!("Fam. de Vries"));

    let doors = store.records("Deur Specificaties");
    assert_eq!(doors[0].fields["Element ID Ref"], json!("2025-0042-E3"));
    assert_eq!(doors[0].fields["Breedte (mm)"], json!(1000));
}

#[tokio::test(start_paused = true)]
async fn second_run_creates_nothing() {
    let store = Arc::new(MemoryRecordStore::new());
    let orchestrator = orchestrator(source_with(fixtures::window_blocks(3)), store.clone());

    let first = orchestrator.process(fixtures::PROPOSAL_ID).await;
    let rows_after_first = store.record_count("Elementen Overzicht");
    let second = orchestrator.process(fixtures::PROPOSAL_ID).await;

    assert!(first.success && second.success);
    assert!(first.total_created() > 0);
    assert_eq!(second.total_created(), 0);
    assert_eq!(second.total_records(), first.total_records());
    assert_eq!(store.record_count("Elementen Overzicht"), rows_after_first);
    assert_ne!(first.correlation_id, second.correlation_id);
}

#[tokio::test(start_paused = true)]
async fn eight_elements_estimate_144_minutes() {
    let store = Arc::new(MemoryRecordStore::new());
    let report = orchestrator(source_with(fixtures::window_blocks(8)), store.clone())
        .process(fixtures::PROPOSAL_ID)
        .await;

    assert_eq!(report.element_count, 8);
    let planning = store.records("Inmeetplanning");
    assert_eq!(planning.len(), 1);
    assert_eq!(planning[0].fields["Geschatte Minuten"], json!(144));
    assert_eq!(planning[0].fields["Klant & Stad"], json!("Fam. de Vries - Zwolle"));
    assert_eq!(planning[0].fields["Projectstatus"], json!("Te Plannen"));
}

#[tokio::test(start_paused = true)]
async fn invoices_follow_the_payment_schedule() {
    let store = Arc::new(MemoryRecordStore::new());
    orchestrator(source_with(fixtures::window_blocks(1)), store.clone())
        .process(fixtures::PROPOSAL_ID)
        .await;

    let invoices = store.records("Facturatie");
    let amounts: Vec<_> = invoices.iter().map(|r| r.fields["Bedrag"].clone()).collect();
    assert_eq!(amounts, vec![json!(13500.0), json!(29250.0), json!(2250.0)]);
    let due: Vec<_> = invoices.iter().map(|r| r.fields["Vervaldatum"].clone()).collect();
    assert_eq!(due, vec![json!("2025-02-01"), json!("2025-02-01"), json!("2025-04-02")]);
    let total: Money = [1350000, 2925000, 225000].into_iter().map(Money::from_cents).sum();
    assert_eq!(total, fixtures::header().total);
}

#[tokio::test(start_paused = true)]
async fn fetch_failure_aborts_without_table_results() {
    let source = source_with(fixtures::window_blocks(2));
    source.fail_always(TransportError::from_status(500, "internal error"));
    let store = Arc::new(MemoryRecordStore::new());

    let job = SyncJob {
        proposal_id: fixtures::PROPOSAL_ID,
        correlation_id: "job-1".into(),
    };
    let report = orchestrator(source.clone(), store.clone()).process_job(&job).await;

    assert!(!report.success);
    assert!(report.per_table.is_empty());
    assert_eq!(report.correlation_id, "job-1");
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, ErrorKind::Fetch);
    assert_eq!(source.call_count(), 4);
    assert!(report.duration_ms >= 14_000);
    assert!(store.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn a_failing_table_does_not_stop_the_others() {
    // Destination refuses the element type used by every window.
    let store = Arc::new(MemoryRecordStore::new().with_choices(
        "Elementen Overzicht",
        "Hoofdproduct Type",
        &["Deur"],
    ));
    let report = orchestrator(source_with(fixtures::window_blocks(2)), store.clone())
        .process(fixtures::PROPOSAL_ID)
        .await;

    assert!(!report.success);
    assert_eq!(report.per_table["elementen_overzicht"].failed, 2);
    assert!(report
        .errors
        .iter()
        .all(|e| e.kind == ErrorKind::Validation
            && e.table_name.as_deref() == Some("elementen_overzicht")));
    assert_eq!(report.per_table["facturatie"].created, 3);
    assert_eq!(store.record_count("Facturatie"), 3);
}

#[tokio::test(start_paused = true)]
async fn proposal_without_content_still_syncs_header_tables() {
    let store = Arc::new(MemoryRecordStore::new());
    let report = orchestrator(source_with(Vec::new()), store.clone())
        .process(fixtures::PROPOSAL_ID)
        .await;

    assert!(report.success);
    assert_eq!(report.element_count, 0);
    assert!(!report.per_table.contains_key("elementen_overzicht"));
    assert_eq!(report.per_table["klantenportaal"].created, 1);
    let planning = store.records("Inmeetplanning");
    assert_eq!(planning[0].fields["Geschatte Minuten"], json!(0));
}

#[tokio::test(start_paused = true)]
async fn configured_limits_space_destination_calls() {
    let config = EngineConfig::embedded().unwrap();
    let limiter = Arc::new(config.rate_limiter());
    let store = Arc::new(MemoryRecordStore::new());
    let orchestrator = SyncOrchestrator::new(
        &config,
        source_with(fixtures::window_blocks(2)),
        store.clone(),
        limiter,
    )
    .unwrap()
    .with_fixed_today(today());

    let report = orchestrator.process(fixtures::PROPOSAL_ID).await;

    assert!(report.success);
    // 200 ms between consecutive destination calls
    let calls = store.calls().len() as u64;
    assert!(calls >= 16);
    assert!(report.duration_ms >= (calls - 1) * 200);
}
