use std::sync::Arc;

use quotesync::{FetchClient, ProposalSource, RateLimiter, RetryPolicy};
use quotesync_api::{FetchErrorKind, Money, TransportErrorKind};
use quotesync_connectors::OfforteClient;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn proposal_json() -> serde_json::Value {
    json!({
        "id": 4711,
        "proposal_nr": "2025-0042",
        "name": "Kozijnen woning de Vries",
        "status": "won",
        "price_total": "45000.00",
        "company_id": "900",
        "contact_ids": [501],
        "won_at": "2025-02-01 09:30:00",
        "account_user_name": "Sanne Bakker"
    })
}

async fn client(server: &MockServer) -> OfforteClient {
    OfforteClient::with_base_url(&format!("{}/acme", server.uri()), "test-key").unwrap()
}

#[tokio::test]
async fn fetch_header_sends_bearer_and_decodes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/acme/proposals/4711"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(proposal_json()))
        .expect(1)
        .mount(&server)
        .await;

    let header = client(&server).await.fetch_header(4711).await.unwrap();

    assert_eq!(header.number, "2025-0042");
    assert_eq!(header.total, Money::from_cents(4_500_000));
    assert_eq!(header.counterparty_ref, Some(900));
    assert_eq!(header.owner_name.as_deref(), Some("Sanne Bakker"));
}

#[tokio::test]
async fn content_is_flattened_into_blocks() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/acme/proposals/4711/content"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "pricetables": [{
                "title": "Voordeur",
                "rows": [
                    { "product_name": "Kunststof voordeur", "content": "<p>Voordeur 1000 x 2300 mm</p>", "price": "2450.00" },
                    { "product_name": "Cilinder", "price": "45", "quantity": "2" }
                ]
            }]
        })))
        .mount(&server)
        .await;

    let blocks = client(&server).await.fetch_content(4711).await.unwrap();

    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].unit_price, Money::from_cents(245_000));
    assert_eq!(blocks[1].quantity, 2.0);
    assert_eq!(blocks[1].group_title.as_deref(), Some("Voordeur"));
}

#[tokio::test]
async fn company_and_contact_lookups() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/acme/companies/900"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 900, "name": "Fam. de Vries", "city": "Zwolle", "zipcode": "8011 AB"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/acme/contacts/501"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "501", "fullname": "Jan de Vries", "email": "jan@devries.nl"
        })))
        .mount(&server)
        .await;

    let client = client(&server).await;
    let company = client.fetch_counterparty(900).await.unwrap();
    let contact = client.fetch_contact(501).await.unwrap();

    assert_eq!(company.city.as_deref(), Some("Zwolle"));
    assert_eq!(contact.name, "Jan de Vries");
}

#[tokio::test]
async fn status_codes_map_to_error_kinds() {
    let server = MockServer::start().await;
    for (id, status) in [(1, 401), (2, 404), (3, 429), (4, 500)] {
        Mock::given(method("GET"))
            .and(path(format!("/acme/proposals/{id}")))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;
    }
    let client = client(&server).await;

    let kinds: Vec<TransportErrorKind> = collect_kinds(&client, &[1, 2, 3, 4]).await;
    assert_eq!(
        kinds,
        vec![
            TransportErrorKind::Unauthorized,
            TransportErrorKind::NotFound,
            TransportErrorKind::RateLimited,
            TransportErrorKind::Server,
        ]
    );
}

async fn collect_kinds(client: &OfforteClient, ids: &[i64]) -> Vec<TransportErrorKind> {
    let mut kinds = Vec::new();
    for id in ids {
        kinds.push(client.fetch_header(*id).await.unwrap_err().kind);
    }
    kinds
}

#[tokio::test]
async fn malformed_payload_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/acme/proposals/7"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = client(&server).await.fetch_header(7).await.unwrap_err();
    assert_eq!(err.kind, TransportErrorKind::Decode);
}

#[tokio::test]
async fn fetch_client_retries_server_errors_against_offorte() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/acme/proposals/4711"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/acme/proposals/4711"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 4711, "proposal_nr": "2025-0042", "price_total": 100
        })))
        .mount(&server)
        .await;

    let retry = RetryPolicy {
        max_retries: 2,
        base_delay_ms: 10,
    };
    let fetch = FetchClient::new(
        Arc::new(client(&server).await),
        Arc::new(RateLimiter::unlimited()),
        retry,
    );
    let proposal = fetch.fetch_proposal(4711, false).await.unwrap();
    assert_eq!(proposal.number, "2025-0042");
}

#[tokio::test]
async fn unknown_proposal_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/acme/proposals/99"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let fetch = FetchClient::new(
        Arc::new(client(&server).await),
        Arc::new(RateLimiter::unlimited()),
        RetryPolicy::default(),
    );
    let err = fetch.fetch_proposal(99, true).await.unwrap_err();
    assert_eq!(err.kind, FetchErrorKind::NotFound);
    assert_eq!(err.attempts, 1);
}
