//! Common test utilities for books-service integration tests.

use books_service::config::{BooksConfig, DatabaseConfig, ImportConfig};
use books_service::services::Database;
use books_service::startup::Application;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use service_core::config::Config as CommonConfig;
use std::sync::Once;
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,books_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub db: Database,
}

/// Spawn a test application over HTTP on a random port.
pub async fn spawn_app() -> TestApp {
    init_tracing();

    let database_url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set - use scripts/integ-tests.sh to run tests");

    let config = BooksConfig {
        common: CommonConfig { port: 0 },
        service_name: "books-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: database_url.clone(),
            max_connections: 2,
            min_connections: 1,
        },
        import: ImportConfig {
            session_ttl_secs: 3600,
            sweep_interval_secs: 300,
        },
    };

    let app = Application::build(config)
        .await
        .expect("Failed to build application");
    let address = format!("http://127.0.0.1:{}", app.port());

    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    // Separate pool for direct assertions against the ledger.
    let db = Database::new(&database_url, 2, 1)
        .await
        .expect("Failed to connect assertion pool");

    let client = reqwest::Client::new();

    // Wait for the server to accept requests.
    let mut attempts = 0;
    loop {
        match client.get(format!("{}/health", address)).send().await {
            Ok(_) => break,
            Err(_) if attempts < 20 => {
                attempts += 1;
                tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
            }
            Err(e) => panic!("Server did not come up after 20 attempts: {}", e),
        }
    }

    TestApp {
        address,
        client,
        db,
    }
}

impl TestApp {
    /// Create an account with a unique name; returns its id.
    pub async fn create_account(&self, account_type: &str) -> i64 {
        let name = format!("{}-{}", account_type, Uuid::new_v4());
        let response = self
            .client
            .post(format!("{}/accounts", self.address))
            .json(&json!({ "name": name, "account_type": account_type }))
            .send()
            .await
            .expect("Failed to create account");
        assert_eq!(response.status(), 201, "account creation failed");
        let body: Value = response.json().await.expect("Invalid account body");
        body["account_id"].as_i64().expect("No account_id")
    }

    /// Create an "other" counterparty with a unique name; returns (id, name).
    pub async fn create_counterparty(&self) -> (i64, String) {
        let name = format!("Counterparty {}", Uuid::new_v4());
        let response = self
            .client
            .post(format!("{}/names", self.address))
            .json(&json!({ "kind": "other", "name": name }))
            .send()
            .await
            .expect("Failed to create counterparty");
        assert_eq!(response.status(), 201, "counterparty creation failed");
        let body: Value = response.json().await.expect("Invalid counterparty body");
        (body["name_address_id"].as_i64().expect("No id"), name)
    }

    /// Post a document; panics unless the server accepts it. Returns the
    /// document id.
    pub async fn post_document(&self, body: Value) -> i64 {
        let response = self
            .client
            .post(format!("{}/documents", self.address))
            .json(&body)
            .send()
            .await
            .expect("Failed to post document");
        let status = response.status();
        let body: Value = response.json().await.expect("Invalid post response");
        assert!(
            status.is_success(),
            "posting failed with {}: {}",
            status,
            body
        );
        body["id"].as_i64().expect("No document id")
    }

    /// Raw posting request for failure-path tests.
    pub async fn try_post_document(&self, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}/documents", self.address))
            .json(&body)
            .send()
            .await
            .expect("Failed to send post request")
    }

    pub async fn get_document(&self, id: i64) -> Value {
        let response = self
            .client
            .get(format!("{}/documents/{}", self.address, id))
            .send()
            .await
            .expect("Failed to get document");
        assert_eq!(response.status(), 200);
        response.json().await.expect("Invalid document body")
    }

    /// Sum of all journal amounts for a document, straight from the ledger.
    pub async fn journal_sum(&self, document_id: i64) -> Decimal {
        sqlx::query_scalar::<_, Option<Decimal>>(
            "SELECT SUM(amount) FROM journals WHERE document_id = $1",
        )
        .bind(document_id)
        .fetch_one(self.db.pool())
        .await
        .expect("Failed to sum journals")
        .unwrap_or(Decimal::ZERO)
    }

    pub async fn journal_count(&self, document_id: i64) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM journals WHERE document_id = $1")
            .bind(document_id)
            .fetch_one(self.db.pool())
            .await
            .expect("Failed to count journals")
    }

    pub async fn audit_rows(&self, table: &str, record_id: i64) -> Vec<Value> {
        let response = self
            .client
            .get(format!(
                "{}/audit?table={}&record_id={}",
                self.address, table, record_id
            ))
            .send()
            .await
            .expect("Failed to query audit");
        assert_eq!(response.status(), 200);
        response.json().await.expect("Invalid audit body")
    }
}

/// A simple invoice posting request: one net line plus VAT.
pub fn invoice_request(
    receivable_id: i64,
    income_id: i64,
    name_address_id: i64,
    gross: &str,
    net: &str,
    vat: &str,
) -> Value {
    json!({
        "header": {
            "document_type": "invoice",
            "document_date": "2026-02-10",
            "account_id": receivable_id,
            "amount": gross,
            "name_address_id": name_address_id,
            "memo": "test invoice",
            "identifier": "INV-1"
        },
        "detail": [{
            "account_id": income_id,
            "amount": net,
            "vat_code": "S",
            "vat_rate": "20",
            "vat_amount": vat
        }]
    })
}
