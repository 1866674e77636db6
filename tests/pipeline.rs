//! End-to-end pipeline tests: keyword fallback → dispatch → filesystem,
//! plus boundary checks through the warp routes.  Everything runs offline
//! against a temporary data root.

use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use taskhand::classify::{fallback_call, FallbackDefaults};
use taskhand::config::Config;
use taskhand::dispatch::{self, RunContext};
use taskhand::embeddings::DisabledEmbeddingProvider;
use taskhand::ops::SidecarCardStore;
use taskhand::server::{routes, AppState};
use taskhand::StructuredCall;
use tempfile::tempdir;

const TEST_EMAIL: &str = "tester@example.com";

fn defaults(root: &Path) -> FallbackDefaults {
    FallbackDefaults {
        user_email: TEST_EMAIL.to_string(),
        data_root: root.display().to_string(),
    }
}

fn offline_ctx(root: &Path) -> RunContext {
    RunContext {
        account_email: TEST_EMAIL.to_string(),
        datagen_script: "datagen.py".to_string(),
        embeddings: Arc::new(DisabledEmbeddingProvider),
        cards: Arc::new(SidecarCardStore::new(root.join("credit_card.json"))),
    }
}

#[tokio::test]
async fn fallback_route_then_dispatch_counts_weekdays() {
    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join("dates.txt"),
        // Three Wednesdays, a Thursday, a Friday.
        "2023-01-04\n2023-01-11\n2023-01-18\n2023-01-05\n2023-01-06\n",
    )
    .unwrap();

    let task = "The file dates.txt has a list of dates; count the number of Wednesdays";
    let call = fallback_call(task, &defaults(dir.path()));
    assert_eq!(call.name.as_deref(), Some("A3"));

    let message = dispatch::run_task(task, call, &offline_ctx(dir.path()))
        .await
        .unwrap();
    assert!(message.starts_with("A3 Task"));
    assert!(message.contains(task));

    let written = std::fs::read_to_string(dir.path().join("dates-wednesdays.txt")).unwrap();
    assert_eq!(written, "3");
}

#[tokio::test]
async fn dispatch_sorts_contacts_end_to_end() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("contacts.json");
    let output = dir.path().join("contacts-sorted.json");
    std::fs::write(
        &input,
        json!([
            { "first_name": "Carol", "last_name": "Young" },
            { "first_name": "Alice", "last_name": "Young" },
            { "first_name": "Bob", "last_name": "Old" },
        ])
        .to_string(),
    )
    .unwrap();

    let call = StructuredCall {
        name: Some("A4".to_string()),
        arguments: json!({
            "filename": input.display().to_string(),
            "targetfile": output.display().to_string(),
        }),
    };
    dispatch::run_task("sort the contacts", call, &offline_ctx(dir.path()))
        .await
        .unwrap();

    let sorted: Vec<serde_json::Value> =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(sorted[0]["last_name"], "Old");
    assert_eq!(sorted[1]["first_name"], "Alice");
    assert_eq!(sorted[2]["first_name"], "Carol");
}

#[tokio::test]
async fn dispatch_runs_sql_with_null_coercion() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("ticket-sales.db");
    let output = dir.path().join("ticket-sales-gold.txt");

    let conn = rusqlite::Connection::open(&db).unwrap();
    conn.execute_batch(
        "CREATE TABLE tickets (type TEXT, units INTEGER, price REAL);
         INSERT INTO tickets VALUES ('Silver', 5, 10.0);",
    )
    .unwrap();
    drop(conn);

    let call = StructuredCall {
        name: Some("A10".to_string()),
        arguments: json!({
            "filename": db.display().to_string(),
            "output_filename": output.display().to_string(),
            "query": "SELECT SUM(units * price) FROM tickets WHERE type = 'Gold'",
        }),
    };
    dispatch::run_task("total the gold ticket sales", call, &offline_ctx(dir.path()))
        .await
        .unwrap();

    // No Gold rows: the SUM is NULL and coerces to "0".
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "0");
}

#[tokio::test]
async fn http_run_counts_weekdays_and_names_the_operation() {
    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join("dates.txt"),
        "2023-01-04\n2023-01-11\n2023-01-18\n2023-01-05\n2023-01-06\n",
    )
    .unwrap();

    let config = Config {
        api_token: None,
        data_root: dir.path().display().to_string(),
        ..Config::default()
    };
    let routes = routes(Arc::new(AppState::new(&config).unwrap()));

    let task = "The file dates.txt has a list of dates; count the number of Wednesdays";
    let resp = warp::test::request()
        .method("POST")
        .path(&format!("/run?task={}", task.replace(' ', "%20")))
        .reply(&routes)
        .await;

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
    let message = body["message"].as_str().unwrap();
    assert!(message.starts_with("A3"));
    assert!(message.contains("executed successfully"));

    assert_eq!(
        std::fs::read_to_string(dir.path().join("dates-wednesdays.txt")).unwrap(),
        "3"
    );
}

#[tokio::test]
async fn http_run_reports_handler_failure_as_400() {
    let dir = tempdir().unwrap();
    // No dates.txt — the A3 handler must fail, not the process.
    let config = Config {
        api_token: None,
        data_root: dir.path().display().to_string(),
        ..Config::default()
    };
    let routes = routes(Arc::new(AppState::new(&config).unwrap()));

    let resp = warp::test::request()
        .method("POST")
        .path("/run?task=count%20wednesdays%20in%20dates.txt")
        .reply(&routes)
        .await;

    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
    assert!(body["detail"].as_str().unwrap().contains("dates file"));
}

#[tokio::test]
async fn http_read_roundtrip_and_404() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("artifact.txt");
    std::fs::write(&file, "42").unwrap();

    let config = Config {
        api_token: None,
        data_root: dir.path().display().to_string(),
        ..Config::default()
    };
    let routes = routes(Arc::new(AppState::new(&config).unwrap()));

    let ok = warp::test::request()
        .method("GET")
        .path(&format!("/read?path={}", file.display()))
        .reply(&routes)
        .await;
    assert_eq!(ok.status(), 200);
    assert_eq!(ok.body(), "42");

    let missing = warp::test::request()
        .method("GET")
        .path(&format!("/read?path={}", dir.path().join("absent.txt").display()))
        .reply(&routes)
        .await;
    assert_eq!(missing.status(), 404);
}
