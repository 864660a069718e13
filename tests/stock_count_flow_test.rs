mod common;

use axum::http::{Method, StatusCode};
use common::{data, text_body, TestApp};
use serde_json::{json, Value};

const ZONE_A_CSV: &str = "\
Bin ID,Product Code,Product Name,Unit,Quantity
A1-1,P-001,Copy Paper A4,REAM,10
A1-1,P-002,Copy Paper A3,REAM,4
A1-2,P-001,Copy Paper A4,REAM,6
A2-1,P-003,Toner,EA,2
A2-1,P-004,Staples,BOX,8
B1-1,P-001,Copy Paper A4,REAM,50
";

async fn zone_id(app: &TestApp, name: &str) -> Value {
    let zones = data(
        app.request_authenticated(Method::GET, "/api/v1/zones", None)
            .await,
    )
    .await;
    zones
        .as_array()
        .unwrap()
        .iter()
        .find(|z| z["name"] == name)
        .map(|z| z["id"].clone())
        .expect("zone exists")
}

async fn start(app: &TestApp, name: &str, zones: Vec<Value>) -> axum::response::Response {
    app.request_authenticated(
        Method::POST,
        "/api/v1/stock-counts",
        Some(json!({ "name": name, "month": 10, "year": 2026, "zone_ids": zones })),
    )
    .await
}

fn item<'a>(view: &'a Value, bin_code: &str, product_code: &str) -> &'a Value {
    view["bins"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|b| b["bin_code"] == bin_code)
        .flat_map(|b| b["items"].as_array().unwrap().iter())
        .find(|i| i["product_code"] == product_code)
        .expect("count item")
}

async fn count_item(app: &TestApp, item_id: &Value, qty: i32) -> axum::response::Response {
    app.request_authenticated(
        Method::PUT,
        &format!("/api/v1/stock-counts/items/{}", item_id.as_str().unwrap()),
        Some(json!({ "counted_qty": qty })),
    )
    .await
}

async fn qty_in(app: &TestApp, bin_code: &str, product_code: &str) -> Option<i64> {
    let bin = data(
        app.request_authenticated(Method::GET, &format!("/api/v1/bins/{}", bin_code), None)
            .await,
    )
    .await;
    bin["contents"]
        .as_array()
        .unwrap()
        .iter()
        .find(|l| l["product_code"] == product_code)
        .and_then(|l| l["qty"].as_i64())
}

#[tokio::test]
async fn full_count_cycle_applies_variances() {
    let app = TestApp::new().await;
    app.import(ZONE_A_CSV).await;
    let zone_a = zone_id(&app, "A").await;

    let response = start(&app, "October A", vec![zone_a.clone()]).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let count = data(response).await;
    assert_eq!(count["status"], "in_progress");
    assert_eq!(count["total_items"], 5);
    assert_eq!(count["counted_items"], 0);
    let count_id = count["id"].as_str().unwrap().to_string();
    let zone_count_id = count["zones"][0]["id"].as_str().unwrap().to_string();

    let items_uri = format!("/api/v1/stock-counts/zones/{}/items", zone_count_id);
    let view = data(app.request_authenticated(Method::GET, &items_uri, None).await).await;
    assert_eq!(view["bins"].as_array().unwrap().len(), 3);
    assert_eq!(item(&view, "A1-1", "P-001")["system_qty"], 10);

    // Over, under and exact
    let response = count_item(&app, &item(&view, "A1-1", "P-001")["id"], 12).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(data(response).await["variance"], 2);
    count_item(&app, &item(&view, "A1-2", "P-001")["id"], 3).await;
    count_item(&app, &item(&view, "A2-1", "P-004")["id"], 8).await;

    // Found on the shelf but not in the snapshot
    let a1_bin = item(&view, "A1-1", "P-001")["bin_id"].clone();
    let response = app
        .request_authenticated(
            Method::POST,
            &items_uri,
            Some(json!({
                "product": { "product_code": "P-009", "product_name": "Envelopes" },
                "bin_id": a1_bin,
                "counted_qty": 7
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let extra = data(response).await;
    assert_eq!(extra["is_unexpected"], true);
    assert_eq!(extra["system_qty"], 0);

    let variance = data(
        app.request_authenticated(
            Method::GET,
            &format!("/api/v1/stock-counts/{}/variance", count_id),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(variance["discrepancies"].as_array().unwrap().len(), 3);
    assert_eq!(variance["uncounted"].as_array().unwrap().len(), 2);
    assert_eq!(variance["summary"]["total_items"], 6);
    assert_eq!(variance["summary"]["counted"], 4);
    assert_eq!(variance["summary"]["net_variance"], 6);

    let response = app
        .request_authenticated(
            Method::POST,
            &format!("/api/v1/stock-counts/{}/complete", count_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let summary = data(response).await;
    assert_eq!(summary["adjustments"], 3);
    assert_eq!(summary["net_variance"], 6);

    assert_eq!(qty_in(&app, "A1-1", "P-001").await, Some(12));
    assert_eq!(qty_in(&app, "A1-2", "P-001").await, Some(3));
    assert_eq!(qty_in(&app, "A1-1", "P-009").await, Some(7));
    // Uncounted items keep their quantity
    assert_eq!(qty_in(&app, "A2-1", "P-003").await, Some(2));
    // Other zones untouched
    assert_eq!(qty_in(&app, "B1-1", "P-001").await, Some(50));

    let activity = data(
        app.request_authenticated(
            Method::GET,
            "/api/v1/inventory/activity?action=count_adjust",
            None,
        )
        .await,
    )
    .await;
    assert_eq!(activity.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn count_report_downloads_as_csv() {
    let app = TestApp::new().await;
    app.import(ZONE_A_CSV).await;
    let zone_a = zone_id(&app, "A").await;

    let count = data(start(&app, "Export test", vec![zone_a]).await).await;
    let count_id = count["id"].as_str().unwrap().to_string();
    let zone_count_id = count["zones"][0]["id"].as_str().unwrap().to_string();
    let view = data(
        app.request_authenticated(
            Method::GET,
            &format!("/api/v1/stock-counts/zones/{}/items", zone_count_id),
            None,
        )
        .await,
    )
    .await;
    count_item(&app, &item(&view, "A1-1", "P-001")["id"], 12).await;

    let response = app
        .request_authenticated(
            Method::GET,
            &format!("/api/v1/stock-counts/{}/export", count_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response.headers()["content-disposition"]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("StockCount_Export_test_"));
    assert!(disposition.ends_with(".csv\""));

    let body = text_body(response).await;
    let report = body.strip_prefix('\u{feff}').expect("leading BOM");
    let mut reader = csv::Reader::from_reader(report.as_bytes());
    let headers = reader.headers().unwrap().clone();
    assert_eq!(&headers[0], "Product Code");
    assert_eq!(&headers[11], "Counted At");

    let records: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
    assert_eq!(records.len(), 5);
    let bins: Vec<&str> = records.iter().map(|r| &r[4]).collect();
    assert_eq!(bins, ["A1-1", "A1-1", "A1-2", "A2-1", "A2-1"]);

    let counted = &records[0];
    assert_eq!(&counted[0], "P-001");
    assert_eq!(&counted[6], "10");
    assert_eq!(&counted[7], "12");
    assert_eq!(&counted[8], "2");
    assert_eq!(&counted[9], "Counted");
    assert_eq!(&counted[10], "Test Admin");
    assert!(!counted[11].is_empty());

    let pending = &records[1];
    assert_eq!(&pending[0], "P-002");
    assert_eq!(&pending[7], "");
    assert_eq!(&pending[8], "");
    assert_eq!(&pending[9], "Not Counted");
    assert_eq!(&pending[10], "");

    let missing = app
        .request_authenticated(
            Method::GET,
            &format!("/api/v1/stock-counts/{}/export", uuid::Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn completed_count_is_frozen() {
    let app = TestApp::new().await;
    app.import(ZONE_A_CSV).await;
    let zone_a = zone_id(&app, "A").await;

    let count = data(start(&app, "Frozen", vec![zone_a.clone()]).await).await;
    let count_id = count["id"].as_str().unwrap().to_string();
    let zone_count_id = count["zones"][0]["id"].as_str().unwrap().to_string();
    let view = data(
        app.request_authenticated(
            Method::GET,
            &format!("/api/v1/stock-counts/zones/{}/items", zone_count_id),
            None,
        )
        .await,
    )
    .await;
    let item_id = item(&view, "A1-1", "P-001")["id"].clone();

    let complete_uri = format!("/api/v1/stock-counts/{}/complete", count_id);
    let first = app
        .request_authenticated(Method::POST, &complete_uri, None)
        .await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .request_authenticated(Method::POST, &complete_uri, None)
        .await;
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);

    let late = count_item(&app, &item_id, 99).await;
    assert_eq!(late.status(), StatusCode::BAD_REQUEST);
    assert_eq!(qty_in(&app, "A1-1", "P-001").await, Some(10));

    let detail = data(
        app.request_authenticated(
            Method::GET,
            &format!("/api/v1/stock-counts/{}", count_id),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(detail["status"], "completed");
    assert!(detail["completed_at"].is_string());

    // The zone is free again once the count is closed
    let again = start(&app, "Next month", vec![zone_a]).await;
    assert_eq!(again.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn zone_cannot_join_two_open_counts() {
    let app = TestApp::new().await;
    app.import(ZONE_A_CSV).await;
    let zone_a = zone_id(&app, "A").await;
    let zone_b = zone_id(&app, "B").await;

    let first = start(&app, "First", vec![zone_a.clone()]).await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let clash = start(&app, "Second", vec![zone_b.clone(), zone_a]).await;
    assert_eq!(clash.status(), StatusCode::CONFLICT);

    let ok = start(&app, "Only B", vec![zone_b]).await;
    assert_eq!(ok.status(), StatusCode::CREATED);

    let open = data(
        app.request_authenticated(
            Method::GET,
            "/api/v1/stock-counts?status=in_progress",
            None,
        )
        .await,
    )
    .await;
    assert_eq!(open.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn open_count_gauge_is_seeded_from_database() {
    let app = TestApp::new().await;
    app.import(ZONE_A_CSV).await;
    let zone_a = zone_id(&app, "A").await;
    let zone_b = zone_id(&app, "B").await;

    start(&app, "Open", vec![zone_a]).await;
    let closed = data(start(&app, "Closed", vec![zone_b]).await).await;
    app.request_authenticated(
        Method::POST,
        &format!(
            "/api/v1/stock-counts/{}/complete",
            closed["id"].as_str().unwrap()
        ),
        None,
    )
    .await;

    let open = app
        .state
        .services
        .stock_counts
        .sync_open_gauge()
        .await
        .unwrap();
    assert_eq!(open, 1);
}

#[tokio::test]
async fn deleting_a_count_releases_its_zones() {
    let app = TestApp::new().await;
    app.import(ZONE_A_CSV).await;
    let zone_a = zone_id(&app, "A").await;

    let count = data(start(&app, "Mistake", vec![zone_a.clone()]).await).await;
    let count_uri = format!("/api/v1/stock-counts/{}", count["id"].as_str().unwrap());

    let deleted = app
        .request_authenticated(Method::DELETE, &count_uri, None)
        .await;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let gone = app
        .request_authenticated(Method::GET, &count_uri, None)
        .await;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);

    let again = start(&app, "Retry", vec![zone_a]).await;
    assert_eq!(again.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn unknown_zone_is_rejected() {
    let app = TestApp::new().await;
    let response = start(&app, "Ghost", vec![json!(uuid::Uuid::new_v4())]).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
