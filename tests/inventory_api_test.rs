mod common;

use axum::http::{Method, StatusCode};
use binstock_api::entities::user::UserRole;
use common::{data, json_body, text_body, TestApp};
use serde_json::{json, Value};

const SAMPLE_CSV: &str = "\
Bin ID,Product Code,Product Name,Unit,NS Code,NS Name,NS SubGroup,Quantity
A1-1,P-001,Copy Paper A4,REAM,NS-1,Paper,Office,10
OB_Cutsize,P-002,Cutsize 80gsm,BOX,,,,20
";

async fn inventory_lines(app: &TestApp) -> Vec<Value> {
    let response = app
        .request_authenticated(Method::GET, "/api/v1/inventory?limit=100", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = data(response).await;
    page["items"].as_array().cloned().unwrap_or_default()
}

fn line<'a>(lines: &'a [Value], bin_code: &str, product_code: &str) -> Option<&'a Value> {
    lines
        .iter()
        .find(|l| l["bin_code"] == bin_code && l["product_code"] == product_code)
}

#[tokio::test]
async fn import_creates_products_bins_and_records() {
    let app = TestApp::new().await;

    let summary = app.import(SAMPLE_CSV).await;
    assert_eq!(summary["rows_total"], 2);
    assert_eq!(summary["products_created"], 2);
    assert_eq!(summary["bins_created"], 2);
    assert_eq!(summary["inventory_updated"], 2);
    assert_eq!(summary["errors_count"], 0);

    let lines = inventory_lines(&app).await;
    assert_eq!(lines.len(), 2);
    let a1 = line(&lines, "A1-1", "P-001").expect("A1-1 record");
    assert_eq!(a1["zone"], "A");
    assert_eq!(a1["qty"], 10);
    let cutsize = line(&lines, "OB_Cutsize", "P-002").expect("OB_Cutsize record");
    assert_eq!(cutsize["zone"], "Cutsize");
    assert_eq!(cutsize["qty"], 20);
    // Missing NS code falls back to the product code
    assert_eq!(cutsize["ns_code"], "P-002");
}

#[tokio::test]
async fn import_sums_duplicate_rows_and_reimport_overwrites() {
    let app = TestApp::new().await;

    let csv = "\
Bin ID,Product Code,Product Name,Unit,Quantity
A1-1,P-001,Widget,EA,4
A1-1,P-001,Widget,EA,6
B2-1,P-001,Widget,EA,1
";
    let summary = app.import(csv).await;
    // Test config uses batches of two rows
    assert_eq!(summary["batches"], 2);
    let lines = inventory_lines(&app).await;
    assert_eq!(line(&lines, "A1-1", "P-001").unwrap()["qty"], 10);

    // A fresh import replaces rather than adds
    app.import("Bin ID,Product Code,Quantity\nA1-1,P-001,3\n").await;
    let lines = inventory_lines(&app).await;
    assert_eq!(line(&lines, "A1-1", "P-001").unwrap()["qty"], 3);
    assert_eq!(line(&lines, "B2-1", "P-001").unwrap()["qty"], 1);
}

#[tokio::test]
async fn import_without_required_columns_is_rejected() {
    let app = TestApp::new().await;
    let response = app
        .upload_csv("Product Code,Quantity\nP-001,3\n", app.token())
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["message"].as_str().unwrap().contains("bin_code"));
    assert!(inventory_lines(&app).await.is_empty());
}

#[tokio::test]
async fn move_transfers_stock_and_conserves_total() {
    let app = TestApp::new().await;
    app.import(SAMPLE_CSV).await;
    app.import("Bin ID,Product Code,Quantity\nB1-1,P-003,1\n").await;

    let lines = inventory_lines(&app).await;
    let source = line(&lines, "A1-1", "P-001").unwrap().clone();
    let target_bin = line(&lines, "B1-1", "P-003").unwrap()["bin_id"].clone();

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/inventory/move",
            Some(json!({
                "product_id": source["product_id"],
                "from_bin_id": source["bin_id"],
                "to_bin_id": target_bin,
                "qty": 4,
                "reason": "re-slot"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = data(response).await;
    assert_eq!(outcome["source_remaining"], 6);
    assert_eq!(outcome["destination_qty"], 4);

    let lines = inventory_lines(&app).await;
    let total: i64 = lines
        .iter()
        .filter(|l| l["product_code"] == "P-001")
        .map(|l| l["qty"].as_i64().unwrap())
        .sum();
    assert_eq!(total, 10);

    // Moving the remainder removes the emptied source record
    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/inventory/move",
            Some(json!({
                "product_id": source["product_id"],
                "from_bin_id": source["bin_id"],
                "to_bin_id": target_bin,
                "qty": 6
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let lines = inventory_lines(&app).await;
    assert!(line(&lines, "A1-1", "P-001").is_none());
    assert_eq!(line(&lines, "B1-1", "P-001").unwrap()["qty"], 10);

    let history = app
        .request_authenticated(
            Method::GET,
            &format!("/api/v1/products/{}/history", source["product_id"].as_str().unwrap()),
            None,
        )
        .await;
    assert_eq!(history.status(), StatusCode::OK);
    let rows = data(history).await;
    let moves = rows
        .as_array()
        .unwrap()
        .iter()
        .filter(|r| r["action"] == "move")
        .count();
    assert_eq!(moves, 2);
}

#[tokio::test]
async fn over_move_is_rejected_without_changes() {
    let app = TestApp::new().await;
    app.import(SAMPLE_CSV).await;
    app.import("Bin ID,Product Code,Quantity\nB1-1,P-003,1\n").await;

    let lines = inventory_lines(&app).await;
    let source = line(&lines, "A1-1", "P-001").unwrap().clone();
    let target_bin = line(&lines, "B1-1", "P-003").unwrap()["bin_id"].clone();

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/inventory/move",
            Some(json!({
                "product_id": source["product_id"],
                "from_bin_id": source["bin_id"],
                "to_bin_id": target_bin,
                "qty": 11
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let lines = inventory_lines(&app).await;
    assert_eq!(line(&lines, "A1-1", "P-001").unwrap()["qty"], 10);
    assert!(line(&lines, "B1-1", "P-001").is_none());
}

#[tokio::test]
async fn move_to_same_bin_is_invalid() {
    let app = TestApp::new().await;
    app.import(SAMPLE_CSV).await;
    let lines = inventory_lines(&app).await;
    let source = line(&lines, "A1-1", "P-001").unwrap().clone();

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/inventory/move",
            Some(json!({
                "product_id": source["product_id"],
                "from_bin_id": source["bin_id"],
                "to_bin_id": source["bin_id"],
                "qty": 1
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn adjust_sets_quantity_and_keeps_zero_records() {
    let app = TestApp::new().await;
    app.import(SAMPLE_CSV).await;
    let lines = inventory_lines(&app).await;
    let record = line(&lines, "A1-1", "P-001").unwrap().clone();

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/inventory/adjust",
            Some(json!({
                "product_id": record["product_id"],
                "bin_id": record["bin_id"],
                "new_qty": 0,
                "reason": "damaged"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = data(response).await;
    assert_eq!(outcome["qty_before"], 10);
    assert_eq!(outcome["qty_after"], 0);
    assert_eq!(outcome["changed"], true);

    let lines = inventory_lines(&app).await;
    assert_eq!(line(&lines, "A1-1", "P-001").unwrap()["qty"], 0);

    let low = app
        .request_authenticated(Method::GET, "/api/v1/inventory/low-stock", None)
        .await;
    let low = data(low).await;
    assert_eq!(low[0]["product_code"], "P-001");
    assert_eq!(low[0]["qty"], 0);

    let negative = app
        .request_authenticated(
            Method::POST,
            "/api/v1/inventory/adjust",
            Some(json!({
                "product_id": record["product_id"],
                "bin_id": record["bin_id"],
                "new_qty": -1
            })),
        )
        .await;
    assert_eq!(negative.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn add_stock_creates_product_and_accumulates() {
    let app = TestApp::new().await;
    let bin = app
        .request_authenticated(
            Method::POST,
            "/api/v1/bins",
            Some(json!({ "bin_code": "C3-2" })),
        )
        .await;
    assert_eq!(bin.status(), StatusCode::CREATED);
    let bin = data(bin).await;
    let bin_id = bin["id"].clone();

    for qty in [5, 7] {
        let response = app
            .request_authenticated(
                Method::POST,
                "/api/v1/inventory/add",
                Some(json!({
                    "product": { "product_code": "NEW-1", "product_name": "New thing" },
                    "bin_id": bin_id,
                    "qty": qty
                })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let lines = inventory_lines(&app).await;
    let record = line(&lines, "C3-2", "NEW-1").expect("added record");
    assert_eq!(record["qty"], 12);
    assert_eq!(record["product_name"], "New thing");
    assert_eq!(record["zone"], "C");
}

#[tokio::test]
async fn quantities_never_overflow() {
    let app = TestApp::new().await;

    let csv = "\
Bin ID,Product Code,Quantity
A1-1,P-MAX,2147483647
A1-1,P-MAX,2147483647
";
    let summary = app.import(csv).await;
    assert_eq!(summary["errors_count"], 1);
    let lines = inventory_lines(&app).await;
    let record = line(&lines, "A1-1", "P-MAX").expect("max record");
    assert_eq!(record["qty"], i64::from(i32::MAX));

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/inventory/add",
            Some(json!({
                "product": { "product_code": "P-MAX" },
                "bin_id": record["bin_id"],
                "qty": 1
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let lines = inventory_lines(&app).await;
    assert_eq!(
        line(&lines, "A1-1", "P-MAX").unwrap()["qty"],
        i64::from(i32::MAX)
    );
}

#[tokio::test]
async fn export_returns_sorted_csv_with_bom() {
    let app = TestApp::new().await;
    app.import(SAMPLE_CSV).await;

    let response = app
        .request_authenticated(Method::GET, "/api/v1/inventory/export", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/csv; charset=utf-8"
    );
    let disposition = response.headers()["content-disposition"]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\"inventory_export_"));

    let body = text_body(response).await;
    assert!(body.starts_with('\u{feff}'));
    let rows: Vec<&str> = body.trim_start_matches('\u{feff}').lines().collect();
    assert_eq!(rows.len(), 3);
    assert!(rows[0].starts_with("Bin ID,Product Code"));
    assert!(rows[1].starts_with("A1-1,P-001"));
    assert!(rows[2].starts_with("OB_Cutsize,P-002"));
}

#[tokio::test]
async fn zones_and_bins_are_listed() {
    let app = TestApp::new().await;
    app.import(SAMPLE_CSV).await;

    let zones = app
        .request_authenticated(Method::GET, "/api/v1/zones", None)
        .await;
    assert_eq!(zones.status(), StatusCode::OK);
    let zones = data(zones).await;
    let names: Vec<&str> = zones
        .as_array()
        .unwrap()
        .iter()
        .map(|z| z["name"].as_str().unwrap())
        .collect();
    // Lettered zones sort before special zones
    assert_eq!(names, vec!["A", "Cutsize"]);

    let bin = app
        .request_authenticated(Method::GET, "/api/v1/bins/A1-1", None)
        .await;
    assert_eq!(bin.status(), StatusCode::OK);
    let bin = data(bin).await;
    assert_eq!(bin["zone"]["name"], "A");
    assert_eq!(bin["contents"][0]["qty"], 10);

    let missing = app
        .request_authenticated(Method::GET, "/api/v1/bins/Z9-9", None)
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn permissions_gate_inventory_routes() {
    let app = TestApp::new().await;
    app.import(SAMPLE_CSV).await;

    let warehouse = app.token_for_role("picker", UserRole::Warehouse).await;
    let accounting = app.token_for_role("ledger", UserRole::Accounting).await;

    // Warehouse staff cannot import
    let response = app.upload_csv(SAMPLE_CSV, &warehouse).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // ...but can read
    let response = app
        .request(Method::GET, "/api/v1/inventory", None, Some(&warehouse))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Accounting can export but not move
    let response = app
        .request(Method::GET, "/api/v1/inventory/export", None, Some(&accounting))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app
        .request(
            Method::POST,
            "/api/v1/inventory/move",
            Some(json!({})),
            Some(&accounting),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // No token at all
    let response = app.request(Method::GET, "/api/v1/inventory", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
