//! Bulk inventory load from CSV, and the matching export.
//!
//! Rows are parsed and mapped up front, then written in fixed-size batches.
//! Each batch is its own transaction; the first failing batch stops the run
//! and earlier batches stay committed.

use crate::{
    db::{self, DbPool},
    entities::{
        bin::{self, Entity as Bin},
        inventory::Entity as Inventory,
        inventory_log::{self, LogAction},
        product::{self, Entity as Product},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    services::{
        inventory::{add_quantity, find_record, set_quantity},
        locations::ensure_bin,
        products::{upsert_product, ProductInput, UpsertOutcome},
    },
};
use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, EntityTrait};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::ops::AddAssign;
use std::sync::{Arc, Mutex};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Header aliases per field, compared after [`normalize_header`].
const FIELD_ALIASES: [(Field, &[&str]); 8] = [
    (Field::ProductCode, &["productcode", "itemcode", "sku"]),
    (Field::ProductName, &["productname", "name", "description", "itemname"]),
    (Field::NsCode, &["nscode", "netsuitecode"]),
    (Field::NsName, &["nsname", "netsuitename"]),
    (Field::NsSubGroup, &["nssubgroup"]),
    (Field::BinCode, &["bincode", "binid", "bin", "location"]),
    (Field::Qty, &["qty", "quantity", "stock", "onhand", "amount", "จำนวน"]),
    (Field::Unit, &["unit", "uom"]),
];

const REQUIRED_FIELDS: [Field; 3] = [Field::ProductCode, Field::BinCode, Field::Qty];

/// Column order of the export, also accepted as import headers.
pub const EXPORT_HEADERS: [&str; 8] = [
    "Bin ID",
    "Product Code",
    "Product Name",
    "Unit",
    "NS Code",
    "NS Name",
    "NS SubGroup",
    "Quantity",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Field {
    ProductCode,
    ProductName,
    NsCode,
    NsName,
    NsSubGroup,
    BinCode,
    Qty,
    Unit,
}

impl Field {
    fn canonical(self) -> &'static str {
        match self {
            Field::ProductCode => "product_code",
            Field::ProductName => "product_name",
            Field::NsCode => "ns_code",
            Field::NsName => "ns_name",
            Field::NsSubGroup => "ns_sub_group",
            Field::BinCode => "bin_code",
            Field::Qty => "qty",
            Field::Unit => "unit",
        }
    }
}

fn normalize_header(header: &str) -> String {
    header
        .trim_start_matches('\u{feff}')
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// One mapped data row. `qty_raw` is validated during the upsert so a bad
/// quantity counts as a row error rather than failing the whole file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRow {
    pub line: u64,
    pub product: ProductInput,
    pub bin_code: String,
    pub qty_raw: String,
}

impl ImportRow {
    pub fn qty(&self) -> Option<i32> {
        self.qty_raw.trim().parse::<i32>().ok().filter(|q| *q >= 0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCsv {
    pub rows: Vec<ImportRow>,
    pub rows_total: usize,
    pub rows_skipped: usize,
}

/// Counters produced by one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BatchResult {
    pub products_created: u64,
    pub products_updated: u64,
    pub bins_created: u64,
    pub inventory_updated: u64,
    pub errors_count: u64,
}

impl AddAssign for BatchResult {
    fn add_assign(&mut self, other: Self) {
        self.products_created += other.products_created;
        self.products_updated += other.products_updated;
        self.bins_created += other.bins_created;
        self.inventory_updated += other.inventory_updated;
        self.errors_count += other.errors_count;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ImportSummary {
    #[serde(flatten)]
    pub totals: BatchResult,
    pub rows_total: usize,
    pub rows_skipped: usize,
    pub batches: usize,
}

/// Parses CSV text and maps every row to an [`ImportRow`].
///
/// Fails when a required column is missing; rows with an empty product code
/// or bin code are skipped and counted.
pub fn parse_csv(text: &str) -> Result<ParsedCsv, ServiceError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.trim_start_matches('\u{feff}').as_bytes());

    let headers = reader.headers()?.clone();
    let mut columns: HashMap<Field, usize> = HashMap::new();
    for (idx, header) in headers.iter().enumerate() {
        let key = normalize_header(header);
        if let Some((field, _)) = FIELD_ALIASES
            .iter()
            .find(|(_, aliases)| aliases.contains(&key.as_str()))
        {
            columns.entry(*field).or_insert(idx);
        }
    }

    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .filter(|f| !columns.contains_key(f))
        .map(|f| f.canonical())
        .collect();
    if !missing.is_empty() {
        return Err(ServiceError::ValidationError(format!(
            "Missing required columns: {}",
            missing.join(", ")
        )));
    }

    let mut parsed = ParsedCsv::default();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|v| v.is_empty()) {
            continue;
        }
        parsed.rows_total += 1;

        let get = |field: Field| -> Option<String> {
            columns
                .get(&field)
                .and_then(|idx| record.get(*idx))
                .map(str::to_string)
                .filter(|v| !v.is_empty())
        };

        let (Some(product_code), Some(bin_code)) = (get(Field::ProductCode), get(Field::BinCode))
        else {
            parsed.rows_skipped += 1;
            continue;
        };

        parsed.rows.push(ImportRow {
            line: record.position().map(|p| p.line()).unwrap_or_default(),
            product: ProductInput {
                product_code,
                product_name: get(Field::ProductName),
                ns_code: get(Field::NsCode),
                ns_name: get(Field::NsName),
                ns_sub_group: get(Field::NsSubGroup),
                unit: get(Field::Unit),
            },
            bin_code,
            qty_raw: get(Field::Qty).unwrap_or_default(),
        });
    }

    Ok(parsed)
}

/// Writes one batch of rows. Implementations must be all-or-nothing per call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BatchUpserter: Send + Sync {
    async fn upsert_batch(&self, batch: usize, rows: &[ImportRow]) -> Result<BatchResult, ServiceError>;
}

/// Splits `rows` into batches of `batch_size` and sums the per-batch results.
/// Stops at the first failing batch.
pub async fn run_batches(
    upserter: &dyn BatchUpserter,
    rows: &[ImportRow],
    batch_size: usize,
) -> Result<(BatchResult, usize), ServiceError> {
    let mut totals = BatchResult::default();
    let mut batches = 0;

    for (idx, chunk) in rows.chunks(batch_size.max(1)).enumerate() {
        let batch = idx + 1;
        match upserter.upsert_batch(batch, chunk).await {
            Ok(result) => {
                totals += result;
                batches += 1;
            }
            Err(e) => {
                metrics::increment_counter(metrics::IMPORT_BATCH_FAILURES);
                error!(batch, error = %e, "Import batch failed");
                return Err(ServiceError::ImportFailed {
                    batch,
                    message: e.to_string(),
                });
            }
        }
    }

    Ok((totals, batches))
}

/// Database-backed upserter. Remembers which (product, bin) records it has
/// already written so repeated rows in one file add up instead of overwriting.
pub struct DbBatchUpserter {
    db_pool: Arc<DbPool>,
    actor_id: Option<Uuid>,
    seen: Mutex<HashSet<(Uuid, Uuid)>>,
}

impl DbBatchUpserter {
    pub fn new(db_pool: Arc<DbPool>, actor_id: Option<Uuid>) -> Self {
        Self {
            db_pool,
            actor_id,
            seen: Mutex::new(HashSet::new()),
        }
    }

    fn seen_snapshot(&self) -> HashSet<(Uuid, Uuid)> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl BatchUpserter for DbBatchUpserter {
    async fn upsert_batch(&self, batch: usize, rows: &[ImportRow]) -> Result<BatchResult, ServiceError> {
        let rows = rows.to_vec();
        let mut seen = self.seen_snapshot();
        let actor_id = self.actor_id;

        let (result, seen) = db::transaction(&self.db_pool, "inventory.import_batch", move |txn| {
            Box::pin(async move {
                let mut result = BatchResult::default();
                let note = format!("CSV import batch {}", batch);

                for row in &rows {
                    let Some(qty) = row.qty() else {
                        warn!(line = row.line, qty = %row.qty_raw, "Skipping row with invalid quantity");
                        result.errors_count += 1;
                        continue;
                    };

                    let (product, outcome) = upsert_product(txn, &row.product).await?;
                    match outcome {
                        UpsertOutcome::Created => result.products_created += 1,
                        UpsertOutcome::Updated => result.products_updated += 1,
                        UpsertOutcome::Unchanged => {}
                    }

                    let (bin, bin_created) = ensure_bin(txn, &row.bin_code).await?;
                    if bin_created {
                        result.bins_created += 1;
                    }

                    let key = (product.id, bin.id);
                    let before = find_record(txn, product.id, bin.id)
                        .await?
                        .map(|r| r.qty)
                        .unwrap_or(0);
                    let after = if seen.contains(&key) {
                        match add_quantity(before, qty) {
                            Ok(sum) => sum,
                            Err(_) => {
                                warn!(line = row.line, before, qty, "Skipping row that overflows the bin quantity");
                                result.errors_count += 1;
                                continue;
                            }
                        }
                    } else {
                        qty
                    };
                    set_quantity(txn, product.id, bin.id, after).await?;
                    seen.insert(key);
                    result.inventory_updated += 1;

                    inventory_log::ActiveModel::entry(
                        LogAction::Import,
                        product.id,
                        None,
                        Some(bin.id),
                        before,
                        after,
                        actor_id,
                        Some(note.clone()),
                    )
                    .insert(txn)
                    .await?;
                }

                Ok((result, seen))
            })
        })
        .await?;

        if let Ok(mut guard) = self.seen.lock() {
            *guard = seen;
        }
        info!(batch, ?result, "Import batch committed");
        Ok(result)
    }
}

/// CSV import and export of the whole stock list.
#[derive(Clone)]
pub struct ImportService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
    batch_size: usize,
}

impl ImportService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender, batch_size: usize) -> Self {
        Self {
            db_pool,
            event_sender,
            batch_size: batch_size.max(1),
        }
    }

    #[instrument(skip(self, text), fields(bytes = text.len()))]
    pub async fn import_csv(
        &self,
        text: &str,
        actor_id: Option<Uuid>,
    ) -> Result<ImportSummary, ServiceError> {
        let parsed = parse_csv(text)?;
        if parsed.rows.is_empty() {
            return Err(ServiceError::ValidationError(
                "CSV contains no importable rows".to_string(),
            ));
        }

        metrics::increment_counter(metrics::IMPORT_RUNS);
        let upserter = DbBatchUpserter::new(self.db_pool.clone(), actor_id);
        let (totals, batches) = run_batches(&upserter, &parsed.rows, self.batch_size).await?;
        metrics::increment_counter_by(metrics::IMPORT_ROWS, totals.inventory_updated);

        let summary = ImportSummary {
            totals,
            rows_total: parsed.rows_total,
            rows_skipped: parsed.rows_skipped,
            batches,
        };
        info!(?summary, "CSV import finished");

        self.event_sender
            .send_or_log(Event::ImportCompleted {
                rows_total: summary.rows_total,
                inventory_updated: totals.inventory_updated,
                errors_count: totals.errors_count,
                actor_id,
            })
            .await;

        Ok(summary)
    }

    /// Every inventory record as CSV, sorted by bin code then product code.
    #[instrument(skip(self))]
    pub async fn export_csv(&self) -> Result<String, ServiceError> {
        let db = &*self.db_pool;
        let rows = Inventory::find().all(db).await?;
        let products: HashMap<Uuid, product::Model> = Product::find()
            .all(db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        let bins: HashMap<Uuid, bin::Model> = Bin::find()
            .all(db)
            .await?
            .into_iter()
            .map(|b| (b.id, b))
            .collect();

        let mut lines: Vec<(&bin::Model, &product::Model, i32)> = rows
            .iter()
            .filter_map(|r| Some((bins.get(&r.bin_id)?, products.get(&r.product_id)?, r.qty)))
            .collect();
        lines.sort_by(|a, b| {
            a.0.bin_code
                .cmp(&b.0.bin_code)
                .then_with(|| a.1.product_code.cmp(&b.1.product_code))
        });

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(EXPORT_HEADERS)?;
        for (bin, product, qty) in lines {
            let qty = qty.to_string();
            writer.write_record([
                bin.bin_code.as_str(),
                product.product_code.as_str(),
                product.product_name.as_str(),
                product.unit.as_str(),
                product.ns_code.as_str(),
                product.ns_name.as_str(),
                product.ns_sub_group.as_deref().unwrap_or(""),
                qty.as_str(),
            ])?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| ServiceError::InternalError(format!("CSV export failed: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| ServiceError::InternalError(format!("CSV export failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use mockall::predicate::eq;

    fn rows(n: usize) -> Vec<ImportRow> {
        (0..n)
            .map(|i| ImportRow {
                line: i as u64 + 2,
                product: ProductInput {
                    product_code: format!("P-{}", i),
                    ..Default::default()
                },
                bin_code: "A1-1".to_string(),
                qty_raw: "1".to_string(),
            })
            .collect()
    }

    #[test]
    fn import_template_headers_map() {
        let csv = "product_code,product_name,ns_code,ns_name,bin_code,qty,unit\n\
                   PROD-001,Sample Product,NS001,NS Sample,A1-1,100,EA\n";
        let parsed = parse_csv(csv).unwrap();
        assert_eq!(parsed.rows_total, 1);
        let row = &parsed.rows[0];
        assert_eq!(row.product.product_code, "PROD-001");
        assert_eq!(row.product.ns_code.as_deref(), Some("NS001"));
        assert_eq!(row.bin_code, "A1-1");
        assert_eq!(row.qty(), Some(100));
        assert_eq!(row.product.unit.as_deref(), Some("EA"));
    }

    #[test]
    fn inventory_template_headers_map() {
        let csv = "\u{feff}Bin ID,Product Code,Product Name,Unit,NS Code,NS Name,NS SubGroup,Quantity\n\
                   OB_Cutsize,P1,\"Paper, A4\",REAM,NS1,Paper A4,Paper,20\n";
        let parsed = parse_csv(csv).unwrap();
        let row = &parsed.rows[0];
        assert_eq!(row.bin_code, "OB_Cutsize");
        assert_eq!(row.product.product_name.as_deref(), Some("Paper, A4"));
        assert_eq!(row.product.ns_sub_group.as_deref(), Some("Paper"));
        assert_eq!(row.qty(), Some(20));
    }

    #[test]
    fn missing_headers_are_all_named() {
        let err = parse_csv("name,unit\nx,EA\n").unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(msg) => {
            assert!(msg.contains("product_code"));
            assert!(msg.contains("bin_code"));
            assert!(msg.contains("qty"));
        });
    }

    #[test]
    fn rows_without_required_values_are_skipped() {
        let csv = "sku,location,qty\nP1,A1-1,5\n,A1-2,3\nP3,,4\n\nP4,B2-1,x\n";
        let parsed = parse_csv(csv).unwrap();
        assert_eq!(parsed.rows_total, 4);
        assert_eq!(parsed.rows_skipped, 2);
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[1].qty(), None);
    }

    #[test]
    fn quoted_fields_unescape() {
        let csv = "product_code,bin_code,qty,product_name\nP1,A1-1,1,\"He said \"\"hi\"\"\"\n";
        let parsed = parse_csv(csv).unwrap();
        assert_eq!(
            parsed.rows[0].product.product_name.as_deref(),
            Some("He said \"hi\"")
        );
    }

    #[test]
    fn negative_quantity_is_invalid() {
        let row = ImportRow {
            qty_raw: "-3".into(),
            ..rows(1).remove(0)
        };
        assert_eq!(row.qty(), None);
    }

    #[tokio::test]
    async fn batches_are_ceil_of_rows_over_size() {
        let mut mock = MockBatchUpserter::new();
        mock.expect_upsert_batch()
            .times(3)
            .returning(|_, rows| {
                Ok(BatchResult {
                    inventory_updated: rows.len() as u64,
                    products_created: 1,
                    ..Default::default()
                })
            });

        let (totals, batches) = run_batches(&mock, &rows(5), 2).await.unwrap();
        assert_eq!(batches, 3);
        assert_eq!(totals.inventory_updated, 5);
        assert_eq!(totals.products_created, 3);
    }

    #[tokio::test]
    async fn first_failing_batch_stops_the_run() {
        let mut mock = MockBatchUpserter::new();
        mock.expect_upsert_batch()
            .with(eq(1), mockall::predicate::always())
            .times(1)
            .returning(|_, _| Ok(BatchResult::default()));
        mock.expect_upsert_batch()
            .with(eq(2), mockall::predicate::always())
            .times(1)
            .returning(|_, _| Err(ServiceError::InternalError("disk full".into())));

        let err = run_batches(&mock, &rows(10), 3).await.unwrap_err();
        assert_matches!(err, ServiceError::ImportFailed { batch: 2, message } => {
            assert!(message.contains("disk full"));
        });
    }

    #[test]
    fn summary_serializes_flat() {
        let summary = ImportSummary {
            totals: BatchResult {
                inventory_updated: 2,
                ..Default::default()
            },
            rows_total: 2,
            rows_skipped: 0,
            batches: 1,
        };
        let value = serde_json::to_value(summary).unwrap();
        assert_eq!(value["inventory_updated"], 2);
        assert_eq!(value["batches"], 1);
    }
}
