//! Periodic stock counts.
//!
//! A count snapshots live quantities for a set of zones, collects counted
//! quantities item by item, and on completion writes every non-zero variance
//! back to inventory in one transaction. Completion is one-way.

use crate::{
    db::{self, DbPool},
    entities::{
        bin::{self, Entity as Bin},
        inventory::{self, Entity as Inventory},
        inventory_log::{self, LogAction},
        product::{self, Entity as Product},
        stock_count::{self, CountStatus, Entity as StockCount},
        stock_count_item::{self, Entity as StockCountItem, ItemStatus},
        stock_count_zone::{self, Entity as StockCountZone},
        user::{self, Entity as User},
        zone::{self, Entity as Zone},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    services::{
        inventory::{add_quantity, find_bin, find_record, set_quantity},
        products::{upsert_product, ProductInput},
    },
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

const INSERT_CHUNK: usize = 50;

const REPORT_HEADERS: [&str; 12] = [
    "Product Code",
    "NS Code",
    "Product Name",
    "NS Name",
    "Bin",
    "Unit",
    "System Qty",
    "Counted Qty",
    "Variance",
    "Status",
    "Counted By",
    "Counted At",
];

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct StartCountRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(range(min = 1, max = 12))]
    pub month: i32,
    #[validate(range(min = 2000, max = 2100))]
    pub year: i32,
    #[validate(length(min = 1))]
    pub zone_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdateItemRequest {
    #[validate(range(min = 0))]
    pub counted_qty: i32,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UnexpectedItemRequest {
    #[validate]
    pub product: ProductInput,
    pub bin_id: Uuid,
    #[validate(range(min = 0))]
    pub counted_qty: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ZoneProgress {
    pub id: Uuid,
    pub zone_id: Uuid,
    pub zone_name: String,
    pub total_items: i32,
    pub counted_items: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StockCountView {
    #[serde(flatten)]
    pub count: stock_count::Model,
    pub zones: Vec<ZoneProgress>,
    pub total_items: i32,
    pub counted_items: i32,
}

/// A count item with product and bin labels resolved.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CountItemLine {
    pub id: Uuid,
    pub stock_count_zone_id: Uuid,
    pub product_id: Uuid,
    pub product_code: String,
    pub product_name: String,
    pub unit: String,
    pub bin_id: Uuid,
    pub bin_code: String,
    pub system_qty: i32,
    pub counted_qty: Option<i32>,
    pub variance: Option<i32>,
    pub status: ItemStatus,
    pub is_unexpected: bool,
    pub counted_by: Option<Uuid>,
    pub counted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BinItems {
    pub bin_id: Uuid,
    pub bin_code: String,
    pub items: Vec<CountItemLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ZoneItemsView {
    pub stock_count_id: Uuid,
    pub status: CountStatus,
    pub zone: ZoneProgress,
    pub bins: Vec<BinItems>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VarianceSummary {
    pub total_items: usize,
    pub counted: usize,
    pub with_variance: usize,
    pub not_counted: usize,
    pub net_variance: i64,
    /// Share of counted items that matched the snapshot, 0-100.
    pub accuracy_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VarianceReport {
    pub stock_count_id: Uuid,
    pub status: CountStatus,
    pub discrepancies: Vec<CountItemLine>,
    pub uncounted: Vec<CountItemLine>,
    pub summary: VarianceSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CompletionSummary {
    pub stock_count_id: Uuid,
    pub adjustments: usize,
    pub net_variance: i64,
    pub completed_at: DateTime<Utc>,
}

/// Item-level CSV report of one count.
#[derive(Debug, Clone)]
pub struct CountReportExport {
    pub file_name: String,
    pub csv: String,
}

/// `StockCount_<name>_<date>.csv`, with anything outside `[A-Za-z0-9_-]`
/// in the name replaced by `_`.
pub fn report_file_name(count_name: &str, date: DateTime<Utc>) -> String {
    let name: String = count_name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') { c } else { '_' })
        .collect();
    let name = if name.is_empty() { "Report".to_string() } else { name };
    format!("StockCount_{}_{}.csv", name, date.format("%Y-%m-%d"))
}

/// Totals over a count's items. Pending items never count as variances.
pub fn summarize(items: &[stock_count_item::Model]) -> VarianceSummary {
    let mut summary = VarianceSummary {
        total_items: items.len(),
        ..Default::default()
    };
    let mut matched = 0usize;

    for item in items {
        match item.effective_variance() {
            Some(0) => {
                summary.counted += 1;
                matched += 1;
            }
            Some(v) => {
                summary.counted += 1;
                summary.with_variance += 1;
                summary.net_variance += i64::from(v);
            }
            None => summary.not_counted += 1,
        }
    }

    if summary.counted > 0 {
        summary.accuracy_pct = matched as f64 / summary.counted as f64 * 100.0;
    }
    summary
}

async fn find_count<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<stock_count::Model, ServiceError> {
    StockCount::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Stock count {} not found", id)))
}

async fn find_open_count<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<stock_count::Model, ServiceError> {
    let count = find_count(conn, id).await?;
    if !count.is_open() {
        return Err(ServiceError::InvalidOperation(format!(
            "Stock count '{}' is already completed",
            count.name
        )));
    }
    Ok(count)
}

async fn find_zone_row<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<stock_count_zone::Model, ServiceError> {
    StockCountZone::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Stock count zone {} not found", id)))
}

/// Recounts `total_items` and `counted_items` for one zone row.
async fn refresh_zone_progress<C: ConnectionTrait>(
    conn: &C,
    zone_row: stock_count_zone::Model,
) -> Result<stock_count_zone::Model, ServiceError> {
    let total = StockCountItem::find()
        .filter(stock_count_item::Column::StockCountZoneId.eq(zone_row.id))
        .count(conn)
        .await?;
    let counted = StockCountItem::find()
        .filter(stock_count_item::Column::StockCountZoneId.eq(zone_row.id))
        .filter(stock_count_item::Column::Status.eq(ItemStatus::Counted))
        .count(conn)
        .await?;

    let mut active = zone_row.into_active_model();
    active.total_items = Set(total as i32);
    active.counted_items = Set(counted as i32);
    Ok(active.update(conn).await?)
}

async fn item_lines<C: ConnectionTrait>(
    conn: &C,
    items: Vec<stock_count_item::Model>,
) -> Result<Vec<CountItemLine>, ServiceError> {
    if items.is_empty() {
        return Ok(Vec::new());
    }
    let product_ids: HashSet<Uuid> = items.iter().map(|i| i.product_id).collect();
    let bin_ids: HashSet<Uuid> = items.iter().map(|i| i.bin_id).collect();
    let products: HashMap<Uuid, product::Model> = Product::find()
        .filter(product::Column::Id.is_in(product_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();
    let bins: HashMap<Uuid, String> = Bin::find()
        .filter(bin::Column::Id.is_in(bin_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|b| (b.id, b.bin_code))
        .collect();

    let mut lines: Vec<CountItemLine> = items
        .into_iter()
        .map(|item| {
            let product = products.get(&item.product_id);
            CountItemLine {
                id: item.id,
                stock_count_zone_id: item.stock_count_zone_id,
                product_id: item.product_id,
                product_code: product.map(|p| p.product_code.clone()).unwrap_or_default(),
                product_name: product.map(|p| p.product_name.clone()).unwrap_or_default(),
                unit: product.map(|p| p.unit.clone()).unwrap_or_default(),
                bin_id: item.bin_id,
                bin_code: bins.get(&item.bin_id).cloned().unwrap_or_default(),
                system_qty: item.system_qty,
                counted_qty: item.counted_qty,
                variance: item.variance,
                status: item.status,
                is_unexpected: item.is_unexpected,
                counted_by: item.counted_by,
                counted_at: item.counted_at,
            }
        })
        .collect();
    lines.sort_by(|a, b| {
        a.bin_code
            .cmp(&b.bin_code)
            .then_with(|| a.product_code.cmp(&b.product_code))
    });
    Ok(lines)
}

async fn zone_progress<C: ConnectionTrait>(
    conn: &C,
    rows: Vec<stock_count_zone::Model>,
) -> Result<Vec<ZoneProgress>, ServiceError> {
    let zone_ids: HashSet<Uuid> = rows.iter().map(|r| r.zone_id).collect();
    let zones: HashMap<Uuid, zone::Model> = if zone_ids.is_empty() {
        HashMap::new()
    } else {
        Zone::find()
            .filter(zone::Column::Id.is_in(zone_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|z| (z.id, z))
            .collect()
    };

    let mut progress: Vec<(i32, ZoneProgress)> = rows
        .into_iter()
        .map(|row| {
            let zone = zones.get(&row.zone_id);
            (
                zone.map(|z| z.sort_order).unwrap_or(i32::MAX),
                ZoneProgress {
                    id: row.id,
                    zone_id: row.zone_id,
                    zone_name: zone.map(|z| z.name.clone()).unwrap_or_default(),
                    total_items: row.total_items,
                    counted_items: row.counted_items,
                },
            )
        })
        .collect();
    progress.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.zone_name.cmp(&b.1.zone_name)));
    Ok(progress.into_iter().map(|(_, p)| p).collect())
}

#[derive(Clone)]
pub struct StockCountService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

impl StockCountService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    async fn view(&self, count: stock_count::Model) -> Result<StockCountView, ServiceError> {
        let db = &*self.db_pool;
        let rows = StockCountZone::find()
            .filter(stock_count_zone::Column::StockCountId.eq(count.id))
            .all(db)
            .await?;
        let zones = zone_progress(db, rows).await?;
        Ok(StockCountView {
            total_items: zones.iter().map(|z| z.total_items).sum(),
            counted_items: zones.iter().map(|z| z.counted_items).sum(),
            count,
            zones,
        })
    }

    /// Opens a count over `zone_ids` and snapshots their current stock.
    #[instrument(skip(self))]
    pub async fn start_count(
        &self,
        request: StartCountRequest,
        actor_id: Option<Uuid>,
    ) -> Result<StockCountView, ServiceError> {
        request.validate()?;
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::ValidationError(
                "Stock count name must not be empty".to_string(),
            ));
        }
        let mut zone_ids = request.zone_ids.clone();
        zone_ids.sort();
        zone_ids.dedup();
        let (month, year) = (request.month, request.year);

        let (count, items) = db::transaction(&self.db_pool, "stock_count.start", move |txn| {
            Box::pin(async move {
                let zones = Zone::find()
                    .filter(zone::Column::Id.is_in(zone_ids.clone()))
                    .all(txn)
                    .await?;
                if zones.len() != zone_ids.len() {
                    let found: HashSet<Uuid> = zones.iter().map(|z| z.id).collect();
                    let missing: Vec<String> = zone_ids
                        .iter()
                        .filter(|id| !found.contains(id))
                        .map(Uuid::to_string)
                        .collect();
                    return Err(ServiceError::NotFound(format!(
                        "Zones not found: {}",
                        missing.join(", ")
                    )));
                }

                let open: HashMap<Uuid, String> = StockCount::find()
                    .filter(stock_count::Column::Status.eq(CountStatus::InProgress))
                    .all(txn)
                    .await?
                    .into_iter()
                    .map(|c| (c.id, c.name))
                    .collect();
                if !open.is_empty() {
                    let busy = StockCountZone::find()
                        .filter(stock_count_zone::Column::StockCountId.is_in(open.keys().copied()))
                        .filter(stock_count_zone::Column::ZoneId.is_in(zone_ids.clone()))
                        .one(txn)
                        .await?;
                    if let Some(busy) = busy {
                        let zone_name = zones
                            .iter()
                            .find(|z| z.id == busy.zone_id)
                            .map(|z| z.name.clone())
                            .unwrap_or_default();
                        let count_name = open.get(&busy.stock_count_id).cloned().unwrap_or_default();
                        return Err(ServiceError::Conflict(format!(
                            "Zone {} is already being counted in '{}'",
                            zone_name, count_name
                        )));
                    }
                }

                let count = stock_count::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    name: Set(name),
                    month: Set(month),
                    year: Set(year),
                    status: Set(CountStatus::InProgress),
                    created_by: Set(actor_id),
                    completed_at: Set(None),
                    completed_by: Set(None),
                    ..Default::default()
                }
                .insert(txn)
                .await?;

                let mut item_total = 0usize;
                for zone in &zones {
                    let bin_ids: Vec<Uuid> = Bin::find()
                        .filter(bin::Column::ZoneId.eq(zone.id))
                        .all(txn)
                        .await?
                        .into_iter()
                        .map(|b| b.id)
                        .collect();
                    let records = if bin_ids.is_empty() {
                        Vec::new()
                    } else {
                        Inventory::find()
                            .filter(inventory::Column::BinId.is_in(bin_ids))
                            .all(txn)
                            .await?
                    };

                    let zone_row = stock_count_zone::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        stock_count_id: Set(count.id),
                        zone_id: Set(zone.id),
                        total_items: Set(records.len() as i32),
                        counted_items: Set(0),
                    }
                    .insert(txn)
                    .await?;

                    let snapshot: Vec<stock_count_item::ActiveModel> = records
                        .iter()
                        .map(|r| stock_count_item::ActiveModel {
                            id: Set(Uuid::new_v4()),
                            stock_count_id: Set(count.id),
                            stock_count_zone_id: Set(zone_row.id),
                            product_id: Set(r.product_id),
                            bin_id: Set(r.bin_id),
                            system_qty: Set(r.qty),
                            counted_qty: Set(None),
                            variance: Set(None),
                            status: Set(ItemStatus::Pending),
                            is_unexpected: Set(false),
                            counted_by: Set(None),
                            counted_at: Set(None),
                        })
                        .collect();
                    item_total += snapshot.len();
                    for chunk in snapshot.chunks(INSERT_CHUNK) {
                        StockCountItem::insert_many(chunk.to_vec()).exec(txn).await?;
                    }
                }

                Ok((count, item_total))
            })
        })
        .await?;

        let view = self.view(count).await?;
        metrics::increment_counter(metrics::STOCK_COUNTS_STARTED);
        metrics::adjust_gauge(metrics::OPEN_STOCK_COUNTS, 1);
        info!(count_id = %view.count.id, zones = view.zones.len(), items, "Stock count started");
        self.event_sender
            .send_or_log(Event::StockCountStarted {
                count_id: view.count.id,
                name: view.count.name.clone(),
                zones: view.zones.len(),
                items,
                actor_id,
            })
            .await;

        Ok(view)
    }

    /// Resets the open-count gauge from the database. Called once at startup
    /// so counts left open by a previous process are included.
    #[instrument(skip(self))]
    pub async fn sync_open_gauge(&self) -> Result<u64, ServiceError> {
        let open = StockCount::find()
            .filter(stock_count::Column::Status.eq(CountStatus::InProgress))
            .count(&*self.db_pool)
            .await?;
        metrics::set_gauge(metrics::OPEN_STOCK_COUNTS, open as i64);
        info!(open, "Open stock count gauge seeded");
        Ok(open)
    }

    /// Counts, newest first, optionally filtered by status.
    #[instrument(skip(self))]
    pub async fn list_counts(
        &self,
        status: Option<CountStatus>,
    ) -> Result<Vec<StockCountView>, ServiceError> {
        let mut query = StockCount::find();
        if let Some(status) = status {
            query = query.filter(stock_count::Column::Status.eq(status));
        }
        let counts = query
            .order_by_desc(stock_count::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?;

        let mut views = Vec::with_capacity(counts.len());
        for count in counts {
            views.push(self.view(count).await?);
        }
        Ok(views)
    }

    #[instrument(skip(self))]
    pub async fn get_count(&self, count_id: Uuid) -> Result<StockCountView, ServiceError> {
        let count = find_count(&*self.db_pool, count_id).await?;
        self.view(count).await
    }

    /// Items of one zone in a count, grouped by bin code.
    #[instrument(skip(self))]
    pub async fn zone_items(&self, zone_count_id: Uuid) -> Result<ZoneItemsView, ServiceError> {
        let db = &*self.db_pool;
        let zone_row = find_zone_row(db, zone_count_id).await?;
        let count = find_count(db, zone_row.stock_count_id).await?;
        let items = StockCountItem::find()
            .filter(stock_count_item::Column::StockCountZoneId.eq(zone_count_id))
            .all(db)
            .await?;
        let lines = item_lines(db, items).await?;

        let mut grouped: BTreeMap<String, BinItems> = BTreeMap::new();
        for line in lines {
            grouped
                .entry(line.bin_code.clone())
                .or_insert_with(|| BinItems {
                    bin_id: line.bin_id,
                    bin_code: line.bin_code.clone(),
                    items: Vec::new(),
                })
                .items
                .push(line);
        }

        let zone = zone_progress(db, vec![zone_row])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::NotFound(format!("Stock count zone {} not found", zone_count_id)))?;

        Ok(ZoneItemsView {
            stock_count_id: count.id,
            status: count.status,
            zone,
            bins: grouped.into_values().collect(),
        })
    }

    /// Records a counted quantity. Recounting overwrites the previous value.
    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        item_id: Uuid,
        request: UpdateItemRequest,
        actor_id: Option<Uuid>,
    ) -> Result<stock_count_item::Model, ServiceError> {
        request.validate()?;
        let counted_qty = request.counted_qty;

        let item = db::transaction(&self.db_pool, "stock_count.update_item", move |txn| {
            Box::pin(async move {
                let item = StockCountItem::find_by_id(item_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Stock count item {} not found", item_id))
                    })?;
                find_open_count(txn, item.stock_count_id).await?;
                let zone_row = find_zone_row(txn, item.stock_count_zone_id).await?;

                let system_qty = item.system_qty;
                let mut active = item.into_active_model();
                active.counted_qty = Set(Some(counted_qty));
                active.variance = Set(Some(counted_qty - system_qty));
                active.status = Set(ItemStatus::Counted);
                active.counted_by = Set(actor_id);
                active.counted_at = Set(Some(Utc::now()));
                let updated = active.update(txn).await?;

                refresh_zone_progress(txn, zone_row).await?;
                Ok(updated)
            })
        })
        .await?;

        metrics::increment_counter(metrics::STOCK_COUNT_ITEMS_COUNTED);
        Ok(item)
    }

    /// Adds an item found during counting that was not in the snapshot.
    #[instrument(skip(self))]
    pub async fn add_unexpected_item(
        &self,
        zone_count_id: Uuid,
        request: UnexpectedItemRequest,
        actor_id: Option<Uuid>,
    ) -> Result<stock_count_item::Model, ServiceError> {
        request.validate()?;

        let item = db::transaction(&self.db_pool, "stock_count.add_item", move |txn| {
            Box::pin(async move {
                let zone_row = find_zone_row(txn, zone_count_id).await?;
                find_open_count(txn, zone_row.stock_count_id).await?;

                let bin = find_bin(txn, request.bin_id).await?;
                if bin.zone_id != zone_row.zone_id {
                    return Err(ServiceError::ValidationError(format!(
                        "Bin {} is not part of this zone",
                        bin.bin_code
                    )));
                }

                let (product, _) = upsert_product(txn, &request.product).await?;
                let duplicate = StockCountItem::find()
                    .filter(stock_count_item::Column::StockCountZoneId.eq(zone_row.id))
                    .filter(stock_count_item::Column::ProductId.eq(product.id))
                    .filter(stock_count_item::Column::BinId.eq(bin.id))
                    .one(txn)
                    .await?;
                if duplicate.is_some() {
                    return Err(ServiceError::Conflict(format!(
                        "{} in bin {} is already on this count",
                        product.product_code, bin.bin_code
                    )));
                }

                let item = stock_count_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    stock_count_id: Set(zone_row.stock_count_id),
                    stock_count_zone_id: Set(zone_row.id),
                    product_id: Set(product.id),
                    bin_id: Set(bin.id),
                    system_qty: Set(0),
                    counted_qty: Set(Some(request.counted_qty)),
                    variance: Set(Some(request.counted_qty)),
                    status: Set(ItemStatus::Counted),
                    is_unexpected: Set(true),
                    counted_by: Set(actor_id),
                    counted_at: Set(Some(Utc::now())),
                }
                .insert(txn)
                .await?;

                refresh_zone_progress(txn, zone_row).await?;
                Ok(item)
            })
        })
        .await?;

        metrics::increment_counter(metrics::STOCK_COUNT_ITEMS_COUNTED);
        Ok(item)
    }

    /// Discrepancies and uncounted items across every zone of a count.
    #[instrument(skip(self))]
    pub async fn get_variance(&self, count_id: Uuid) -> Result<VarianceReport, ServiceError> {
        let db = &*self.db_pool;
        let count = find_count(db, count_id).await?;
        let items = StockCountItem::find()
            .filter(stock_count_item::Column::StockCountId.eq(count_id))
            .all(db)
            .await?;
        let summary = summarize(&items);

        let (discrepancies, uncounted): (Vec<_>, Vec<_>) = items
            .into_iter()
            .filter(|i| i.effective_variance() != Some(0))
            .partition(|i| i.effective_variance().is_some());

        Ok(VarianceReport {
            stock_count_id: count.id,
            status: count.status,
            discrepancies: item_lines(db, discrepancies).await?,
            uncounted: item_lines(db, uncounted).await?,
            summary,
        })
    }

    /// Every item of a count as CSV, sorted by bin then product code.
    #[instrument(skip(self))]
    pub async fn export_report(&self, count_id: Uuid) -> Result<CountReportExport, ServiceError> {
        let db = &*self.db_pool;
        let count = find_count(db, count_id).await?;
        let items = StockCountItem::find()
            .filter(stock_count_item::Column::StockCountId.eq(count_id))
            .all(db)
            .await?;

        let product_ids: HashSet<Uuid> = items.iter().map(|i| i.product_id).collect();
        let bin_ids: HashSet<Uuid> = items.iter().map(|i| i.bin_id).collect();
        let counter_ids: HashSet<Uuid> = items.iter().filter_map(|i| i.counted_by).collect();
        let products: HashMap<Uuid, product::Model> = Product::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        let bins: HashMap<Uuid, String> = Bin::find()
            .filter(bin::Column::Id.is_in(bin_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|b| (b.id, b.bin_code))
            .collect();
        let counters: HashMap<Uuid, String> = User::find()
            .filter(user::Column::Id.is_in(counter_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|u| (u.id, u.display_name))
            .collect();

        let mut rows: Vec<(&str, Option<&product::Model>, &stock_count_item::Model)> = items
            .iter()
            .map(|item| {
                let bin_code = bins.get(&item.bin_id).map(String::as_str).unwrap_or("");
                (bin_code, products.get(&item.product_id), item)
            })
            .collect();
        rows.sort_by(|a, b| {
            a.0.cmp(b.0).then_with(|| {
                let code = |p: Option<&product::Model>| p.map(|p| p.product_code.clone());
                code(a.1).cmp(&code(b.1))
            })
        });

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(REPORT_HEADERS)?;
        for (bin_code, product, item) in rows {
            let field = |f: fn(&product::Model) -> &str| product.map(f).unwrap_or("");
            let optional = |v: Option<i32>| v.map(|v| v.to_string()).unwrap_or_default();
            let status = match item.status {
                ItemStatus::Counted => "Counted",
                ItemStatus::Pending => "Not Counted",
            };
            let counter = item
                .counted_by
                .and_then(|id| counters.get(&id))
                .map(String::as_str)
                .unwrap_or("");
            let counted_at = item
                .counted_at
                .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            writer.write_record([
                field(|p| p.product_code.as_str()),
                field(|p| p.ns_code.as_str()),
                field(|p| p.product_name.as_str()),
                field(|p| p.ns_name.as_str()),
                bin_code,
                field(|p| p.unit.as_str()),
                item.system_qty.to_string().as_str(),
                optional(item.counted_qty).as_str(),
                optional(item.effective_variance()).as_str(),
                status,
                counter,
                counted_at.as_str(),
            ])?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| ServiceError::InternalError(format!("Report export failed: {}", e)))?;
        let csv = String::from_utf8(bytes)
            .map_err(|e| ServiceError::InternalError(format!("Report export failed: {}", e)))?;

        Ok(CountReportExport {
            file_name: report_file_name(&count.name, Utc::now()),
            csv,
        })
    }

    /// Applies every non-zero variance to inventory and closes the count.
    ///
    /// Quantities are clamped at zero. A completed count cannot be completed again.
    #[instrument(skip(self))]
    pub async fn complete_count(
        &self,
        count_id: Uuid,
        actor_id: Option<Uuid>,
    ) -> Result<CompletionSummary, ServiceError> {
        let (count, summary) = db::transaction(&self.db_pool, "stock_count.complete", move |txn| {
            Box::pin(async move {
                let count = find_open_count(txn, count_id).await?;
                let items = StockCountItem::find()
                    .filter(stock_count_item::Column::StockCountId.eq(count_id))
                    .filter(stock_count_item::Column::Status.eq(ItemStatus::Counted))
                    .all(txn)
                    .await?;

                let note = format!("Stock count: {}", count.name);
                let mut adjustments = 0usize;
                let mut net_variance = 0i64;
                for item in &items {
                    let Some(variance) = item.effective_variance().filter(|v| *v != 0) else {
                        continue;
                    };
                    let before = find_record(txn, item.product_id, item.bin_id)
                        .await?
                        .map(|r| r.qty)
                        .unwrap_or(0);
                    let after = add_quantity(before, variance)?.max(0);
                    set_quantity(txn, item.product_id, item.bin_id, after).await?;
                    inventory_log::ActiveModel::entry(
                        LogAction::CountAdjust,
                        item.product_id,
                        None,
                        Some(item.bin_id),
                        before,
                        after,
                        actor_id,
                        Some(note.clone()),
                    )
                    .insert(txn)
                    .await?;
                    adjustments += 1;
                    net_variance += i64::from(variance);
                }

                let completed_at = Utc::now();
                let mut active = count.into_active_model();
                active.status = Set(CountStatus::Completed);
                active.completed_at = Set(Some(completed_at));
                active.completed_by = Set(actor_id);
                let count = active.update(txn).await?;

                Ok((
                    count,
                    CompletionSummary {
                        stock_count_id: count_id,
                        adjustments,
                        net_variance,
                        completed_at,
                    },
                ))
            })
        })
        .await?;

        metrics::increment_counter(metrics::STOCK_COUNTS_COMPLETED);
        metrics::adjust_gauge(metrics::OPEN_STOCK_COUNTS, -1);
        info!(count_id = %count_id, adjustments = summary.adjustments, "Stock count completed");
        self.event_sender
            .send_or_log(Event::StockCountCompleted {
                count_id,
                name: count.name,
                adjustments: summary.adjustments,
                actor_id,
            })
            .await;

        Ok(summary)
    }

    /// Removes a count with its zones and items. Inventory already adjusted
    /// by a completed count is left as is.
    #[instrument(skip(self))]
    pub async fn delete_count(&self, count_id: Uuid) -> Result<(), ServiceError> {
        let was_open = db::transaction(&self.db_pool, "stock_count.delete", move |txn| {
            Box::pin(async move {
                let count = find_count(txn, count_id).await?;
                StockCountItem::delete_many()
                    .filter(stock_count_item::Column::StockCountId.eq(count_id))
                    .exec(txn)
                    .await?;
                StockCountZone::delete_many()
                    .filter(stock_count_zone::Column::StockCountId.eq(count_id))
                    .exec(txn)
                    .await?;
                StockCount::delete_by_id(count_id).exec(txn).await?;
                Ok(count.is_open())
            })
        })
        .await?;

        if was_open {
            metrics::adjust_gauge(metrics::OPEN_STOCK_COUNTS, -1);
        }
        info!(count_id = %count_id, "Stock count deleted");
        self.event_sender
            .send_or_log(Event::StockCountDeleted { count_id })
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(system_qty: i32, counted: Option<i32>) -> stock_count_item::Model {
        stock_count_item::Model {
            id: Uuid::new_v4(),
            stock_count_id: Uuid::nil(),
            stock_count_zone_id: Uuid::nil(),
            product_id: Uuid::new_v4(),
            bin_id: Uuid::new_v4(),
            system_qty,
            counted_qty: counted,
            variance: counted.map(|c| c - system_qty),
            status: if counted.is_some() {
                ItemStatus::Counted
            } else {
                ItemStatus::Pending
            },
            is_unexpected: false,
            counted_by: None,
            counted_at: None,
        }
    }

    #[test]
    fn summary_excludes_uncounted_from_variances() {
        let items = vec![
            item(10, Some(10)),
            item(10, Some(7)),
            item(5, Some(8)),
            item(4, None),
            item(0, None),
        ];
        let summary = summarize(&items);
        assert_eq!(summary.total_items, 5);
        assert_eq!(summary.counted, 3);
        assert_eq!(summary.with_variance, 2);
        assert_eq!(summary.not_counted, 2);
        assert_eq!(summary.net_variance, 0);
        assert!((summary.accuracy_pct - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_count_has_zero_accuracy() {
        let summary = summarize(&[]);
        assert_eq!(summary, VarianceSummary::default());
    }

    #[test]
    fn variance_is_counted_minus_system() {
        let it = item(12, Some(9));
        assert_eq!(it.effective_variance(), Some(-3));
        assert_eq!(item(3, None).effective_variance(), None);
    }

    #[test]
    fn start_request_validation() {
        let ok = StartCountRequest {
            name: "October".into(),
            month: 10,
            year: 2024,
            zone_ids: vec![Uuid::new_v4()],
        };
        assert!(ok.validate().is_ok());

        let bad_month = StartCountRequest { month: 13, ..ok.clone() };
        assert!(bad_month.validate().is_err());
        let no_zones = StartCountRequest {
            zone_ids: vec![],
            ..ok.clone()
        };
        assert!(no_zones.validate().is_err());
        let old_year = StartCountRequest { year: 1999, ..ok };
        assert!(old_year.validate().is_err());
    }

    #[test]
    fn report_file_name_is_header_safe() {
        let date = DateTime::parse_from_rfc3339("2026-10-19T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            report_file_name("October A", date),
            "StockCount_October_A_2026-10-19.csv"
        );
        assert_eq!(
            report_file_name("Q4 \"final\"/v2", date),
            "StockCount_Q4__final__v2_2026-10-19.csv"
        );
        assert_eq!(report_file_name("  ", date), "StockCount_Report_2026-10-19.csv");
    }
}
