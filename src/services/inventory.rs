use crate::{
    db::{self, DbPool},
    entities::{
        bin::{self, Entity as Bin},
        inventory::{self, Column as InventoryColumn, Entity as Inventory},
        inventory_log::{self, Column as LogColumn, Entity as InventoryLog, LogAction},
        product::{self, Entity as Product},
        zone::{self, Entity as Zone},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    services::products::{find_product, upsert_product, ProductInput},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, IntoActiveModel,
    ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// One inventory record with its product, bin and zone resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct InventoryLine {
    pub inventory_id: Uuid,
    pub product_id: Uuid,
    pub product_code: String,
    pub product_name: String,
    pub ns_code: String,
    pub ns_name: String,
    pub ns_sub_group: Option<String>,
    pub unit: String,
    pub bin_id: Uuid,
    pub bin_code: String,
    pub zone_id: Uuid,
    pub zone: String,
    pub qty: i32,
    pub updated_at: DateTime<Utc>,
}

/// An audit row with product and bin codes resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LogLine {
    pub id: Uuid,
    pub action: LogAction,
    pub product_id: Uuid,
    pub product_code: Option<String>,
    pub product_name: Option<String>,
    pub from_bin_id: Option<Uuid>,
    pub from_bin_code: Option<String>,
    pub to_bin_id: Option<Uuid>,
    pub to_bin_code: Option<String>,
    pub qty_before: i32,
    pub qty_after: i32,
    pub actor_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Deserialize, ToSchema, utoipa::IntoParams)]
pub struct InventoryFilter {
    pub zone_id: Option<Uuid>,
    pub bin_code: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct MoveRequest {
    pub product_id: Uuid,
    pub from_bin_id: Uuid,
    pub to_bin_id: Uuid,
    #[validate(range(min = 1))]
    pub qty: i32,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MoveOutcome {
    pub product_id: Uuid,
    pub from_bin_id: Uuid,
    pub to_bin_id: Uuid,
    pub qty: i32,
    pub source_remaining: i32,
    pub destination_qty: i32,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AdjustRequest {
    pub product_id: Uuid,
    pub bin_id: Uuid,
    #[validate(range(min = 0))]
    pub new_qty: i32,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdjustOutcome {
    pub product_id: Uuid,
    pub bin_id: Uuid,
    pub qty_before: i32,
    pub qty_after: i32,
    pub changed: bool,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AddStockRequest {
    #[validate]
    pub product: ProductInput,
    pub bin_id: Uuid,
    #[validate(range(min = 1))]
    pub qty: i32,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

pub(crate) async fn find_bin<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<bin::Model, ServiceError> {
    Bin::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Bin {} not found", id)))
}

/// `current + delta` for a bin quantity, rejecting results past `i32::MAX`.
pub(crate) fn add_quantity(current: i32, delta: i32) -> Result<i32, ServiceError> {
    current.checked_add(delta).ok_or_else(|| {
        ServiceError::ValidationError(format!(
            "Quantity {} + {} exceeds the maximum of {}",
            current,
            delta,
            i32::MAX
        ))
    })
}

pub(crate) async fn find_record<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    bin_id: Uuid,
) -> Result<Option<inventory::Model>, ServiceError> {
    Ok(Inventory::find()
        .filter(InventoryColumn::ProductId.eq(product_id))
        .filter(InventoryColumn::BinId.eq(bin_id))
        .one(conn)
        .await?)
}

/// Writes `qty` to the (product, bin) record, inserting it when absent.
/// Returns the previous quantity (0 when the record did not exist).
pub(crate) async fn set_quantity<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    bin_id: Uuid,
    qty: i32,
) -> Result<i32, ServiceError> {
    match find_record(conn, product_id, bin_id).await? {
        Some(record) => {
            let before = record.qty;
            if before != qty {
                let mut active = record.into_active_model();
                active.qty = Set(qty);
                active.update(conn).await?;
            }
            Ok(before)
        }
        None => {
            inventory::ActiveModel {
                id: Set(Uuid::new_v4()),
                product_id: Set(product_id),
                bin_id: Set(bin_id),
                qty: Set(qty),
                ..Default::default()
            }
            .insert(conn)
            .await?;
            Ok(0)
        }
    }
}

/// Resolves product, bin and zone for a set of inventory rows, keeping order.
pub(crate) async fn hydrate_lines<C: ConnectionTrait>(
    conn: &C,
    rows: Vec<inventory::Model>,
) -> Result<Vec<InventoryLine>, ServiceError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let product_ids: HashSet<Uuid> = rows.iter().map(|r| r.product_id).collect();
    let bin_ids: HashSet<Uuid> = rows.iter().map(|r| r.bin_id).collect();

    let products: HashMap<Uuid, product::Model> = Product::find()
        .filter(product::Column::Id.is_in(product_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();
    let bins: HashMap<Uuid, bin::Model> = Bin::find()
        .filter(bin::Column::Id.is_in(bin_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|b| (b.id, b))
        .collect();
    let zone_ids: HashSet<Uuid> = bins.values().map(|b| b.zone_id).collect();
    let zones: HashMap<Uuid, zone::Model> = Zone::find()
        .filter(zone::Column::Id.is_in(zone_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|z| (z.id, z))
        .collect();

    let mut lines = Vec::with_capacity(rows.len());
    for row in rows {
        let (Some(p), Some(b)) = (products.get(&row.product_id), bins.get(&row.bin_id)) else {
            continue;
        };
        let zone = zones
            .get(&b.zone_id)
            .map(|z| z.name.clone())
            .unwrap_or_default();
        lines.push(InventoryLine {
            inventory_id: row.id,
            product_id: p.id,
            product_code: p.product_code.clone(),
            product_name: p.product_name.clone(),
            ns_code: p.ns_code.clone(),
            ns_name: p.ns_name.clone(),
            ns_sub_group: p.ns_sub_group.clone(),
            unit: p.unit.clone(),
            bin_id: b.id,
            bin_code: b.bin_code.clone(),
            zone_id: b.zone_id,
            zone,
            qty: row.qty,
            updated_at: row.updated_at,
        });
    }
    Ok(lines)
}

async fn hydrate_logs<C: ConnectionTrait>(
    conn: &C,
    logs: Vec<inventory_log::Model>,
) -> Result<Vec<LogLine>, ServiceError> {
    let product_ids: HashSet<Uuid> = logs.iter().map(|l| l.product_id).collect();
    let bin_ids: HashSet<Uuid> = logs
        .iter()
        .flat_map(|l| [l.from_bin_id, l.to_bin_id])
        .flatten()
        .collect();

    let products: HashMap<Uuid, product::Model> = if product_ids.is_empty() {
        HashMap::new()
    } else {
        Product::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect()
    };
    let bin_codes: HashMap<Uuid, String> = if bin_ids.is_empty() {
        HashMap::new()
    } else {
        Bin::find()
            .filter(bin::Column::Id.is_in(bin_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|b| (b.id, b.bin_code))
            .collect()
    };

    Ok(logs
        .into_iter()
        .map(|l| {
            let product = products.get(&l.product_id);
            LogLine {
                id: l.id,
                action: l.action,
                product_id: l.product_id,
                product_code: product.map(|p| p.product_code.clone()),
                product_name: product.map(|p| p.product_name.clone()),
                from_bin_id: l.from_bin_id,
                from_bin_code: l.from_bin_id.and_then(|id| bin_codes.get(&id).cloned()),
                to_bin_id: l.to_bin_id,
                to_bin_code: l.to_bin_id.and_then(|id| bin_codes.get(&id).cloned()),
                qty_before: l.qty_before,
                qty_after: l.qty_after,
                actor_id: l.actor_id,
                notes: l.notes,
                created_at: l.created_at,
            }
        })
        .collect())
}

/// Stock queries and single-record mutations (move, adjust, add).
#[derive(Clone)]
pub struct InventoryService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

impl InventoryService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Lists inventory ordered by bin then product code.
    #[instrument(skip(self))]
    pub async fn list_inventory(
        &self,
        filter: InventoryFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<InventoryLine>, u64), ServiceError> {
        let db = &*self.db_pool;
        let mut query = Inventory::find()
            .join(
                sea_orm::JoinType::InnerJoin,
                inventory::Relation::Product.def(),
            )
            .join(sea_orm::JoinType::InnerJoin, inventory::Relation::Bin.def());

        if let Some(zone_id) = filter.zone_id {
            query = query.filter(bin::Column::ZoneId.eq(zone_id));
        }
        if let Some(code) = filter.bin_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            query = query.filter(bin::Column::BinCode.eq(code));
        }
        if let Some(term) = filter.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(product::Column::ProductCode.contains(term))
                    .add(product::Column::ProductName.contains(term))
                    .add(product::Column::NsCode.contains(term))
                    .add(product::Column::NsName.contains(term)),
            );
        }

        let paginator = query
            .order_by_asc(bin::Column::BinCode)
            .order_by_asc(product::Column::ProductCode)
            .paginate(db, limit.max(1));
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((hydrate_lines(db, rows).await?, total))
    }

    /// Records at or below `threshold`, emptiest first.
    #[instrument(skip(self))]
    pub async fn low_stock(&self, threshold: i32) -> Result<Vec<InventoryLine>, ServiceError> {
        let db = &*self.db_pool;
        let rows = Inventory::find()
            .filter(InventoryColumn::Qty.lte(threshold))
            .order_by_asc(InventoryColumn::Qty)
            .all(db)
            .await?;
        hydrate_lines(db, rows).await
    }

    /// Moves `qty` units between two bins in one transaction.
    ///
    /// The source record is deleted when it reaches zero. Fails with
    /// `InsufficientStock` when the source holds less than requested.
    #[instrument(skip(self))]
    pub async fn move_stock(
        &self,
        request: MoveRequest,
        actor_id: Option<Uuid>,
    ) -> Result<MoveOutcome, ServiceError> {
        request.validate()?;
        if request.from_bin_id == request.to_bin_id {
            return Err(ServiceError::ValidationError(
                "Source and destination bins must differ".to_string(),
            ));
        }

        let req = request.clone();
        let outcome = db::transaction(&self.db_pool, "inventory.move", move |txn| {
            Box::pin(async move {
                find_product(txn, req.product_id).await?;
                let from_bin = find_bin(txn, req.from_bin_id).await?;
                find_bin(txn, req.to_bin_id).await?;

                let source = find_record(txn, req.product_id, req.from_bin_id)
                    .await?
                    .filter(|r| r.qty > 0)
                    .ok_or_else(|| {
                        ServiceError::InsufficientStock(format!(
                            "no stock of product {} in bin {}",
                            req.product_id, from_bin.bin_code
                        ))
                    })?;
                if source.qty < req.qty {
                    return Err(ServiceError::InsufficientStock(format!(
                        "requested {} but only {} in bin {}",
                        req.qty, source.qty, from_bin.bin_code
                    )));
                }

                let source_before = source.qty;
                let source_remaining = source_before - req.qty;
                if source_remaining == 0 {
                    source.delete(txn).await?;
                } else {
                    let mut active = source.into_active_model();
                    active.qty = Set(source_remaining);
                    active.update(txn).await?;
                }

                let dest_before = find_record(txn, req.product_id, req.to_bin_id)
                    .await?
                    .map(|r| r.qty)
                    .unwrap_or(0);
                let destination_qty = add_quantity(dest_before, req.qty)?;
                set_quantity(txn, req.product_id, req.to_bin_id, destination_qty).await?;

                inventory_log::ActiveModel::entry(
                    LogAction::Move,
                    req.product_id,
                    Some(req.from_bin_id),
                    Some(req.to_bin_id),
                    source_before,
                    source_remaining,
                    actor_id,
                    req.reason.clone(),
                )
                .insert(txn)
                .await?;

                Ok(MoveOutcome {
                    product_id: req.product_id,
                    from_bin_id: req.from_bin_id,
                    to_bin_id: req.to_bin_id,
                    qty: req.qty,
                    source_remaining,
                    destination_qty,
                })
            })
        })
        .await?;

        metrics::increment_counter(metrics::INVENTORY_MOVES);
        info!(
            product_id = %outcome.product_id,
            from_bin_id = %outcome.from_bin_id,
            to_bin_id = %outcome.to_bin_id,
            qty = outcome.qty,
            "Inventory moved"
        );
        self.event_sender
            .send_or_log(Event::InventoryMoved {
                product_id: outcome.product_id,
                from_bin_id: outcome.from_bin_id,
                to_bin_id: outcome.to_bin_id,
                qty: outcome.qty,
                source_remaining: outcome.source_remaining,
                actor_id,
            })
            .await;

        Ok(outcome)
    }

    /// Sets the quantity of one record. Writing the current value is a no-op.
    #[instrument(skip(self))]
    pub async fn adjust_stock(
        &self,
        request: AdjustRequest,
        actor_id: Option<Uuid>,
    ) -> Result<AdjustOutcome, ServiceError> {
        request.validate()?;

        let req = request.clone();
        let outcome = db::transaction(&self.db_pool, "inventory.adjust", move |txn| {
            Box::pin(async move {
                find_product(txn, req.product_id).await?;
                find_bin(txn, req.bin_id).await?;

                let before = find_record(txn, req.product_id, req.bin_id)
                    .await?
                    .map(|r| r.qty)
                    .unwrap_or(0);
                if before == req.new_qty {
                    return Ok(AdjustOutcome {
                        product_id: req.product_id,
                        bin_id: req.bin_id,
                        qty_before: before,
                        qty_after: before,
                        changed: false,
                    });
                }

                set_quantity(txn, req.product_id, req.bin_id, req.new_qty).await?;
                inventory_log::ActiveModel::entry(
                    LogAction::Adjust,
                    req.product_id,
                    None,
                    Some(req.bin_id),
                    before,
                    req.new_qty,
                    actor_id,
                    req.reason.clone(),
                )
                .insert(txn)
                .await?;

                Ok(AdjustOutcome {
                    product_id: req.product_id,
                    bin_id: req.bin_id,
                    qty_before: before,
                    qty_after: req.new_qty,
                    changed: true,
                })
            })
        })
        .await?;

        if outcome.changed {
            metrics::increment_counter(metrics::INVENTORY_ADJUSTMENTS);
            info!(
                product_id = %outcome.product_id,
                bin_id = %outcome.bin_id,
                before = outcome.qty_before,
                after = outcome.qty_after,
                "Inventory adjusted"
            );
            self.event_sender
                .send_or_log(Event::InventoryAdjusted {
                    product_id: outcome.product_id,
                    bin_id: outcome.bin_id,
                    qty_before: outcome.qty_before,
                    qty_after: outcome.qty_after,
                    actor_id,
                })
                .await;
        }

        Ok(outcome)
    }

    /// Receives stock for a product into a bin, creating the product by
    /// `ns_code` if it is new.
    #[instrument(skip(self))]
    pub async fn add_stock(
        &self,
        request: AddStockRequest,
        actor_id: Option<Uuid>,
    ) -> Result<AdjustOutcome, ServiceError> {
        request.validate()?;

        let req = request.clone();
        let outcome = db::transaction(&self.db_pool, "inventory.add", move |txn| {
            Box::pin(async move {
                find_bin(txn, req.bin_id).await?;
                let (product, _) = upsert_product(txn, &req.product).await?;

                let before = find_record(txn, product.id, req.bin_id)
                    .await?
                    .map(|r| r.qty)
                    .unwrap_or(0);
                let after = add_quantity(before, req.qty)?;
                set_quantity(txn, product.id, req.bin_id, after).await?;
                inventory_log::ActiveModel::entry(
                    LogAction::Adjust,
                    product.id,
                    None,
                    Some(req.bin_id),
                    before,
                    after,
                    actor_id,
                    req.reason.clone().or_else(|| Some("Stock added".to_string())),
                )
                .insert(txn)
                .await?;

                Ok(AdjustOutcome {
                    product_id: product.id,
                    bin_id: req.bin_id,
                    qty_before: before,
                    qty_after: after,
                    changed: true,
                })
            })
        })
        .await?;

        metrics::increment_counter(metrics::INVENTORY_ADJUSTMENTS);
        self.event_sender
            .send_or_log(Event::InventoryAdjusted {
                product_id: outcome.product_id,
                bin_id: outcome.bin_id,
                qty_before: outcome.qty_before,
                qty_after: outcome.qty_after,
                actor_id,
            })
            .await;

        Ok(outcome)
    }

    /// Current stock of one product across bins.
    #[instrument(skip(self))]
    pub async fn product_stock(&self, product_id: Uuid) -> Result<Vec<InventoryLine>, ServiceError> {
        let db = &*self.db_pool;
        let rows = Inventory::find()
            .filter(InventoryColumn::ProductId.eq(product_id))
            .all(db)
            .await?;
        let mut lines = hydrate_lines(db, rows).await?;
        lines.sort_by(|a, b| a.bin_code.cmp(&b.bin_code));
        Ok(lines)
    }

    /// Audit trail of one product, oldest first.
    #[instrument(skip(self))]
    pub async fn product_history(&self, product_id: Uuid) -> Result<Vec<LogLine>, ServiceError> {
        let db = &*self.db_pool;
        find_product(db, product_id).await?;

        let logs = InventoryLog::find()
            .filter(LogColumn::ProductId.eq(product_id))
            .order_by_asc(LogColumn::CreatedAt)
            .all(db)
            .await?;
        hydrate_logs(db, logs).await
    }

    /// Most recent audit rows across all products, newest first.
    #[instrument(skip(self))]
    pub async fn activity(
        &self,
        action: Option<LogAction>,
        limit: u64,
    ) -> Result<Vec<LogLine>, ServiceError> {
        let db = &*self.db_pool;
        let mut query = InventoryLog::find();
        if let Some(action) = action {
            query = query.filter(LogColumn::Action.eq(action));
        }
        let logs = query
            .order_by_desc(LogColumn::CreatedAt)
            .limit(limit.max(1))
            .all(db)
            .await?;
        hydrate_logs(db, logs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn add_quantity_sums_and_subtracts() {
        assert_eq!(add_quantity(10, 5).unwrap(), 15);
        assert_eq!(add_quantity(10, -4).unwrap(), 6);
    }

    #[test]
    fn add_quantity_rejects_overflow() {
        assert_matches!(
            add_quantity(i32::MAX, 1),
            Err(ServiceError::ValidationError(msg)) if msg.contains("exceeds")
        );
    }
}
