use crate::{
    db::{self, DbPool},
    entities::{
        bin::{self, Entity as Bin},
        inventory::{self, Entity as Inventory},
        zone::{self, Entity as Zone},
    },
    errors::ServiceError,
    services::{
        bin_parser::{parse_bin_id, ParsedBin},
        inventory::{hydrate_lines, InventoryLine},
    },
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ZoneSummary {
    #[serde(flatten)]
    pub zone: zone::Model,
    pub bin_count: u64,
    pub item_count: u64,
    pub total_qty: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BinSummary {
    #[serde(flatten)]
    pub bin: bin::Model,
    pub item_count: u64,
    pub total_qty: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ZoneDetail {
    pub zone: zone::Model,
    pub bins: Vec<BinSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BinDetail {
    pub bin: bin::Model,
    pub zone: zone::Model,
    pub contents: Vec<InventoryLine>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBinRequest {
    #[validate(length(min = 1, max = 64))]
    pub bin_code: String,
}

/// Returns the zone named by `parsed`, creating it on first use.
pub async fn ensure_zone<C: ConnectionTrait>(
    conn: &C,
    parsed: &ParsedBin,
) -> Result<(zone::Model, bool), ServiceError> {
    if let Some(existing) = Zone::find()
        .filter(zone::Column::Name.eq(parsed.zone.as_str()))
        .one(conn)
        .await?
    {
        return Ok((existing, false));
    }

    let created = zone::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(parsed.zone.clone()),
        zone_type: Set(parsed.zone_type),
        sort_order: Set(parsed.sort_order()),
        ..Default::default()
    }
    .insert(conn)
    .await?;
    info!(zone = %created.name, "Created zone");
    Ok((created, true))
}

/// Returns the bin with this code, creating it (and its zone) on first use.
pub async fn ensure_bin<C: ConnectionTrait>(
    conn: &C,
    bin_code: &str,
) -> Result<(bin::Model, bool), ServiceError> {
    let code = bin_code.trim();
    if code.is_empty() {
        return Err(ServiceError::ValidationError(
            "Bin code must not be empty".to_string(),
        ));
    }

    if let Some(existing) = Bin::find()
        .filter(bin::Column::BinCode.eq(code))
        .one(conn)
        .await?
    {
        return Ok((existing, false));
    }

    let parsed = parse_bin_id(code);
    let (zone, _) = ensure_zone(conn, &parsed).await?;
    let created = bin::ActiveModel {
        id: Set(Uuid::new_v4()),
        bin_code: Set(code.to_string()),
        zone_id: Set(zone.id),
        shelf: Set(parsed.shelf),
        level: Set(parsed.level),
        ..Default::default()
    }
    .insert(conn)
    .await?;
    Ok((created, true))
}

/// Per-bin (item count, total qty).
async fn bin_totals<C: ConnectionTrait>(conn: &C) -> Result<HashMap<Uuid, (u64, i64)>, ServiceError> {
    let rows: Vec<(Uuid, i32)> = Inventory::find()
        .select_only()
        .column(inventory::Column::BinId)
        .column(inventory::Column::Qty)
        .into_tuple()
        .all(conn)
        .await?;

    let mut totals: HashMap<Uuid, (u64, i64)> = HashMap::new();
    for (bin_id, qty) in rows {
        let entry = totals.entry(bin_id).or_default();
        entry.0 += 1;
        entry.1 += i64::from(qty);
    }
    Ok(totals)
}

/// Zone and bin browsing.
#[derive(Clone)]
pub struct LocationService {
    db_pool: Arc<DbPool>,
}

impl LocationService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// All zones in display order with bin and stock totals.
    #[instrument(skip(self))]
    pub async fn list_zones(&self) -> Result<Vec<ZoneSummary>, ServiceError> {
        let db = &*self.db_pool;
        let zones = Zone::find()
            .order_by_asc(zone::Column::SortOrder)
            .order_by_asc(zone::Column::Name)
            .all(db)
            .await?;
        let bins: Vec<(Uuid, Uuid)> = Bin::find()
            .select_only()
            .column(bin::Column::Id)
            .column(bin::Column::ZoneId)
            .into_tuple()
            .all(db)
            .await?;
        let per_bin = bin_totals(db).await?;

        let mut per_zone: HashMap<Uuid, (u64, u64, i64)> = HashMap::new();
        for (bin_id, zone_id) in bins {
            let entry = per_zone.entry(zone_id).or_default();
            entry.0 += 1;
            if let Some((items, qty)) = per_bin.get(&bin_id) {
                entry.1 += items;
                entry.2 += qty;
            }
        }

        Ok(zones
            .into_iter()
            .map(|zone| {
                let (bin_count, item_count, total_qty) =
                    per_zone.get(&zone.id).copied().unwrap_or_default();
                ZoneSummary {
                    zone,
                    bin_count,
                    item_count,
                    total_qty,
                }
            })
            .collect())
    }

    /// One zone with its bins sorted by code.
    #[instrument(skip(self))]
    pub async fn get_zone(&self, zone_id: Uuid) -> Result<ZoneDetail, ServiceError> {
        let db = &*self.db_pool;
        let zone = Zone::find_by_id(zone_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Zone {} not found", zone_id)))?;
        let bins = Bin::find()
            .filter(bin::Column::ZoneId.eq(zone_id))
            .order_by_asc(bin::Column::BinCode)
            .all(db)
            .await?;
        let per_bin = bin_totals(db).await?;

        let bins = bins
            .into_iter()
            .map(|bin| {
                let (item_count, total_qty) = per_bin.get(&bin.id).copied().unwrap_or_default();
                BinSummary {
                    bin,
                    item_count,
                    total_qty,
                }
            })
            .collect();
        Ok(ZoneDetail { zone, bins })
    }

    /// A bin looked up by its code, with everything stored in it.
    #[instrument(skip(self))]
    pub async fn get_bin_by_code(&self, bin_code: &str) -> Result<BinDetail, ServiceError> {
        let db = &*self.db_pool;
        let bin = Bin::find()
            .filter(bin::Column::BinCode.eq(bin_code.trim()))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Bin {} not found", bin_code)))?;
        let zone = Zone::find_by_id(bin.zone_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Zone {} not found", bin.zone_id)))?;
        let rows = Inventory::find()
            .filter(inventory::Column::BinId.eq(bin.id))
            .all(db)
            .await?;
        let mut contents = hydrate_lines(db, rows).await?;
        contents.sort_by(|a, b| a.product_code.cmp(&b.product_code));

        Ok(BinDetail {
            bin,
            zone,
            contents,
        })
    }

    /// Registers a new bin; its zone is derived from the code.
    #[instrument(skip(self))]
    pub async fn create_bin(&self, request: CreateBinRequest) -> Result<bin::Model, ServiceError> {
        request.validate()?;
        let code = request.bin_code.trim().to_string();

        db::transaction(&self.db_pool, "bins.create", move |txn| {
            Box::pin(async move {
                let (bin, created) = ensure_bin(txn, &code).await?;
                if !created {
                    return Err(ServiceError::Conflict(format!(
                        "Bin {} already exists",
                        bin.bin_code
                    )));
                }
                Ok(bin)
            })
        })
        .await
    }
}
