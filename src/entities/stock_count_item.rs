use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ItemStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "counted")]
    Counted,
}

/// Snapshot of one (product, bin) inventory record taken when a count starts.
///
/// `system_qty` never changes after insert. `counted_qty` and `variance` stay
/// null until the item is counted, then `variance = counted_qty - system_qty`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "stock_count_items")]
#[schema(as = StockCountItem)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub stock_count_id: Uuid,
    pub stock_count_zone_id: Uuid,
    pub product_id: Uuid,
    pub bin_id: Uuid,
    pub system_qty: i32,
    pub counted_qty: Option<i32>,
    pub variance: Option<i32>,
    pub status: ItemStatus,
    pub is_unexpected: bool,
    pub counted_by: Option<Uuid>,
    pub counted_at: Option<DateTime<Utc>>,
}

impl Model {
    /// Variance of a counted item; `None` while pending.
    pub fn effective_variance(&self) -> Option<i32> {
        match self.status {
            ItemStatus::Counted => self.counted_qty.map(|c| c - self.system_qty),
            ItemStatus::Pending => None,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::stock_count::Entity",
        from = "Column::StockCountId",
        to = "super::stock_count::Column::Id"
    )]
    StockCount,
    #[sea_orm(
        belongs_to = "super::stock_count_zone::Entity",
        from = "Column::StockCountZoneId",
        to = "super::stock_count_zone::Column::Id"
    )]
    Zone,
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
    #[sea_orm(
        belongs_to = "super::bin::Entity",
        from = "Column::BinId",
        to = "super::bin::Column::Id"
    )]
    Bin,
}

impl Related<super::stock_count::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockCount.def()
    }
}

impl Related<super::stock_count_zone::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Zone.def()
    }
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::bin::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bin.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
