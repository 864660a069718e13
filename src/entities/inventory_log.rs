use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Kind of change recorded in the inventory audit trail.
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
pub enum LogAction {
    #[sea_orm(string_value = "move")]
    Move,
    #[sea_orm(string_value = "adjust")]
    Adjust,
    #[sea_orm(string_value = "import")]
    Import,
    #[sea_orm(string_value = "count_adjust")]
    CountAdjust,
}

/// Append-only audit row. Never updated or deleted.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "inventory_logs")]
#[schema(as = InventoryLog)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub action: LogAction,
    pub product_id: Uuid,
    pub from_bin_id: Option<Uuid>,
    pub to_bin_id: Option<Uuid>,
    pub qty_before: i32,
    pub qty_after: i32,
    pub actor_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if let ActiveValue::NotSet = active_model.created_at {
            active_model.created_at = Set(Utc::now());
        }
        Ok(active_model)
    }
}

impl ActiveModel {
    /// Builds a log row; callers insert it inside their own transaction.
    #[allow(clippy::too_many_arguments)]
    pub fn entry(
        action: LogAction,
        product_id: Uuid,
        from_bin_id: Option<Uuid>,
        to_bin_id: Option<Uuid>,
        qty_before: i32,
        qty_after: i32,
        actor_id: Option<Uuid>,
        notes: Option<String>,
    ) -> Self {
        Self {
            id: Set(Uuid::new_v4()),
            action: Set(action),
            product_id: Set(product_id),
            from_bin_id: Set(from_bin_id),
            to_bin_id: Set(to_bin_id),
            qty_before: Set(qty_before),
            qty_after: Set(qty_after),
            actor_id: Set(actor_id),
            notes: Set(notes),
            created_at: Set(Utc::now()),
        }
    }
}
