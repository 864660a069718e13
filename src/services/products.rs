use crate::{
    db::DbPool,
    entities::product::{self, Column as ProductColumn, Entity as Product, DEFAULT_UNIT},
    errors::ServiceError,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Product fields as they arrive from a CSV row or an "add stock" form.
///
/// Only `product_code` is required; see [`ProductInput::resolved`] for the
/// fallbacks applied to the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
pub struct ProductInput {
    #[validate(length(min = 1, max = 64))]
    pub product_code: String,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub ns_code: Option<String>,
    #[serde(default)]
    pub ns_name: Option<String>,
    #[serde(default)]
    pub ns_sub_group: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
}

/// A [`ProductInput`] with every fallback applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProduct {
    pub product_code: String,
    pub product_name: String,
    pub ns_code: String,
    pub ns_name: String,
    pub ns_sub_group: Option<String>,
    pub unit: String,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl ProductInput {
    /// `ns_code` falls back to `product_code`, the two names fall back to each
    /// other (then to the code) and `unit` falls back to `EA`.
    pub fn resolved(&self) -> ResolvedProduct {
        let product_code = self.product_code.trim().to_string();
        let product_name = non_empty(&self.product_name);
        let ns_name = non_empty(&self.ns_name);
        ResolvedProduct {
            ns_code: non_empty(&self.ns_code).unwrap_or_else(|| product_code.clone()),
            product_name: product_name
                .clone()
                .or_else(|| ns_name.clone())
                .unwrap_or_else(|| product_code.clone()),
            ns_name: ns_name
                .or(product_name)
                .unwrap_or_else(|| product_code.clone()),
            ns_sub_group: non_empty(&self.ns_sub_group),
            unit: non_empty(&self.unit).unwrap_or_else(|| DEFAULT_UNIT.to_string()),
            product_code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Finds the product by `ns_code`, inserting or refreshing it as needed.
/// Runs on whatever connection or transaction the caller holds.
pub async fn upsert_product<C: ConnectionTrait>(
    conn: &C,
    input: &ProductInput,
) -> Result<(product::Model, UpsertOutcome), ServiceError> {
    let p = input.resolved();

    let existing = Product::find()
        .filter(ProductColumn::NsCode.eq(p.ns_code.as_str()))
        .one(conn)
        .await?;

    match existing {
        None => {
            let created = product::ActiveModel {
                id: Set(Uuid::new_v4()),
                product_code: Set(p.product_code),
                product_name: Set(p.product_name),
                unit: Set(p.unit),
                ns_code: Set(p.ns_code),
                ns_name: Set(p.ns_name),
                ns_sub_group: Set(p.ns_sub_group),
                ..Default::default()
            }
            .insert(conn)
            .await?;
            Ok((created, UpsertOutcome::Created))
        }
        Some(model) => {
            let unchanged = model.product_code == p.product_code
                && model.product_name == p.product_name
                && model.ns_name == p.ns_name
                && model.unit == p.unit
                && (p.ns_sub_group.is_none() || model.ns_sub_group == p.ns_sub_group);
            if unchanged {
                return Ok((model, UpsertOutcome::Unchanged));
            }

            let keep_sub_group = model.ns_sub_group.clone();
            let mut active = model.into_active_model();
            active.product_code = Set(p.product_code);
            active.product_name = Set(p.product_name);
            active.ns_name = Set(p.ns_name);
            active.unit = Set(p.unit);
            active.ns_sub_group = Set(p.ns_sub_group.or(keep_sub_group));
            let updated = active.update(conn).await?;
            Ok((updated, UpsertOutcome::Updated))
        }
    }
}

pub(crate) async fn find_product<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<product::Model, ServiceError> {
    Product::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))
}

/// Read side of the product catalog.
#[derive(Clone)]
pub struct ProductService {
    db_pool: Arc<DbPool>,
}

impl ProductService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Lists products by code, optionally matching `search` against codes and names.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        page: u64,
        limit: u64,
        search: Option<String>,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        let db = &*self.db_pool;
        let mut query = Product::find();

        if let Some(term) = search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(ProductColumn::ProductCode.contains(term))
                    .add(ProductColumn::ProductName.contains(term))
                    .add(ProductColumn::NsCode.contains(term))
                    .add(ProductColumn::NsName.contains(term)),
            );
        }

        let paginator = query
            .order_by_asc(ProductColumn::ProductCode)
            .paginate(db, limit.max(1));
        let total = paginator.num_items().await.map_err(ServiceError::DatabaseError)?;
        let products = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::DatabaseError)?;

        debug!(total, returned = products.len(), "Listed products");
        Ok((products, total))
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        find_product(&*self.db_pool, id).await
    }
}
