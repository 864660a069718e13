use crate::{
    db::DbPool,
    entities::notification::{self, Column as NotificationColumn, Entity as Notification, NotificationKind},
    errors::ServiceError,
    events::{Event, EventHandler},
};
use async_trait::async_trait;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

/// How many notifications the inbox shows.
pub const INBOX_SIZE: u64 = 20;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Inbox {
    pub items: Vec<notification::Model>,
    pub unread: u64,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
}

fn visible_to(user_id: Uuid) -> Condition {
    Condition::any()
        .add(NotificationColumn::UserId.eq(user_id))
        .add(NotificationColumn::UserId.is_null())
}

/// Stored notifications. Rows with no `user_id` are broadcast to everyone.
#[derive(Clone)]
pub struct NotificationService {
    db_pool: Arc<DbPool>,
}

impl NotificationService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self))]
    pub async fn create(&self, new: NewNotification) -> Result<notification::Model, ServiceError> {
        Ok(notification::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(new.user_id),
            kind: Set(new.kind),
            title: Set(new.title),
            message: Set(new.message),
            link: Set(new.link),
            is_read: Set(false),
            ..Default::default()
        }
        .insert(&*self.db_pool)
        .await?)
    }

    /// Latest notifications for `user_id`, own and broadcast, newest first.
    #[instrument(skip(self))]
    pub async fn inbox(&self, user_id: Uuid) -> Result<Inbox, ServiceError> {
        let db = &*self.db_pool;
        let items = Notification::find()
            .filter(visible_to(user_id))
            .order_by_desc(NotificationColumn::CreatedAt)
            .limit(INBOX_SIZE)
            .all(db)
            .await?;
        let unread = Notification::find()
            .filter(visible_to(user_id))
            .filter(NotificationColumn::IsRead.eq(false))
            .count(db)
            .await?;
        Ok(Inbox { items, unread })
    }

    #[instrument(skip(self))]
    pub async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<(), ServiceError> {
        let result = Notification::update_many()
            .col_expr(NotificationColumn::IsRead, Expr::value(true))
            .filter(NotificationColumn::Id.eq(id))
            .filter(visible_to(user_id))
            .exec(&*self.db_pool)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Notification {} not found",
                id
            )));
        }
        Ok(())
    }

    /// Returns how many notifications changed.
    #[instrument(skip(self))]
    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        let result = Notification::update_many()
            .col_expr(NotificationColumn::IsRead, Expr::value(true))
            .filter(visible_to(user_id))
            .filter(NotificationColumn::IsRead.eq(false))
            .exec(&*self.db_pool)
            .await?;
        Ok(result.rows_affected)
    }
}

/// Turns domain events into inbox entries.
pub struct NotificationHandler {
    service: NotificationService,
    low_stock_threshold: i32,
}

impl NotificationHandler {
    pub fn new(service: NotificationService, low_stock_threshold: i32) -> Self {
        Self {
            service,
            low_stock_threshold,
        }
    }

    fn notification_for(&self, event: &Event) -> Option<NewNotification> {
        match event {
            Event::StockCountStarted {
                count_id,
                name,
                zones,
                items,
                ..
            } => Some(NewNotification {
                user_id: None,
                kind: NotificationKind::StockCount,
                title: "Stock count started".to_string(),
                message: format!("{}: {} zones, {} items to count", name, zones, items),
                link: Some(format!("/stock-counts/{}", count_id)),
            }),
            Event::StockCountCompleted {
                count_id,
                name,
                adjustments,
                ..
            } => Some(NewNotification {
                user_id: None,
                kind: NotificationKind::StockCount,
                title: "Stock count completed".to_string(),
                message: format!("{}: {} inventory adjustments applied", name, adjustments),
                link: Some(format!("/stock-counts/{}", count_id)),
            }),
            Event::ImportCompleted {
                rows_total,
                inventory_updated,
                errors_count,
                actor_id,
            } => Some(NewNotification {
                user_id: *actor_id,
                kind: NotificationKind::Success,
                title: "Import finished".to_string(),
                message: format!(
                    "{} rows read, {} records updated, {} errors",
                    rows_total, inventory_updated, errors_count
                ),
                link: None,
            }),
            Event::InventoryMoved {
                product_id,
                source_remaining,
                ..
            } if *source_remaining <= self.low_stock_threshold => Some(low_stock(*product_id, *source_remaining)),
            Event::InventoryAdjusted {
                product_id,
                qty_after,
                ..
            } if *qty_after <= self.low_stock_threshold => Some(low_stock(*product_id, *qty_after)),
            _ => None,
        }
    }
}

fn low_stock(product_id: Uuid, qty: i32) -> NewNotification {
    NewNotification {
        user_id: None,
        kind: NotificationKind::LowStock,
        title: "Low stock".to_string(),
        message: format!("Only {} left in a bin", qty),
        link: Some(format!("/products/{}", product_id)),
    }
}

#[async_trait]
impl EventHandler for NotificationHandler {
    async fn handle_event(&self, event: &Event) -> Result<(), String> {
        let Some(new) = self.notification_for(event) else {
            return Ok(());
        };
        debug!(event = event.name(), kind = %new.kind, "Creating notification");
        self.service
            .create(new)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn handler() -> NotificationHandler {
        let db = crate::db::establish_connection("sqlite::memory:")
            .await
            .unwrap();
        NotificationHandler::new(NotificationService::new(Arc::new(db)), 10)
    }

    #[tokio::test]
    async fn low_stock_only_at_or_below_threshold() {
        let h = handler().await;
        let moved = |remaining| Event::InventoryMoved {
            product_id: Uuid::nil(),
            from_bin_id: Uuid::nil(),
            to_bin_id: Uuid::nil(),
            qty: 1,
            source_remaining: remaining,
            actor_id: None,
        };
        assert!(h.notification_for(&moved(11)).is_none());
        let n = h.notification_for(&moved(10)).unwrap();
        assert_eq!(n.kind, NotificationKind::LowStock);
    }

    #[tokio::test]
    async fn import_notifies_the_actor() {
        let h = handler().await;
        let actor = Uuid::new_v4();
        let n = h
            .notification_for(&Event::ImportCompleted {
                rows_total: 3,
                inventory_updated: 2,
                errors_count: 1,
                actor_id: Some(actor),
            })
            .unwrap();
        assert_eq!(n.user_id, Some(actor));
        assert_eq!(n.kind, NotificationKind::Success);
        assert!(n.message.contains("1 errors"));
    }

    #[tokio::test]
    async fn deletions_are_silent() {
        let h = handler().await;
        assert!(h
            .notification_for(&Event::StockCountDeleted {
                count_id: Uuid::nil()
            })
            .is_none());
    }
}
