pub mod auth;
pub mod common;
pub mod health;
pub mod inventory;
pub mod locations;
pub mod notifications;
pub mod products;
pub mod stock_counts;
pub mod users;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        csv_import::ImportService, inventory::InventoryService, locations::LocationService,
        notifications::NotificationService, products::ProductService,
        stock_count::StockCountService, users::UserService,
    },
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub locations: LocationService,
    pub products: ProductService,
    pub inventory: InventoryService,
    pub imports: ImportService,
    pub stock_counts: StockCountService,
    pub users: UserService,
    pub notifications: NotificationService,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender, config: &AppConfig) -> Self {
        Self {
            locations: LocationService::new(db_pool.clone()),
            products: ProductService::new(db_pool.clone()),
            inventory: InventoryService::new(db_pool.clone(), event_sender.clone()),
            imports: ImportService::new(
                db_pool.clone(),
                event_sender.clone(),
                config.import_batch_size,
            ),
            stock_counts: StockCountService::new(db_pool.clone(), event_sender),
            users: UserService::new(db_pool.clone()),
            notifications: NotificationService::new(db_pool),
        }
    }
}
