pub mod bin;
pub mod inventory;
pub mod inventory_log;
pub mod notification;
pub mod product;
pub mod stock_count;
pub mod stock_count_item;
pub mod stock_count_zone;
pub mod user;
pub mod zone;
