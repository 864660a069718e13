// Pure helpers
pub mod bin_parser;

// Catalog and locations
pub mod locations;
pub mod products;

// Stock movements and audit trail
pub mod csv_import;
pub mod inventory;

// Periodic counting
pub mod stock_count;

// Staff and inbox
pub mod notifications;
pub mod users;
