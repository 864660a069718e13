use anyhow::Result;
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::prelude::*;
use std::time::Duration;
use tracing::{error, info};

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_locations_tables::Migration),
            Box::new(m20240601_000002_create_products_table::Migration),
            Box::new(m20240601_000003_create_inventory_table::Migration),
            Box::new(m20240601_000004_create_inventory_logs_table::Migration),
            Box::new(m20240601_000005_create_stock_count_tables::Migration),
            Box::new(m20240601_000006_create_users_table::Migration),
            Box::new(m20240601_000007_create_notifications_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240601_000001_create_locations_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_locations_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Zones::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Zones::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Zones::Name).string().not_null().unique_key())
                        .col(
                            ColumnDef::new(Zones::ZoneType)
                                .string()
                                .not_null()
                                .default("standard"),
                        )
                        .col(
                            ColumnDef::new(Zones::SortOrder)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Zones::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Bins::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Bins::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Bins::BinCode).string().not_null().unique_key())
                        .col(ColumnDef::new(Bins::ZoneId).uuid().not_null())
                        .col(ColumnDef::new(Bins::Shelf).string().not_null())
                        .col(ColumnDef::new(Bins::Level).integer().not_null().default(0))
                        .col(
                            ColumnDef::new(Bins::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bins_zone_id")
                                .from(Bins::Table, Bins::ZoneId)
                                .to(Zones::Table, Zones::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bins_zone_id")
                        .table(Bins::Table)
                        .col(Bins::ZoneId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Bins::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Zones::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Zones {
        Table,
        Id,
        Name,
        ZoneType,
        SortOrder,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    pub enum Bins {
        Table,
        Id,
        BinCode,
        ZoneId,
        Shelf,
        Level,
        CreatedAt,
    }
}

mod m20240601_000002_create_products_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::ProductCode).string().not_null())
                        .col(ColumnDef::new(Products::ProductName).string().not_null())
                        .col(
                            ColumnDef::new(Products::Unit)
                                .string_len(16)
                                .not_null()
                                .default("EA"),
                        )
                        .col(ColumnDef::new(Products::NsCode).string().not_null().unique_key())
                        .col(ColumnDef::new(Products::NsName).string().not_null())
                        .col(ColumnDef::new(Products::NsSubGroup).string().null())
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_product_code")
                        .table(Products::Table)
                        .col(Products::ProductCode)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        ProductCode,
        ProductName,
        Unit,
        NsCode,
        NsName,
        NsSubGroup,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000003_create_inventory_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_inventory_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Inventory::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Inventory::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Inventory::ProductId).uuid().not_null())
                        .col(ColumnDef::new(Inventory::BinId).uuid().not_null())
                        .col(ColumnDef::new(Inventory::Qty).integer().not_null().default(0))
                        .col(
                            ColumnDef::new(Inventory::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_inventory_product_id")
                                .from(Inventory::Table, Inventory::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_inventory_bin_id")
                                .from(Inventory::Table, Inventory::BinId)
                                .to(Bins::Table, Bins::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .unique()
                        .name("idx_inventory_product_bin")
                        .table(Inventory::Table)
                        .col(Inventory::ProductId)
                        .col(Inventory::BinId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_bin_id")
                        .table(Inventory::Table)
                        .col(Inventory::BinId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Inventory::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Inventory {
        Table,
        Id,
        ProductId,
        BinId,
        Qty,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
    }

    #[derive(DeriveIden)]
    enum Bins {
        Table,
        Id,
    }
}

mod m20240601_000004_create_inventory_logs_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000004_create_inventory_logs_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Audit rows outlive the products and bins they mention, so no foreign keys.
            manager
                .create_table(
                    Table::create()
                        .table(InventoryLogs::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryLogs::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryLogs::Action).string().not_null())
                        .col(ColumnDef::new(InventoryLogs::ProductId).uuid().not_null())
                        .col(ColumnDef::new(InventoryLogs::FromBinId).uuid().null())
                        .col(ColumnDef::new(InventoryLogs::ToBinId).uuid().null())
                        .col(ColumnDef::new(InventoryLogs::QtyBefore).integer().not_null())
                        .col(ColumnDef::new(InventoryLogs::QtyAfter).integer().not_null())
                        .col(ColumnDef::new(InventoryLogs::ActorId).uuid().null())
                        .col(ColumnDef::new(InventoryLogs::Notes).text().null())
                        .col(
                            ColumnDef::new(InventoryLogs::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_logs_product_id")
                        .table(InventoryLogs::Table)
                        .col(InventoryLogs::ProductId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_logs_created_at")
                        .table(InventoryLogs::Table)
                        .col(InventoryLogs::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryLogs::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum InventoryLogs {
        Table,
        Id,
        Action,
        ProductId,
        FromBinId,
        ToBinId,
        QtyBefore,
        QtyAfter,
        ActorId,
        Notes,
        CreatedAt,
    }
}

mod m20240601_000005_create_stock_count_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000005_create_stock_count_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockCounts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockCounts::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockCounts::Name).string().not_null())
                        .col(ColumnDef::new(StockCounts::Month).integer().not_null())
                        .col(ColumnDef::new(StockCounts::Year).integer().not_null())
                        .col(
                            ColumnDef::new(StockCounts::Status)
                                .string()
                                .not_null()
                                .default("in_progress"),
                        )
                        .col(ColumnDef::new(StockCounts::CreatedBy).uuid().null())
                        .col(
                            ColumnDef::new(StockCounts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockCounts::CompletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(StockCounts::CompletedBy).uuid().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockCountZones::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockCountZones::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockCountZones::StockCountId).uuid().not_null())
                        .col(ColumnDef::new(StockCountZones::ZoneId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockCountZones::TotalItems)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockCountZones::CountedItems)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_count_zones_count_id")
                                .from(StockCountZones::Table, StockCountZones::StockCountId)
                                .to(StockCounts::Table, StockCounts::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .unique()
                        .name("idx_stock_count_zones_count_zone")
                        .table(StockCountZones::Table)
                        .col(StockCountZones::StockCountId)
                        .col(StockCountZones::ZoneId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockCountItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockCountItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockCountItems::StockCountId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockCountItems::StockCountZoneId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockCountItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(StockCountItems::BinId).uuid().not_null())
                        .col(ColumnDef::new(StockCountItems::SystemQty).integer().not_null())
                        .col(ColumnDef::new(StockCountItems::CountedQty).integer().null())
                        .col(ColumnDef::new(StockCountItems::Variance).integer().null())
                        .col(
                            ColumnDef::new(StockCountItems::Status)
                                .string()
                                .not_null()
                                .default("pending"),
                        )
                        .col(
                            ColumnDef::new(StockCountItems::IsUnexpected)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(StockCountItems::CountedBy).uuid().null())
                        .col(
                            ColumnDef::new(StockCountItems::CountedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_count_items_zone_count_id")
                                .from(StockCountItems::Table, StockCountItems::StockCountZoneId)
                                .to(StockCountZones::Table, StockCountZones::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .unique()
                        .name("idx_stock_count_items_zone_product_bin")
                        .table(StockCountItems::Table)
                        .col(StockCountItems::StockCountZoneId)
                        .col(StockCountItems::ProductId)
                        .col(StockCountItems::BinId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_count_items_count_id")
                        .table(StockCountItems::Table)
                        .col(StockCountItems::StockCountId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockCountItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StockCountZones::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StockCounts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockCounts {
        Table,
        Id,
        Name,
        Month,
        Year,
        Status,
        CreatedBy,
        CreatedAt,
        CompletedAt,
        CompletedBy,
    }

    #[derive(DeriveIden)]
    enum StockCountZones {
        Table,
        Id,
        StockCountId,
        ZoneId,
        TotalItems,
        CountedItems,
    }

    #[derive(DeriveIden)]
    enum StockCountItems {
        Table,
        Id,
        StockCountId,
        StockCountZoneId,
        ProductId,
        BinId,
        SystemQty,
        CountedQty,
        Variance,
        Status,
        IsUnexpected,
        CountedBy,
        CountedAt,
    }
}

mod m20240601_000006_create_users_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000006_create_users_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Users::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Users::Username).string().not_null().unique_key())
                        .col(ColumnDef::new(Users::DisplayName).string().not_null())
                        .col(
                            ColumnDef::new(Users::Role)
                                .string()
                                .not_null()
                                .default("warehouse"),
                        )
                        .col(ColumnDef::new(Users::EmployeeId).string().null().unique_key())
                        .col(
                            ColumnDef::new(Users::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Users::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Users::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Users {
        Table,
        Id,
        Username,
        DisplayName,
        Role,
        EmployeeId,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000007_create_notifications_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000007_create_notifications_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Notifications::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Notifications::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Notifications::UserId).uuid().null())
                        .col(
                            ColumnDef::new(Notifications::Kind)
                                .string()
                                .not_null()
                                .default("info"),
                        )
                        .col(ColumnDef::new(Notifications::Title).string().not_null())
                        .col(ColumnDef::new(Notifications::Message).text().not_null())
                        .col(ColumnDef::new(Notifications::Link).string().null())
                        .col(
                            ColumnDef::new(Notifications::IsRead)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Notifications::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_notifications_created_at")
                        .table(Notifications::Table)
                        .col(Notifications::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Notifications::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Notifications {
        Table,
        Id,
        UserId,
        Kind,
        Title,
        Message,
        Link,
        IsRead,
        CreatedAt,
    }
}

/// Connects to `db_url` and applies every pending migration.
pub async fn run_migration(db_url: &str) -> Result<()> {
    info!("Setting up database connection for migrations");

    let mut opt = ConnectOptions::new(db_url);
    opt.max_connections(5)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(300))
        .sqlx_logging(true);

    let db = Database::connect(opt).await?;

    info!("Running database migrations");

    match Migrator::up(&db, None).await {
        Ok(_) => {
            info!("Migrations completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Migration failed: {}", e);
            Err(e.into())
        }
    }
}
