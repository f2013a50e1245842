use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_users_table::Migration),
            Box::new(m20240101_000002_create_catalog_tables::Migration),
            Box::new(m20240101_000003_create_fulfillment_tables::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_users_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_users_table"
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
                        .col(ColumnDef::new(Users::AuthId).string().not_null())
                        .col(ColumnDef::new(Users::Email).string().not_null())
                        .col(ColumnDef::new(Users::FullName).string().not_null())
                        .col(ColumnDef::new(Users::VatId).string().null())
                        .col(
                            ColumnDef::new(Users::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Users::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_users_auth_id")
                        .table(Users::Table)
                        .col(Users::AuthId)
                        .unique()
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
    pub(super) enum Users {
        Table,
        Id,
        AuthId,
        Email,
        FullName,
        VatId,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_catalog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Plans::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Plans::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Plans::Name).string().not_null())
                        .col(
                            ColumnDef::new(Plans::PackageType)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Plans::Price).big_integer().not_null())
                        .col(ColumnDef::new(Plans::Days).integer().not_null())
                        .col(ColumnDef::new(Plans::SystemStep).string().not_null())
                        .col(
                            ColumnDef::new(Plans::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Plans::DisplayData).json().null())
                        .col(
                            ColumnDef::new(Plans::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Plans::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(
                            ColumnDef::new(Products::PackageType)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::ProductType)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Products::SystemStep).string().not_null())
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PlanProducts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PlanProducts::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PlanProducts::PlanId).uuid().not_null())
                        .col(ColumnDef::new(PlanProducts::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(PlanProducts::Position)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_plan_products_plan_product")
                        .table(PlanProducts::Table)
                        .col(PlanProducts::PlanId)
                        .col(PlanProducts::ProductId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Coupons::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Coupons::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Coupons::Code).string().not_null())
                        .col(
                            ColumnDef::new(Coupons::CouponType)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Coupons::Value).big_integer().not_null())
                        .col(
                            ColumnDef::new(Coupons::ValidFrom)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Coupons::ValidUntil)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Coupons::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Coupons::MaxUses).integer().not_null())
                        .col(
                            ColumnDef::new(Coupons::Uses)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Coupons::PlanId).uuid().null())
                        .col(ColumnDef::new(Coupons::OrganizationYearId).uuid().null())
                        .col(ColumnDef::new(Coupons::SystemStep).string().not_null())
                        .col(
                            ColumnDef::new(Coupons::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Coupons::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Lookups are by (code, system_step); codes repeat across steps.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_coupons_code_system_step")
                        .table(Coupons::Table)
                        .col(Coupons::Code)
                        .col(Coupons::SystemStep)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Coupons::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PlanProducts::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Plans::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Plans {
        Table,
        Id,
        Name,
        PackageType,
        Price,
        Days,
        SystemStep,
        IsActive,
        DisplayData,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Products {
        Table,
        Id,
        Name,
        PackageType,
        ProductType,
        SystemStep,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum PlanProducts {
        Table,
        Id,
        PlanId,
        ProductId,
        Position,
    }

    #[derive(DeriveIden)]
    pub(super) enum Coupons {
        Table,
        Id,
        Code,
        CouponType,
        Value,
        ValidFrom,
        ValidUntil,
        IsActive,
        MaxUses,
        Uses,
        PlanId,
        OrganizationYearId,
        SystemStep,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_fulfillment_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_fulfillment_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PaymentTransactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PaymentTransactions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PaymentTransactions::UserId).uuid().not_null())
                        .col(ColumnDef::new(PaymentTransactions::PlanId).uuid().not_null())
                        .col(ColumnDef::new(PaymentTransactions::CouponId).uuid().null())
                        .col(
                            ColumnDef::new(PaymentTransactions::Status)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentTransactions::TotalPrice)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentTransactions::BookIncluded)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(PaymentTransactions::StudentName)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(PaymentTransactions::Email).string().null())
                        .col(
                            ColumnDef::new(PaymentTransactions::SystemStep)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentTransactions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentTransactions::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payment_transactions_user_id")
                        .table(PaymentTransactions::Table)
                        .col(PaymentTransactions::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payment_transactions_status")
                        .table(PaymentTransactions::Table)
                        .col(PaymentTransactions::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Subscriptions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Subscriptions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Subscriptions::UserId).uuid().not_null())
                        .col(ColumnDef::new(Subscriptions::ProductId).uuid().not_null())
                        .col(ColumnDef::new(Subscriptions::CouponId).uuid().null())
                        .col(
                            ColumnDef::new(Subscriptions::PaymentTransactionId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Subscriptions::SystemUntil)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Subscriptions::SystemStep).string().not_null())
                        .col(
                            ColumnDef::new(Subscriptions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Grant idempotency boundary: one subscription per
            // (transaction, product) pair.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_subscriptions_transaction_product")
                        .table(Subscriptions::Table)
                        .col(Subscriptions::PaymentTransactionId)
                        .col(Subscriptions::ProductId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_subscriptions_user_id")
                        .table(Subscriptions::Table)
                        .col(Subscriptions::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(BookPurchases::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(BookPurchases::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BookPurchases::PaymentTransactionId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(BookPurchases::UserId).uuid().not_null())
                        .col(ColumnDef::new(BookPurchases::ProductId).uuid().not_null())
                        .col(ColumnDef::new(BookPurchases::Filename).string().not_null())
                        .col(ColumnDef::new(BookPurchases::Bucket).string().not_null())
                        .col(
                            ColumnDef::new(BookPurchases::Generated)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(BookPurchases::VatId).string().not_null())
                        .col(
                            ColumnDef::new(BookPurchases::ValidUntil)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BookPurchases::CreatedAt)
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
                        .name("idx_book_purchases_transaction_product")
                        .table(BookPurchases::Table)
                        .col(BookPurchases::PaymentTransactionId)
                        .col(BookPurchases::ProductId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BookPurchases::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Subscriptions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PaymentTransactions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum PaymentTransactions {
        Table,
        Id,
        UserId,
        PlanId,
        CouponId,
        Status,
        TotalPrice,
        BookIncluded,
        StudentName,
        Email,
        SystemStep,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Subscriptions {
        Table,
        Id,
        UserId,
        ProductId,
        CouponId,
        PaymentTransactionId,
        SystemUntil,
        SystemStep,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum BookPurchases {
        Table,
        Id,
        PaymentTransactionId,
        UserId,
        ProductId,
        Filename,
        Bucket,
        Generated,
        VatId,
        ValidUntil,
        CreatedAt,
    }
}
