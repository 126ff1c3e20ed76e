//! Schema for invoice aggregates and their itemized transactions.
//!
//! - `invoices`: one monthly billing bucket per owner, account and month
//! - `invoice_items`: itemized purchases, each owned by exactly one invoice

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum Invoices {
    Table,
    Id,
    OwnerId,
    Account,
    AccountNorm,
    BillingDate,
    BillingMonth,
    TotalMinor,
    Status,
    IsCard,
    CreatedAt,
}

#[derive(Iden)]
enum InvoiceItems {
    Table,
    Id,
    InvoiceId,
    CreatedBy,
    Description,
    Category,
    AmountMinor,
    OccurredAt,
    PurchaseId,
    InstallmentNumber,
    InstallmentCount,
    IdempotencyKey,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Invoices::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Invoices::Id)
                            .blob()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Invoices::OwnerId).string().not_null())
                    .col(ColumnDef::new(Invoices::Account).string().not_null())
                    .col(ColumnDef::new(Invoices::AccountNorm).string().not_null())
                    .col(ColumnDef::new(Invoices::BillingDate).date().not_null())
                    .col(ColumnDef::new(Invoices::BillingMonth).string().not_null())
                    .col(
                        ColumnDef::new(Invoices::TotalMinor)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Invoices::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Invoices::IsCard)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Invoices::CreatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        // One aggregate per (owner, account, calendar month). The allocator
        // relies on this index for its insert-or-ignore upsert.
        manager
            .create_index(
                Index::create()
                    .name("uidx-invoices-owner_id-account_norm-billing_month")
                    .table(Invoices::Table)
                    .col(Invoices::OwnerId)
                    .col(Invoices::AccountNorm)
                    .col(Invoices::BillingMonth)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-invoices-owner_id-billing_date")
                    .table(Invoices::Table)
                    .col(Invoices::OwnerId)
                    .col(Invoices::BillingDate)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(InvoiceItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InvoiceItems::Id)
                            .blob()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(InvoiceItems::InvoiceId).blob().not_null())
                    .col(ColumnDef::new(InvoiceItems::CreatedBy).string().not_null())
                    .col(ColumnDef::new(InvoiceItems::Description).string().not_null())
                    .col(ColumnDef::new(InvoiceItems::Category).string().not_null())
                    .col(
                        ColumnDef::new(InvoiceItems::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InvoiceItems::OccurredAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(InvoiceItems::PurchaseId).blob())
                    .col(
                        ColumnDef::new(InvoiceItems::InstallmentNumber)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(InvoiceItems::InstallmentCount)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(ColumnDef::new(InvoiceItems::IdempotencyKey).string())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-invoice_items-invoice_id")
                            .from(InvoiceItems::Table, InvoiceItems::InvoiceId)
                            .to(Invoices::Table, Invoices::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-invoice_items-invoice_id")
                    .table(InvoiceItems::Table)
                    .col(InvoiceItems::InvoiceId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-invoice_items-purchase_id")
                    .table(InvoiceItems::Table)
                    .col(InvoiceItems::PurchaseId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uidx-invoice_items-created_by-idempotency_key-installment")
                    .table(InvoiceItems::Table)
                    .col(InvoiceItems::CreatedBy)
                    .col(InvoiceItems::IdempotencyKey)
                    .col(InvoiceItems::InstallmentNumber)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(InvoiceItems::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Invoices::Table).to_owned())
            .await?;
        Ok(())
    }
}
