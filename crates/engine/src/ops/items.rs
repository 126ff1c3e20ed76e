use std::collections::BTreeSet;

use sea_orm::{
    ActiveValue, ConnectionTrait, QueryFilter, QueryOrder, TransactionTrait, prelude::*,
};
use uuid::Uuid;

use crate::util::normalize_required_text;
use crate::{
    AddItemCmd, EngineError, InvoiceItem, MoneyCents, ResultEngine, UpdateItemCmd,
    invoice_items, invoices,
};

use super::{Engine, require_owner, with_tx};

pub(super) fn require_positive(amount: MoneyCents) -> ResultEngine<MoneyCents> {
    if !amount.is_positive() {
        return Err(EngineError::Validation(
            "amount must be > 0".to_string(),
        ));
    }
    Ok(amount)
}

impl Engine {
    async fn require_item<C: ConnectionTrait>(
        &self,
        db: &C,
        owner_id: &str,
        item_id: Uuid,
    ) -> ResultEngine<invoice_items::Model> {
        invoice_items::Entity::find_by_id(item_id)
            .filter(invoice_items::Column::CreatedBy.eq(owner_id))
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("invoice item not exists".to_string()))
    }

    /// Persist a new item and bump the owning invoice's total by its amount.
    pub(super) async fn insert_item<C: ConnectionTrait>(
        &self,
        db: &C,
        item: &InvoiceItem,
    ) -> ResultEngine<MoneyCents> {
        invoice_items::ActiveModel::from(item).insert(db).await?;
        self.apply_increment(db, item.invoice_id, item.amount).await
    }

    /// Recompute the invoice owning `invoice_id` and log any drift found.
    async fn settle_invoice<C: ConnectionTrait>(
        &self,
        db: &C,
        owner_id: &str,
        invoice_id: Uuid,
    ) -> ResultEngine<()> {
        let invoice = self.require_invoice(db, owner_id, invoice_id).await?;
        if let Some(drift) = self.recompute_in(db, &invoice).await? {
            tracing::debug!(
                "invoice {invoice_id} total {} -> {}",
                drift.stored,
                drift.recomputed
            );
        }
        Ok(())
    }

    /// Add a single itemized expense to an existing invoice.
    pub async fn add_item(&self, cmd: AddItemCmd) -> ResultEngine<Uuid> {
        let owner_id = require_owner(&cmd.owner_id)?;
        let amount = require_positive(cmd.amount)?;
        let description = normalize_required_text(&cmd.description, "description")?;
        let category = normalize_required_text(&cmd.category, "category")?;

        let _guard = self.owner_locks.acquire(owner_id).await;
        let item = with_tx!(self, |db_tx| {
            let invoice = self
                .require_invoice(&db_tx, owner_id, cmd.invoice_id)
                .await?;
            let item = InvoiceItem::new(
                invoice.id,
                owner_id.to_string(),
                description,
                category,
                amount,
                cmd.occurred_at,
            );
            self.insert_item(&db_tx, &item).await?;
            Ok::<_, EngineError>(item)
        })?;
        tracing::info!("added item {} ({}) to invoice {}", item.id, item.amount, item.invoice_id);
        Ok(item.id)
    }

    /// Edit an item in place, then recompute its invoice.
    pub async fn update_item(&self, cmd: UpdateItemCmd) -> ResultEngine<InvoiceItem> {
        let owner_id = require_owner(&cmd.owner_id)?;
        if cmd.amount.is_none()
            && cmd.description.is_none()
            && cmd.category.is_none()
            && cmd.occurred_at.is_none()
        {
            return Err(EngineError::Validation(
                "nothing to update".to_string(),
            ));
        }
        let amount = cmd.amount.map(require_positive).transpose()?;
        let description = cmd
            .description
            .as_deref()
            .map(|d| normalize_required_text(d, "description"))
            .transpose()?;
        let category = cmd
            .category
            .as_deref()
            .map(|c| normalize_required_text(c, "category"))
            .transpose()?;

        let _guard = self.owner_locks.acquire(owner_id).await;
        let model = with_tx!(self, |db_tx| {
            let model = self.require_item(&db_tx, owner_id, cmd.item_id).await?;
            let invoice_id = model.invoice_id;

            let mut active: invoice_items::ActiveModel = model.into();
            if let Some(amount) = amount {
                active.amount_minor = ActiveValue::Set(amount.cents());
            }
            if let Some(description) = description {
                active.description = ActiveValue::Set(description);
            }
            if let Some(category) = category {
                active.category = ActiveValue::Set(category);
            }
            if let Some(occurred_at) = cmd.occurred_at {
                active.occurred_at = ActiveValue::Set(occurred_at);
            }
            let updated = active.update(&db_tx).await?;

            self.settle_invoice(&db_tx, owner_id, invoice_id).await?;
            Ok::<_, EngineError>(updated)
        })?;
        tracing::info!("updated item {}", model.id);
        InvoiceItem::try_from(model)
    }

    /// Delete an item, then recompute its invoice.
    pub async fn delete_item(&self, owner_id: &str, item_id: Uuid) -> ResultEngine<()> {
        let owner_id = require_owner(owner_id)?;
        let _guard = self.owner_locks.acquire(owner_id).await;
        with_tx!(self, |db_tx| {
            let model = self.require_item(&db_tx, owner_id, item_id).await?;
            invoice_items::Entity::delete_by_id(model.id)
                .exec(&db_tx)
                .await?;
            self.settle_invoice(&db_tx, owner_id, model.invoice_id)
                .await
        })?;
        tracing::info!("deleted item {item_id}");
        Ok(())
    }

    /// Delete every installment of an allocated purchase and recompute the
    /// invoices they belonged to. Returns the number of items removed.
    pub async fn delete_purchase(&self, owner_id: &str, purchase_id: Uuid) -> ResultEngine<u64> {
        let owner_id = require_owner(owner_id)?;
        let _guard = self.owner_locks.acquire(owner_id).await;
        let removed = with_tx!(self, |db_tx| {
            let models = invoice_items::Entity::find()
                .filter(invoice_items::Column::CreatedBy.eq(owner_id))
                .filter(invoice_items::Column::PurchaseId.eq(purchase_id))
                .all(&db_tx)
                .await?;
            if models.is_empty() {
                return Err(EngineError::KeyNotFound("purchase not exists".to_string()));
            }
            let touched: BTreeSet<Uuid> = models.iter().map(|m| m.invoice_id).collect();

            let deleted = invoice_items::Entity::delete_many()
                .filter(invoice_items::Column::CreatedBy.eq(owner_id))
                .filter(invoice_items::Column::PurchaseId.eq(purchase_id))
                .exec(&db_tx)
                .await?;
            for invoice_id in touched {
                self.settle_invoice(&db_tx, owner_id, invoice_id).await?;
            }
            Ok::<_, EngineError>(deleted.rows_affected)
        })?;
        tracing::info!("deleted purchase {purchase_id}: {removed} installment(s)");
        Ok(removed)
    }

    pub async fn item(&self, owner_id: &str, item_id: Uuid) -> ResultEngine<InvoiceItem> {
        let model = self.require_item(&self.database, owner_id, item_id).await?;
        InvoiceItem::try_from(model)
    }

    /// Items of an invoice, oldest first.
    pub async fn items_for_invoice(
        &self,
        owner_id: &str,
        invoice_id: Uuid,
    ) -> ResultEngine<Vec<InvoiceItem>> {
        let invoice: invoices::Model = self
            .require_invoice(&self.database, owner_id, invoice_id)
            .await?;
        invoice_items::Entity::find()
            .filter(invoice_items::Column::InvoiceId.eq(invoice.id))
            .order_by_asc(invoice_items::Column::OccurredAt)
            .order_by_asc(invoice_items::Column::InstallmentNumber)
            .all(&self.database)
            .await?
            .into_iter()
            .map(InvoiceItem::try_from)
            .collect()
    }

    /// Installments of one purchase, in installment order.
    pub async fn purchase_items(
        &self,
        owner_id: &str,
        purchase_id: Uuid,
    ) -> ResultEngine<Vec<InvoiceItem>> {
        let owner_id = require_owner(owner_id)?;
        invoice_items::Entity::find()
            .filter(invoice_items::Column::CreatedBy.eq(owner_id))
            .filter(invoice_items::Column::PurchaseId.eq(purchase_id))
            .order_by_asc(invoice_items::Column::InstallmentNumber)
            .all(&self.database)
            .await?
            .into_iter()
            .map(InvoiceItem::try_from)
            .collect()
    }
}
