//! Keeping invoice totals equal to the sum of their items.
//!
//! Inserts bump the total incrementally. Everything else (edits, deletes,
//! opening an invoice for editing) recomputes the total from the items,
//! which also repairs any drift left behind by earlier increments.

use sea_orm::{
    ActiveValue, ConnectionTrait, QueryFilter, QueryOrder, TransactionTrait, prelude::*,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    EngineError, Invoice, InvoiceItem, MoneyCents, ResultEngine, invoice_items, invoices,
};

use super::{Engine, require_owner, with_tx};

/// An invoice loaded for editing, total freshly recomputed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InvoiceDetail {
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
}

/// A total that did not match its items.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Drift {
    pub invoice_id: Uuid,
    pub stored: MoneyCents,
    pub recomputed: MoneyCents,
}

impl Engine {
    /// Add `delta` to the stored total of an invoice without reading its items.
    pub(super) async fn apply_increment<C: ConnectionTrait>(
        &self,
        db: &C,
        invoice_id: Uuid,
        delta: MoneyCents,
    ) -> ResultEngine<MoneyCents> {
        let model = invoices::Entity::find_by_id(invoice_id)
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("invoice not exists".to_string()))?;
        let total = MoneyCents::new(model.total_minor)
            .checked_add(delta)
            .ok_or_else(|| {
                EngineError::Consistency(format!("total of invoice {invoice_id} overflows"))
            })?;

        invoices::ActiveModel {
            id: ActiveValue::Set(invoice_id),
            total_minor: ActiveValue::Set(total.cents()),
            ..Default::default()
        }
        .update(db)
        .await?;
        Ok(total)
    }

    /// Overwrite the stored total with the exact sum of the owned items.
    ///
    /// Returns the drift when the stored total was wrong.
    pub(super) async fn recompute_in<C: ConnectionTrait>(
        &self,
        db: &C,
        invoice: &invoices::Model,
    ) -> ResultEngine<Option<Drift>> {
        let items = invoice_items::Entity::find()
            .filter(invoice_items::Column::InvoiceId.eq(invoice.id))
            .all(db)
            .await?;

        if let Some(bad) = items.iter().find(|item| item.amount_minor <= 0) {
            return Err(EngineError::Consistency(format!(
                "item {} of invoice {} has non-positive amount {}",
                bad.id,
                invoice.id,
                MoneyCents::new(bad.amount_minor)
            )));
        }
        let recomputed =
            MoneyCents::checked_sum(items.iter().map(|item| MoneyCents::new(item.amount_minor)))
                .ok_or_else(|| {
                    EngineError::Consistency(format!(
                        "sum of items of invoice {} overflows",
                        invoice.id
                    ))
                })?;

        let stored = MoneyCents::new(invoice.total_minor);
        if stored == recomputed {
            return Ok(None);
        }

        invoices::ActiveModel {
            id: ActiveValue::Set(invoice.id),
            total_minor: ActiveValue::Set(recomputed.cents()),
            ..Default::default()
        }
        .update(db)
        .await?;

        Ok(Some(Drift {
            invoice_id: invoice.id,
            stored,
            recomputed,
        }))
    }

    /// Recompute the total of one invoice from its items and persist it.
    pub async fn recompute_invoice(
        &self,
        owner_id: &str,
        invoice_id: Uuid,
    ) -> ResultEngine<MoneyCents> {
        let owner_id = require_owner(owner_id)?;
        let _guard = self.owner_locks.acquire(owner_id).await;
        let (model, drift) = with_tx!(self, |db_tx| {
            let model = self.require_invoice(&db_tx, owner_id, invoice_id).await?;
            let drift = self.recompute_in(&db_tx, &model).await?;
            Ok::<_, EngineError>((model, drift))
        })?;

        match drift {
            Some(drift) => {
                tracing::warn!(
                    "invoice {invoice_id} total drifted: stored {}, items sum {}",
                    drift.stored,
                    drift.recomputed
                );
                Ok(drift.recomputed)
            }
            None => Ok(MoneyCents::new(model.total_minor)),
        }
    }

    /// Load an invoice for editing.
    ///
    /// The total is recomputed first, so the returned invoice always agrees
    /// with the returned items.
    pub async fn open_invoice(
        &self,
        owner_id: &str,
        invoice_id: Uuid,
    ) -> ResultEngine<InvoiceDetail> {
        let owner_id = require_owner(owner_id)?;
        let _guard = self.owner_locks.acquire(owner_id).await;
        let (model, items) = with_tx!(self, |db_tx| {
            let model = self.require_invoice(&db_tx, owner_id, invoice_id).await?;
            if let Some(drift) = self.recompute_in(&db_tx, &model).await? {
                tracing::warn!(
                    "invoice {invoice_id} total drifted: stored {}, items sum {}",
                    drift.stored,
                    drift.recomputed
                );
            }
            let model = self.require_invoice(&db_tx, owner_id, invoice_id).await?;
            let items = invoice_items::Entity::find()
                .filter(invoice_items::Column::InvoiceId.eq(invoice_id))
                .order_by_asc(invoice_items::Column::OccurredAt)
                .all(&db_tx)
                .await?;
            Ok::<_, EngineError>((model, items))
        })?;

        Ok(InvoiceDetail {
            invoice: Invoice::try_from(model)?,
            items: items
                .into_iter()
                .map(InvoiceItem::try_from)
                .collect::<ResultEngine<Vec<_>>>()?,
        })
    }

    /// Recompute every invoice of the owner. Returns the invoices whose
    /// stored total was wrong, with the value each was corrected to.
    pub async fn reconcile_owner(&self, owner_id: &str) -> ResultEngine<Vec<Drift>> {
        let owner_id = require_owner(owner_id)?;
        let _guard = self.owner_locks.acquire(owner_id).await;
        let drifts = with_tx!(self, |db_tx| {
            let models = invoices::Entity::find()
                .filter(invoices::Column::OwnerId.eq(owner_id))
                .order_by_asc(invoices::Column::BillingDate)
                .all(&db_tx)
                .await?;
            let mut drifts = Vec::new();
            for model in &models {
                if let Some(drift) = self.recompute_in(&db_tx, model).await? {
                    drifts.push(drift);
                }
            }
            Ok::<_, EngineError>(drifts)
        })?;

        for drift in &drifts {
            tracing::warn!(
                "invoice {} total drifted: stored {}, items sum {}",
                drift.invoice_id,
                drift.stored,
                drift.recomputed
            );
        }
        tracing::info!("reconciled invoices of {owner_id}: {} corrected", drifts.len());
        Ok(drifts)
    }
}
