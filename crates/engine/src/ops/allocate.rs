use chrono::{DateTime, Utc};
use sea_orm::{ConnectionTrait, QueryFilter, QueryOrder, TransactionTrait, prelude::*};
use tracing::Instrument;
use uuid::Uuid;

use crate::util::normalize_required_text;
use crate::{
    EngineError, InvoiceItem, MoneyCents, PeriodTarget, PurchaseCmd, ResultEngine, invoice_items,
    invoices, split_amount,
};

use super::{
    Engine, invoices::AccountName, items::require_positive, require_owner, retry_busy, with_tx,
};

/// A purchase that passed validation: every value the write loop needs,
/// computed before the first write.
#[derive(Debug)]
struct PurchasePlan {
    owner_id: String,
    account: AccountName,
    description: String,
    category: String,
    occurred_at: DateTime<Utc>,
    open_invoice_id: Option<Uuid>,
    idempotency_key: Option<String>,
    installments: Vec<PlannedInstallment>,
}

#[derive(Debug)]
struct PlannedInstallment {
    offset: u32,
    amount: MoneyCents,
    target: PeriodTarget,
}

impl PurchasePlan {
    fn count(&self) -> u32 {
        self.installments.len() as u32
    }

    fn description_for(&self, installment: &PlannedInstallment) -> String {
        if self.count() > 1 {
            format!(
                "{} ({}/{})",
                self.description,
                installment.offset + 1,
                self.count()
            )
        } else {
            self.description.clone()
        }
    }

    /// Installments keep the purchase's time of day on their own date.
    fn occurred_at_for(&self, installment: &PlannedInstallment) -> DateTime<Utc> {
        installment
            .target
            .billing_date
            .and_time(self.occurred_at.time())
            .and_utc()
    }
}

impl Engine {
    fn plan_purchase(&self, cmd: &PurchaseCmd) -> ResultEngine<PurchasePlan> {
        let owner_id = require_owner(&cmd.owner_id)?.to_string();
        let account = AccountName::parse(&cmd.account)?;
        let description = normalize_required_text(&cmd.description, "description")?;
        let category = normalize_required_text(&cmd.category, "category")?;
        let total = require_positive(cmd.total)?;

        let count = cmd.installment_count;
        if cmd.installments {
            if !(1..=self.max_installments).contains(&count) {
                return Err(EngineError::Validation(format!(
                    "installment count must be between 1 and {}, got {count}",
                    self.max_installments
                )));
            }
        } else if count != 1 {
            return Err(EngineError::Validation(format!(
                "installment count {count} given for a single purchase"
            )));
        }
        // Installments of zero cents are refused rather than written.
        if total.cents() < i64::from(count) {
            return Err(EngineError::Validation(format!(
                "{total} cannot be split in {count} installments of at least 0.01"
            )));
        }
        if let Some(key) = cmd.idempotency_key.as_deref()
            && key.trim().is_empty()
        {
            return Err(EngineError::Validation(
                "idempotency key must not be empty".to_string(),
            ));
        }

        let anchor = cmd.occurred_at.date_naive();
        let amounts = split_amount(total, count, self.remainder_policy)?;
        let installments = amounts
            .into_iter()
            .zip(0..count)
            .map(|(amount, offset)| {
                Ok(PlannedInstallment {
                    offset,
                    amount,
                    target: PeriodTarget::resolve(anchor, offset)?,
                })
            })
            .collect::<ResultEngine<Vec<_>>>()?;

        Ok(PurchasePlan {
            owner_id,
            account,
            description,
            category,
            occurred_at: cmd.occurred_at,
            open_invoice_id: cmd.open_invoice_id,
            idempotency_key: cmd.idempotency_key.as_deref().map(|k| k.trim().to_string()),
            installments,
        })
    }

    /// Ids of the items already written for `key`, in installment order.
    async fn items_for_key<C: ConnectionTrait>(
        &self,
        db: &C,
        owner_id: &str,
        key: &str,
    ) -> ResultEngine<Vec<Uuid>> {
        let models = invoice_items::Entity::find()
            .filter(invoice_items::Column::CreatedBy.eq(owner_id))
            .filter(invoice_items::Column::IdempotencyKey.eq(key))
            .order_by_asc(invoice_items::Column::InstallmentNumber)
            .all(db)
            .await?;
        Ok(models.into_iter().map(|m| m.id).collect())
    }

    async fn write_installment<C: ConnectionTrait>(
        &self,
        db: &C,
        plan: &PurchasePlan,
        installment: &PlannedInstallment,
        purchase_id: Uuid,
        open_invoice: Option<&invoices::Model>,
    ) -> ResultEngine<Uuid> {
        let number = installment.offset + 1;
        let count = plan.count();
        let invoice = self
            .resolve_invoice_in(
                db,
                &plan.owner_id,
                &plan.account,
                installment.target,
                installment.offset,
                open_invoice,
            )
            .await?;

        let mut item = InvoiceItem::new(
            invoice.id,
            plan.owner_id.clone(),
            plan.description_for(installment),
            plan.category.clone(),
            installment.amount,
            plan.occurred_at_for(installment),
        );
        item.purchase_id = Some(purchase_id);
        item.installment_number = number;
        item.installment_count = count;
        item.idempotency_key = plan.idempotency_key.clone();

        let total = self.insert_item(db, &item).await?;
        tracing::debug!(
            "installment {number}/{count}: {} into invoice {} ({}), total now {total}",
            installment.amount,
            invoice.id,
            installment.target.month
        );
        Ok(item.id)
    }

    async fn write_installments<C: ConnectionTrait>(
        &self,
        db: &C,
        plan: &PurchasePlan,
    ) -> ResultEngine<Vec<Uuid>> {
        if let Some(key) = plan.idempotency_key.as_deref() {
            let existing = self.items_for_key(db, &plan.owner_id, key).await?;
            if !existing.is_empty() {
                tracing::debug!(
                    "purchase with key {key} already recorded ({} item(s))",
                    existing.len()
                );
                return Ok(existing);
            }
        }

        let open_invoice = match plan.open_invoice_id {
            Some(id) => Some(self.require_invoice(db, &plan.owner_id, id).await?),
            None => None,
        };

        let purchase_id = Uuid::new_v4();
        let mut ids = Vec::with_capacity(plan.installments.len());
        for installment in &plan.installments {
            let id = self
                .write_installment(db, plan, installment, purchase_id, open_invoice.as_ref())
                .await
                .map_err(|source| EngineError::Allocation {
                    installment: installment.offset + 1,
                    count: plan.count(),
                    source: Box::new(source),
                })?;
            ids.push(id);
        }

        Ok(ids)
    }

    async fn allocate_in_tx(&self, plan: &PurchasePlan) -> ResultEngine<Vec<Uuid>> {
        let _guard = self.owner_locks.acquire(&plan.owner_id).await;
        with_tx!(self, |db_tx| self.write_installments(&db_tx, plan).await)
    }

    /// Record a purchase, split across `installment_count` monthly invoices.
    ///
    /// Amounts come from [`split_amount`]; installment `i` is attached to the
    /// invoice of the month `i` months after the purchase date (created when
    /// missing) and increments that invoice's total. Installments are written
    /// in order inside one database transaction: either every installment is
    /// saved or none is.
    ///
    /// With an idempotency key, retrying a purchase that was already saved
    /// returns the ids of the existing items instead of writing new ones.
    ///
    /// Every installment must be worth at least one cent: a total smaller
    /// than `installment_count` cents is rejected with
    /// [`EngineError::Validation`] instead of producing zero-amount items.
    /// A transaction refused because another connection holds the database
    /// lock is retried a few times before the error is returned.
    ///
    /// Returns the created item ids in installment order.
    pub async fn allocate(&self, cmd: PurchaseCmd) -> ResultEngine<Vec<Uuid>> {
        let plan = self.plan_purchase(&cmd)?;
        let count = plan.count();

        let span = tracing::debug_span!(
            "allocate",
            owner = %plan.owner_id,
            account = %plan.account.key,
            count
        );
        let result = retry_busy("allocate", || self.allocate_in_tx(&plan))
            .instrument(span)
            .await;

        match &result {
            Ok(ids) => tracing::info!(
                "allocated {} for {} on {}: {count} installment(s), {} item(s)",
                cmd.total,
                plan.owner_id,
                plan.account.display,
                ids.len()
            ),
            Err(err) => tracing::warn!(
                "allocation of {} for {} on {} rolled back: {err}",
                cmd.total,
                plan.owner_id,
                plan.account.display
            ),
        }
        result
    }
}
