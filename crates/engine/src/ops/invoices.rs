use chrono::NaiveDate;
use sea_orm::{
    ConnectionTrait, QueryFilter, QueryOrder, TransactionTrait, prelude::*, sea_query::OnConflict,
};
use uuid::Uuid;

use crate::util::{account_key, normalize_required_text};
use crate::{
    BillingMonth, EngineError, Invoice, InvoiceFilter, InvoiceStatus, NewInvoiceCmd, PeriodTarget,
    ResultEngine, invoice_items, invoices,
};

use super::{Engine, require_owner, retry_busy, with_tx};

/// Account name in both forms the store keeps: display and matching key.
#[derive(Clone, Debug)]
pub(super) struct AccountName {
    pub(super) display: String,
    pub(super) key: String,
}

impl AccountName {
    pub(super) fn parse(raw: &str) -> ResultEngine<Self> {
        Ok(Self {
            display: normalize_required_text(raw, "account")?,
            key: account_key(raw)?,
        })
    }
}

impl Engine {
    pub(super) async fn require_invoice<C: ConnectionTrait>(
        &self,
        db: &C,
        owner_id: &str,
        invoice_id: Uuid,
    ) -> ResultEngine<invoices::Model> {
        invoices::Entity::find_by_id(invoice_id)
            .filter(invoices::Column::OwnerId.eq(owner_id))
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("invoice not exists".to_string()))
    }

    async fn invoice_for_month<C: ConnectionTrait>(
        &self,
        db: &C,
        owner_id: &str,
        account: &AccountName,
        month: BillingMonth,
    ) -> ResultEngine<Option<invoices::Model>> {
        invoices::Entity::find()
            .filter(invoices::Column::OwnerId.eq(owner_id))
            .filter(invoices::Column::AccountNorm.eq(account.key.as_str()))
            .filter(invoices::Column::BillingMonth.eq(month.key()))
            .one(db)
            .await
            .map_err(Into::into)
    }

    /// Find-or-create the card invoice for `target`.
    ///
    /// The insert-or-ignore against the unique `(owner, account, month)`
    /// index runs before the read, so the transaction takes the write lock
    /// first and a concurrent creator in another process ends up on the
    /// same row.
    pub(super) async fn upsert_card_invoice<C: ConnectionTrait>(
        &self,
        db: &C,
        owner_id: &str,
        account: &AccountName,
        target: PeriodTarget,
    ) -> ResultEngine<invoices::Model> {
        let candidate = invoices::new_active_model(
            owner_id,
            &account.display,
            &account.key,
            target.billing_date,
            true,
        );
        let inserted = invoices::Entity::insert(candidate)
            .on_conflict(
                OnConflict::columns([
                    invoices::Column::OwnerId,
                    invoices::Column::AccountNorm,
                    invoices::Column::BillingMonth,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(db)
            .await?;

        let model = self
            .invoice_for_month(db, owner_id, account, target.month)
            .await?
            .ok_or_else(|| {
                EngineError::Consistency(format!(
                    "invoice for {} {} vanished after upsert",
                    account.key, target.month
                ))
            })?;
        if inserted > 0 {
            tracing::debug!(
                "created invoice {} for {owner_id}/{} on {}",
                model.id,
                account.key,
                target.billing_date
            );
        } else {
            tracing::debug!(
                "reusing invoice {} for {owner_id}/{} {}",
                model.id,
                account.key,
                target.month
            );
        }
        Ok(model)
    }

    /// Resolve the invoice that owns installment `offset` of a purchase
    /// anchored on `anchor`.
    ///
    /// With `offset == 0` and an `open_invoice`, that invoice is reused as is.
    /// Otherwise the invoice of the target month is looked up and created
    /// (total 0, pending, card) when missing. Existing totals are preserved.
    pub(super) async fn resolve_invoice_in<C: ConnectionTrait>(
        &self,
        db: &C,
        owner_id: &str,
        account: &AccountName,
        target: PeriodTarget,
        offset: u32,
        open_invoice: Option<&invoices::Model>,
    ) -> ResultEngine<invoices::Model> {
        match open_invoice {
            Some(open) if offset == 0 => Ok(open.clone()),
            _ => self.upsert_card_invoice(db, owner_id, account, target).await,
        }
    }

    /// Find-or-create the invoice `offset` months after `anchor`.
    ///
    /// Calling this twice with the same owner, account and month returns the
    /// same invoice.
    pub async fn resolve_invoice(
        &self,
        owner_id: &str,
        account: &str,
        anchor: NaiveDate,
        offset: u32,
    ) -> ResultEngine<Invoice> {
        let owner_id = require_owner(owner_id)?;
        let account = AccountName::parse(account)?;
        let target = PeriodTarget::resolve(anchor, offset)?;

        let _guard = self.owner_locks.acquire(owner_id).await;
        let model = retry_busy("resolve invoice", || {
            self.resolve_in_tx(owner_id, &account, target, offset)
        })
        .await?;
        Invoice::try_from(model)
    }

    async fn resolve_in_tx(
        &self,
        owner_id: &str,
        account: &AccountName,
        target: PeriodTarget,
        offset: u32,
    ) -> ResultEngine<invoices::Model> {
        with_tx!(self, |db_tx| {
            self.resolve_invoice_in(&db_tx, owner_id, account, target, offset, None)
                .await
        })
    }

    /// Look up the invoice of `month` without creating it.
    pub async fn find_invoice_for_period(
        &self,
        owner_id: &str,
        account: &str,
        month: BillingMonth,
    ) -> ResultEngine<Option<Invoice>> {
        let owner_id = require_owner(owner_id)?;
        let account = AccountName::parse(account)?;
        self.invoice_for_month(&self.database, owner_id, &account, month)
            .await?
            .map(Invoice::try_from)
            .transpose()
    }

    /// Create an invoice by hand.
    ///
    /// Fails with [`EngineError::ExistingKey`] when the owner already has an
    /// invoice for that account and month.
    pub async fn create_invoice(&self, cmd: NewInvoiceCmd) -> ResultEngine<Uuid> {
        let owner_id = require_owner(&cmd.owner_id)?;
        let account = AccountName::parse(&cmd.account)?;
        let month = BillingMonth::of(cmd.billing_date);

        let _guard = self.owner_locks.acquire(owner_id).await;
        with_tx!(self, |db_tx| {
            if self
                .invoice_for_month(&db_tx, owner_id, &account, month)
                .await?
                .is_some()
            {
                return Err(EngineError::ExistingKey(format!(
                    "{} {month}",
                    account.display
                )));
            }
            let model = invoices::new_active_model(
                owner_id,
                &account.display,
                &account.key,
                cmd.billing_date,
                cmd.is_card,
            )
            .insert(&db_tx)
            .await?;
            tracing::info!("created invoice {} ({} {month})", model.id, account.display);
            Ok(model.id)
        })
    }

    pub async fn invoice(&self, owner_id: &str, invoice_id: Uuid) -> ResultEngine<Invoice> {
        let model = self
            .require_invoice(&self.database, owner_id, invoice_id)
            .await?;
        Invoice::try_from(model)
    }

    /// List the owner's invoices, oldest billing date first.
    pub async fn list_invoices(
        &self,
        owner_id: &str,
        filter: &InvoiceFilter,
    ) -> ResultEngine<Vec<Invoice>> {
        let owner_id = require_owner(owner_id)?;
        let mut query =
            invoices::Entity::find().filter(invoices::Column::OwnerId.eq(owner_id));
        if let Some(account) = filter.account.as_deref() {
            query = query.filter(invoices::Column::AccountNorm.eq(account_key(account)?));
        }
        if let Some(from) = filter.from_month {
            query = query.filter(invoices::Column::BillingDate.gte(from.first_day()?));
        }
        if let Some(to) = filter.to_month {
            query = query.filter(invoices::Column::BillingDate.lte(to.last_day()?));
        }
        if let Some(status) = filter.status {
            query = query.filter(invoices::Column::Status.eq(status.as_str()));
        }

        query
            .order_by_asc(invoices::Column::BillingDate)
            .order_by_asc(invoices::Column::AccountNorm)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Invoice::try_from)
            .collect()
    }

    /// Toggle an invoice between pending and paid.
    pub async fn set_invoice_status(
        &self,
        owner_id: &str,
        invoice_id: Uuid,
        status: InvoiceStatus,
    ) -> ResultEngine<Invoice> {
        let owner_id = require_owner(owner_id)?;
        let _guard = self.owner_locks.acquire(owner_id).await;
        let model = with_tx!(self, |db_tx| {
            let model = self.require_invoice(&db_tx, owner_id, invoice_id).await?;
            let current = InvoiceStatus::try_from(model.status.as_str())?;
            let next = current.transition(status)?;
            let mut active: invoices::ActiveModel = model.into();
            active.status = sea_orm::ActiveValue::Set(next.as_str().to_string());
            active.update(&db_tx).await.map_err(EngineError::from)
        })?;
        tracing::info!("invoice {invoice_id} is now {}", status.as_str());
        Invoice::try_from(model)
    }

    /// Delete an invoice together with every item it owns.
    ///
    /// Allowed from any status. Returns the number of items removed.
    pub async fn delete_invoice(&self, owner_id: &str, invoice_id: Uuid) -> ResultEngine<u64> {
        let owner_id = require_owner(owner_id)?;
        let _guard = self.owner_locks.acquire(owner_id).await;
        let removed = with_tx!(self, |db_tx| {
            let model = self.require_invoice(&db_tx, owner_id, invoice_id).await?;
            let items = invoice_items::Entity::delete_many()
                .filter(invoice_items::Column::InvoiceId.eq(model.id))
                .exec(&db_tx)
                .await?;
            invoices::Entity::delete_by_id(model.id).exec(&db_tx).await?;
            Ok::<_, EngineError>(items.rows_affected)
        })?;
        tracing::info!("deleted invoice {invoice_id} and {removed} item(s)");
        Ok(removed)
    }
}
