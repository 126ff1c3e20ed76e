//! Command structs for engine operations.
//!
//! These types group parameters for write operations (allocate, create,
//! edit), keeping call sites readable and avoiding long argument lists.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::{BillingMonth, InvoiceStatus, MoneyCents};

/// A purchase to be recorded, possibly split in installments.
///
/// The date of `occurred_at` is the billing anchor: installment `i` lands in
/// the invoice of the month `i` months later.
#[derive(Clone, Debug)]
pub struct PurchaseCmd {
    pub owner_id: String,
    pub account: String,
    pub total: MoneyCents,
    pub description: String,
    pub category: String,
    pub occurred_at: DateTime<Utc>,
    /// `true` for a card purchase paid in installments.
    pub installments: bool,
    pub installment_count: u32,
    /// Invoice the caller already holds open; reused for the first
    /// installment without a lookup.
    pub open_invoice_id: Option<Uuid>,
    pub idempotency_key: Option<String>,
}

impl PurchaseCmd {
    #[must_use]
    pub fn new(
        owner_id: impl Into<String>,
        account: impl Into<String>,
        total: MoneyCents,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            account: account.into(),
            total,
            description: String::new(),
            category: String::new(),
            occurred_at,
            installments: false,
            installment_count: 1,
            open_invoice_id: None,
            idempotency_key: None,
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Split the purchase across `count` monthly invoices.
    #[must_use]
    pub fn installments(mut self, count: u32) -> Self {
        self.installments = true;
        self.installment_count = count;
        self
    }

    #[must_use]
    pub fn open_invoice(mut self, invoice_id: Uuid) -> Self {
        self.open_invoice_id = Some(invoice_id);
        self
    }

    #[must_use]
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Create an invoice by hand (a plain, non-card expense bucket).
#[derive(Clone, Debug)]
pub struct NewInvoiceCmd {
    pub owner_id: String,
    pub account: String,
    pub billing_date: NaiveDate,
    pub is_card: bool,
}

impl NewInvoiceCmd {
    #[must_use]
    pub fn new(
        owner_id: impl Into<String>,
        account: impl Into<String>,
        billing_date: NaiveDate,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            account: account.into(),
            billing_date,
            is_card: false,
        }
    }

    #[must_use]
    pub fn card(mut self) -> Self {
        self.is_card = true;
        self
    }
}

/// Add a single item to an existing invoice.
#[derive(Clone, Debug)]
pub struct AddItemCmd {
    pub owner_id: String,
    pub invoice_id: Uuid,
    pub amount: MoneyCents,
    pub description: String,
    pub category: String,
    pub occurred_at: DateTime<Utc>,
}

impl AddItemCmd {
    #[must_use]
    pub fn new(
        owner_id: impl Into<String>,
        invoice_id: Uuid,
        amount: MoneyCents,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            invoice_id,
            amount,
            description: String::new(),
            category: String::new(),
            occurred_at,
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }
}

/// Patch an item in place. `None` fields are left unchanged.
///
/// There is no way to move an item to another invoice.
#[derive(Clone, Debug)]
pub struct UpdateItemCmd {
    pub owner_id: String,
    pub item_id: Uuid,
    pub amount: Option<MoneyCents>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
}

impl UpdateItemCmd {
    #[must_use]
    pub fn new(owner_id: impl Into<String>, item_id: Uuid) -> Self {
        Self {
            owner_id: owner_id.into(),
            item_id,
            amount: None,
            description: None,
            category: None,
            occurred_at: None,
        }
    }

    #[must_use]
    pub fn amount(mut self, amount: MoneyCents) -> Self {
        self.amount = Some(amount);
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }
}

/// Filters for invoice listing. Month bounds are inclusive.
#[derive(Clone, Debug, Default)]
pub struct InvoiceFilter {
    pub account: Option<String>,
    pub from_month: Option<BillingMonth>,
    pub to_month: Option<BillingMonth>,
    pub status: Option<InvoiceStatus>,
}
