//! Invoice aggregates.
//!
//! An `Invoice` is the monthly billing bucket of one account for one owner.
//! Its `total` is derived from the items it owns.

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{BillingMonth, EngineError, MoneyCents, ResultEngine};

/// Settlement state of an invoice.
///
/// `Pending ⇄ Paid` are the only transitions; deletion is outside the state
/// machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    #[default]
    Pending,
    Paid,
}

impl InvoiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
        }
    }

    /// Validate a status change.
    pub fn transition(self, to: InvoiceStatus) -> ResultEngine<InvoiceStatus> {
        match (self, to) {
            (Self::Pending, Self::Paid) | (Self::Paid, Self::Pending) => Ok(to),
            (from, to) => Err(EngineError::Validation(format!(
                "invoice is already {} (requested {})",
                from.as_str(),
                to.as_str()
            ))),
        }
    }
}

impl TryFrom<&str> for InvoiceStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            other => Err(EngineError::Validation(format!(
                "invalid invoice status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub owner_id: String,
    pub account: String,
    pub billing_date: NaiveDate,
    pub month: BillingMonth,
    pub total: MoneyCents,
    pub status: InvoiceStatus,
    /// Created by the card installment allocator rather than by hand.
    pub is_card: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "invoices")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub owner_id: String,
    pub account: String,
    pub account_norm: String,
    pub billing_date: Date,
    pub billing_month: String,
    pub total_minor: i64,
    pub status: String,
    pub is_card: bool,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::invoice_items::Entity")]
    Items,
}

impl Related<super::invoice_items::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Row for a new invoice with a zero total.
pub(crate) fn new_active_model(
    owner_id: &str,
    account: &str,
    account_norm: &str,
    billing_date: NaiveDate,
    is_card: bool,
) -> ActiveModel {
    ActiveModel {
        id: ActiveValue::Set(Uuid::new_v4()),
        owner_id: ActiveValue::Set(owner_id.to_string()),
        account: ActiveValue::Set(account.to_string()),
        account_norm: ActiveValue::Set(account_norm.to_string()),
        billing_date: ActiveValue::Set(billing_date),
        billing_month: ActiveValue::Set(BillingMonth::of(billing_date).key()),
        total_minor: ActiveValue::Set(0),
        status: ActiveValue::Set(InvoiceStatus::Pending.as_str().to_string()),
        is_card: ActiveValue::Set(is_card),
        created_at: ActiveValue::Set(Utc::now()),
    }
}

impl TryFrom<Model> for Invoice {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let month = BillingMonth::of(model.billing_date);
        if month.key() != model.billing_month {
            return Err(EngineError::Consistency(format!(
                "invoice {} is keyed on {} but billed on {}",
                model.id, model.billing_month, model.billing_date
            )));
        }
        Ok(Self {
            id: model.id,
            owner_id: model.owner_id,
            account: model.account,
            billing_date: model.billing_date,
            month,
            total: MoneyCents::new(model.total_minor),
            status: InvoiceStatus::try_from(model.status.as_str())?,
            is_card: model.is_card,
            created_at: model.created_at,
        })
    }
}
