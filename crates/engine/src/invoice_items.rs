//! Itemized transactions.
//!
//! Every item is owned by exactly one invoice; the owning invoice is fixed
//! when the item is created.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, MoneyCents};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub created_by: String,
    pub description: String,
    pub category: String,
    pub amount: MoneyCents,
    pub occurred_at: DateTime<Utc>,
    /// Shared by every installment of the same allocated purchase.
    pub purchase_id: Option<Uuid>,
    /// 1-based position in the purchase.
    pub installment_number: u32,
    pub installment_count: u32,
    pub idempotency_key: Option<String>,
}

impl InvoiceItem {
    pub fn new(
        invoice_id: Uuid,
        created_by: String,
        description: String,
        category: String,
        amount: MoneyCents,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            invoice_id,
            created_by,
            description,
            category,
            amount,
            occurred_at,
            purchase_id: None,
            installment_number: 1,
            installment_count: 1,
            idempotency_key: None,
        }
    }

    pub fn is_installment(&self) -> bool {
        self.installment_count > 1
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "invoice_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub created_by: String,
    pub description: String,
    pub category: String,
    pub amount_minor: i64,
    pub occurred_at: DateTimeUtc,
    pub purchase_id: Option<Uuid>,
    pub installment_number: i32,
    pub installment_count: i32,
    pub idempotency_key: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::invoices::Entity",
        from = "Column::InvoiceId",
        to = "super::invoices::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Invoice,
}

impl Related<super::invoices::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Invoice.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&InvoiceItem> for ActiveModel {
    fn from(item: &InvoiceItem) -> Self {
        Self {
            id: ActiveValue::Set(item.id),
            invoice_id: ActiveValue::Set(item.invoice_id),
            created_by: ActiveValue::Set(item.created_by.clone()),
            description: ActiveValue::Set(item.description.clone()),
            category: ActiveValue::Set(item.category.clone()),
            amount_minor: ActiveValue::Set(item.amount.cents()),
            occurred_at: ActiveValue::Set(item.occurred_at),
            purchase_id: ActiveValue::Set(item.purchase_id),
            installment_number: ActiveValue::Set(item.installment_number as i32),
            installment_count: ActiveValue::Set(item.installment_count as i32),
            idempotency_key: ActiveValue::Set(item.idempotency_key.clone()),
        }
    }
}

impl TryFrom<Model> for InvoiceItem {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let position = |value: i32, label: &str| {
            u32::try_from(value).map_err(|_| {
                EngineError::Consistency(format!("item {} has invalid {label}: {value}", model.id))
            })
        };
        let installment_number = position(model.installment_number, "installment number")?;
        let installment_count = position(model.installment_count, "installment count")?;
        Ok(Self {
            id: model.id,
            invoice_id: model.invoice_id,
            created_by: model.created_by,
            description: model.description,
            category: model.category,
            amount: MoneyCents::new(model.amount_minor),
            occurred_at: model.occurred_at,
            purchase_id: model.purchase_id,
            installment_number,
            installment_count,
            idempotency_key: model.idempotency_key,
        })
    }
}
