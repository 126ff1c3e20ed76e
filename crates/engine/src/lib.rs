//! Credit-card installment allocation and invoice reconciliation.
//!
//! A purchase declared as "N installments" is split into N exact-cent
//! amounts ([`split_amount`]), each attached to the monthly [`Invoice`] of
//! the period it falls in ([`Engine::resolve_invoice`]). Every invoice keeps
//! its total equal to the sum of the [`InvoiceItem`]s it owns
//! ([`Engine::recompute_invoice`]).
//!
//! Owner ids are always passed in by the caller; the engine never
//! authenticates.

pub use commands::{AddItemCmd, InvoiceFilter, NewInvoiceCmd, PurchaseCmd, UpdateItemCmd};
pub use error::EngineError;
pub use invoice_items::InvoiceItem;
pub use invoices::{Invoice, InvoiceStatus};
pub use money::MoneyCents;
pub use ops::{DEFAULT_MAX_INSTALLMENTS, Drift, Engine, EngineBuilder, InvoiceDetail};
pub use period::{BillingMonth, PeriodTarget, shift_months};
pub use split::{RemainderPolicy, split_amount};

mod commands;
mod error;
mod invoice_items;
mod invoices;
mod money;
mod ops;
mod period;
mod split;
mod util;

pub type ResultEngine<T> = Result<T, EngineError>;
