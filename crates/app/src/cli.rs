use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use engine::{BillingMonth, InvoiceStatus, MoneyCents};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "ledgerline")]
#[command(about = "Card invoices and installment purchases")]
pub struct Cli {
    /// Settings file, extension optional.
    #[arg(long, default_value = "settings")]
    pub config: String,

    /// Overrides `database.url` (also read from `DATABASE_URL`).
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Owner of every invoice and item touched by the command.
    #[arg(long, env = "LEDGERLINE_OWNER")]
    pub owner: String,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Purchase(Purchase),
    Invoice(Invoice),
    Item(Item),
    /// Recompute every invoice total of the owner and report drift.
    Reconcile,
}

#[derive(Args, Debug)]
pub struct Purchase {
    #[command(subcommand)]
    pub command: PurchaseCommand,
}

#[derive(Subcommand, Debug)]
pub enum PurchaseCommand {
    /// Record a purchase, optionally split in monthly installments.
    Add(PurchaseAddArgs),
    /// Show the installments of a purchase.
    Show { purchase_id: Uuid },
    /// Delete every installment of a purchase.
    Delete { purchase_id: Uuid },
}

#[derive(Args, Debug)]
pub struct PurchaseAddArgs {
    #[arg(long)]
    pub account: String,
    #[arg(long, value_parser = parse_money)]
    pub amount: MoneyCents,
    #[arg(long)]
    pub description: String,
    #[arg(long)]
    pub category: String,
    /// Purchase date; defaults to now.
    #[arg(long)]
    pub date: Option<NaiveDate>,
    /// Number of monthly installments.
    #[arg(long)]
    pub installments: Option<u32>,
    /// Invoice already open for this purchase; receives the first installment.
    #[arg(long)]
    pub open_invoice: Option<Uuid>,
    /// Retry-safe key: a second call with the same key writes nothing.
    #[arg(long)]
    pub key: Option<String>,
}

#[derive(Args, Debug)]
pub struct Invoice {
    #[command(subcommand)]
    pub command: InvoiceCommand,
}

#[derive(Subcommand, Debug)]
pub enum InvoiceCommand {
    Create(InvoiceCreateArgs),
    List(InvoiceListArgs),
    /// Show an invoice with its items (total recomputed).
    Show { invoice_id: Uuid },
    Pay { invoice_id: Uuid },
    Reopen { invoice_id: Uuid },
    /// Delete an invoice and its items.
    Delete { invoice_id: Uuid },
}

#[derive(Args, Debug)]
pub struct InvoiceCreateArgs {
    #[arg(long)]
    pub account: String,
    #[arg(long)]
    pub billing_date: NaiveDate,
    /// Mark the invoice as a card invoice.
    #[arg(long)]
    pub card: bool,
}

#[derive(Args, Debug)]
pub struct InvoiceListArgs {
    #[arg(long)]
    pub account: Option<String>,
    /// First month included (YYYY-MM).
    #[arg(long, value_parser = parse_month)]
    pub from: Option<BillingMonth>,
    /// Last month included (YYYY-MM).
    #[arg(long, value_parser = parse_month)]
    pub to: Option<BillingMonth>,
    #[arg(long, value_parser = parse_status)]
    pub status: Option<InvoiceStatus>,
}

#[derive(Args, Debug)]
pub struct Item {
    #[command(subcommand)]
    pub command: ItemCommand,
}

#[derive(Subcommand, Debug)]
pub enum ItemCommand {
    Add(ItemAddArgs),
    Edit(ItemEditArgs),
    Delete { item_id: Uuid },
}

#[derive(Args, Debug)]
pub struct ItemAddArgs {
    #[arg(long)]
    pub invoice: Uuid,
    #[arg(long, value_parser = parse_money)]
    pub amount: MoneyCents,
    #[arg(long)]
    pub description: String,
    #[arg(long)]
    pub category: String,
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub struct ItemEditArgs {
    pub item_id: Uuid,
    #[arg(long, value_parser = parse_money)]
    pub amount: Option<MoneyCents>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub category: Option<String>,
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

fn parse_money(raw: &str) -> Result<MoneyCents, String> {
    raw.parse::<MoneyCents>().map_err(|err| err.to_string())
}

fn parse_month(raw: &str) -> Result<BillingMonth, String> {
    raw.parse::<BillingMonth>().map_err(|err| err.to_string())
}

fn parse_status(raw: &str) -> Result<InvoiceStatus, String> {
    InvoiceStatus::try_from(raw).map_err(|err| err.to_string())
}
