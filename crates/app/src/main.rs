use std::error::Error;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::Parser;
use engine::{
    AddItemCmd, Engine, InvoiceFilter, InvoiceStatus, NewInvoiceCmd, PurchaseCmd, UpdateItemCmd,
};
use migration::{Migrator, MigratorTrait};
use serde::Serialize;

use cli::{Cli, Command, InvoiceCommand, ItemCommand, PurchaseCommand};

mod cli;
mod settings;

type AppResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse();
    let mut settings = settings::Settings::new(&cli.config)?;
    if let Some(url) = cli.database_url.clone() {
        settings.database.url = url;
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(format!(
            "ledgerline={level},engine={level}",
            level = settings.app.level
        ))
        .init();

    let db = connect(&settings.database).await?;
    let engine = Engine::builder()
        .database(db)
        .max_installments(settings.engine.max_installments)
        .remainder_policy(settings.engine.remainder_policy)
        .build()
        .await?;

    run(&engine, &cli).await
}

async fn connect(config: &settings::Database) -> AppResult<sea_orm::DatabaseConnection> {
    let database = sea_orm::Database::connect(config.connection_url()).await?;
    Migrator::up(&database, None).await?;
    tracing::debug!("database ready at {}", config.connection_url());
    Ok(database)
}

/// Purchase dates given on the command line carry no time of day.
fn occurred_at(date: Option<NaiveDate>) -> DateTime<Utc> {
    date.map_or_else(Utc::now, |date| date.and_time(NaiveTime::MIN).and_utc())
}

fn emit<T: Serialize>(json: bool, value: &T, human: impl FnOnce(&T)) -> AppResult<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}

fn print_invoice(invoice: &engine::Invoice) {
    println!(
        "{}  {}  {:<16} {:>12}  {}{}",
        invoice.id,
        invoice.billing_date,
        invoice.account,
        invoice.total.to_string(),
        invoice.status.as_str(),
        if invoice.is_card { "  card" } else { "" }
    );
}

fn print_item(item: &engine::InvoiceItem) {
    println!(
        "{}  {}  {:<24} {:<12} {:>12}",
        item.id,
        item.occurred_at.date_naive(),
        item.description,
        item.category,
        item.amount.to_string()
    );
}

async fn run(engine: &Engine, cli: &Cli) -> AppResult<()> {
    let owner = cli.owner.as_str();
    let json = cli.json;

    match &cli.command {
        Command::Purchase(purchase) => match &purchase.command {
            PurchaseCommand::Add(args) => {
                let mut cmd = PurchaseCmd::new(
                    owner,
                    &args.account,
                    args.amount,
                    occurred_at(args.date),
                )
                .description(&args.description)
                .category(&args.category);
                if let Some(count) = args.installments {
                    cmd = cmd.installments(count);
                }
                if let Some(invoice_id) = args.open_invoice {
                    cmd = cmd.open_invoice(invoice_id);
                }
                if let Some(key) = &args.key {
                    cmd = cmd.idempotency_key(key);
                }
                let ids = engine.allocate(cmd).await?;
                emit(json, &ids, |ids| {
                    for id in ids {
                        println!("{id}");
                    }
                })
            }
            PurchaseCommand::Show { purchase_id } => {
                let items = engine.purchase_items(owner, *purchase_id).await?;
                emit(json, &items, |items| items.iter().for_each(print_item))
            }
            PurchaseCommand::Delete { purchase_id } => {
                let removed = engine.delete_purchase(owner, *purchase_id).await?;
                emit(json, &removed, |removed| {
                    println!("deleted {removed} installment(s)")
                })
            }
        },
        Command::Invoice(invoice) => match &invoice.command {
            InvoiceCommand::Create(args) => {
                let mut cmd = NewInvoiceCmd::new(owner, &args.account, args.billing_date);
                if args.card {
                    cmd = cmd.card();
                }
                let id = engine.create_invoice(cmd).await?;
                emit(json, &id, |id| println!("{id}"))
            }
            InvoiceCommand::List(args) => {
                let filter = InvoiceFilter {
                    account: args.account.clone(),
                    from_month: args.from,
                    to_month: args.to,
                    status: args.status,
                };
                let invoices = engine.list_invoices(owner, &filter).await?;
                emit(json, &invoices, |invoices| {
                    invoices.iter().for_each(print_invoice)
                })
            }
            InvoiceCommand::Show { invoice_id } => {
                let detail = engine.open_invoice(owner, *invoice_id).await?;
                emit(json, &detail, |detail| {
                    print_invoice(&detail.invoice);
                    detail.items.iter().for_each(print_item);
                })
            }
            InvoiceCommand::Pay { invoice_id } => {
                let invoice = engine
                    .set_invoice_status(owner, *invoice_id, InvoiceStatus::Paid)
                    .await?;
                emit(json, &invoice, print_invoice)
            }
            InvoiceCommand::Reopen { invoice_id } => {
                let invoice = engine
                    .set_invoice_status(owner, *invoice_id, InvoiceStatus::Pending)
                    .await?;
                emit(json, &invoice, print_invoice)
            }
            InvoiceCommand::Delete { invoice_id } => {
                let removed = engine.delete_invoice(owner, *invoice_id).await?;
                emit(json, &removed, |removed| {
                    println!("deleted invoice and {removed} item(s)")
                })
            }
        },
        Command::Item(item) => match &item.command {
            ItemCommand::Add(args) => {
                let cmd = AddItemCmd::new(owner, args.invoice, args.amount, occurred_at(args.date))
                    .description(&args.description)
                    .category(&args.category);
                let id = engine.add_item(cmd).await?;
                emit(json, &id, |id| println!("{id}"))
            }
            ItemCommand::Edit(args) => {
                let mut cmd = UpdateItemCmd::new(owner, args.item_id);
                if let Some(amount) = args.amount {
                    cmd = cmd.amount(amount);
                }
                if let Some(description) = &args.description {
                    cmd = cmd.description(description);
                }
                if let Some(category) = &args.category {
                    cmd = cmd.category(category);
                }
                if let Some(date) = args.date {
                    cmd = cmd.occurred_at(occurred_at(Some(date)));
                }
                let updated = engine.update_item(cmd).await?;
                emit(json, &updated, print_item)
            }
            ItemCommand::Delete { item_id } => {
                engine.delete_item(owner, *item_id).await?;
                emit(json, item_id, |id| println!("deleted item {id}"))
            }
        },
        Command::Reconcile => {
            let drifts = engine.reconcile_owner(owner).await?;
            emit(json, &drifts, |drifts| {
                if drifts.is_empty() {
                    println!("all invoice totals match their items");
                }
                for drift in drifts {
                    println!(
                        "{}  {} -> {}",
                        drift.invoice_id, drift.stored, drift.recomputed
                    );
                }
            })
        }
    }
}
