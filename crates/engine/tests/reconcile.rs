mod common;

use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};

use common::{CARD, OWNER, at, date, engine_with_db};
use engine::{
    AddItemCmd, Engine, EngineError, InvoiceFilter, InvoiceStatus, MoneyCents, NewInvoiceCmd,
    PurchaseCmd, UpdateItemCmd,
};
use uuid::Uuid;

async fn invoice_with_items(engine: &Engine, amounts: &[i64]) -> (Uuid, Vec<Uuid>) {
    let invoice_id = engine
        .create_invoice(NewInvoiceCmd::new(OWNER, CARD, date(2025, 4, 1)))
        .await
        .unwrap();
    let mut items = Vec::new();
    for (n, amount) in amounts.iter().enumerate() {
        let id = engine
            .add_item(
                AddItemCmd::new(OWNER, invoice_id, MoneyCents::new(*amount), at(2025, 4, n as u32 + 1))
                    .description(format!("item {n}"))
                    .category("misc"),
            )
            .await
            .unwrap();
        items.push(id);
    }
    (invoice_id, items)
}

async fn corrupt_totals(db: &DatabaseConnection, total_minor: i64) {
    let backend = db.get_database_backend();
    db.execute(Statement::from_sql_and_values(
        backend,
        "UPDATE invoices SET total_minor = ? WHERE owner_id = ?",
        vec![total_minor.into(), OWNER.into()],
    ))
    .await
    .unwrap();
}

#[tokio::test]
async fn deleting_an_item_recomputes_the_total() {
    let (engine, _db) = engine_with_db().await;
    let (invoice_id, items) = invoice_with_items(&engine, &[50_00, 50_00, 20_00]).await;
    assert_eq!(
        engine.invoice(OWNER, invoice_id).await.unwrap().total,
        MoneyCents::new(120_00)
    );

    engine.delete_item(OWNER, items[2]).await.unwrap();

    assert_eq!(
        engine.invoice(OWNER, invoice_id).await.unwrap().total,
        MoneyCents::new(100_00)
    );
    assert_eq!(
        engine.recompute_invoice(OWNER, invoice_id).await.unwrap(),
        MoneyCents::new(100_00)
    );
    assert_eq!(
        engine.item(OWNER, items[2]).await.unwrap_err(),
        EngineError::KeyNotFound("invoice item not exists".to_string())
    );
}

#[tokio::test]
async fn editing_an_item_recomputes_the_total() {
    let (engine, _db) = engine_with_db().await;
    let (invoice_id, items) = invoice_with_items(&engine, &[10_00, 5_00]).await;

    let updated = engine
        .update_item(
            UpdateItemCmd::new(OWNER, items[0])
                .amount(MoneyCents::new(12_50))
                .description("  Groceries  ")
                .category("food"),
        )
        .await
        .unwrap();
    assert_eq!(updated.amount, MoneyCents::new(12_50));
    assert_eq!(updated.description, "Groceries");
    assert_eq!(updated.invoice_id, invoice_id);

    assert_eq!(
        engine.invoice(OWNER, invoice_id).await.unwrap().total,
        MoneyCents::new(17_50)
    );
}

#[tokio::test]
async fn invalid_edits_are_rejected() {
    let (engine, _db) = engine_with_db().await;
    let (invoice_id, items) = invoice_with_items(&engine, &[10_00]).await;

    let err = engine
        .update_item(UpdateItemCmd::new(OWNER, items[0]))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::Validation("nothing to update".to_string()));

    let err = engine
        .update_item(UpdateItemCmd::new(OWNER, items[0]).amount(MoneyCents::ZERO))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::Validation("amount must be > 0".to_string()));

    let err = engine
        .update_item(UpdateItemCmd::new("bob", items[0]).amount(MoneyCents::new(1)))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::KeyNotFound("invoice item not exists".to_string()));

    assert_eq!(
        engine.invoice(OWNER, invoice_id).await.unwrap().total,
        MoneyCents::new(10_00)
    );
}

#[tokio::test]
async fn opening_an_invoice_heals_drift() {
    let (engine, db) = engine_with_db().await;
    let (invoice_id, _items) = invoice_with_items(&engine, &[50_00, 50_00, 20_00]).await;

    corrupt_totals(&db, 999_99).await;
    assert_eq!(
        engine.invoice(OWNER, invoice_id).await.unwrap().total,
        MoneyCents::new(999_99)
    );

    let detail = engine.open_invoice(OWNER, invoice_id).await.unwrap();
    assert_eq!(detail.invoice.total, MoneyCents::new(120_00));
    assert_eq!(detail.items.len(), 3);
    assert_eq!(
        detail.items.iter().map(|i| i.amount).sum::<MoneyCents>(),
        detail.invoice.total
    );

    // Idempotent once healed.
    let again = engine.open_invoice(OWNER, invoice_id).await.unwrap();
    assert_eq!(again.invoice.total, MoneyCents::new(120_00));
}

#[tokio::test]
async fn reconcile_owner_reports_and_fixes_every_drifted_invoice() {
    let (engine, db) = engine_with_db().await;
    engine
        .allocate(
            PurchaseCmd::new(OWNER, CARD, MoneyCents::new(90_00), at(2025, 1, 15))
                .description("Phone")
                .category("electronics")
                .installments(3),
        )
        .await
        .unwrap();

    assert!(engine.reconcile_owner(OWNER).await.unwrap().is_empty());

    corrupt_totals(&db, 1).await;
    let drifts = engine.reconcile_owner(OWNER).await.unwrap();
    assert_eq!(drifts.len(), 3);
    assert!(drifts.iter().all(|d| d.stored == MoneyCents::new(1)));
    assert!(drifts.iter().all(|d| d.recomputed == MoneyCents::new(30_00)));

    let totals: Vec<i64> = engine
        .list_invoices(OWNER, &InvoiceFilter::default())
        .await
        .unwrap()
        .iter()
        .map(|i| i.total.cents())
        .collect();
    assert_eq!(totals, vec![30_00, 30_00, 30_00]);
}

#[tokio::test]
async fn recompute_refuses_incoherent_items() {
    let (engine, db) = engine_with_db().await;
    let (invoice_id, _items) = invoice_with_items(&engine, &[10_00]).await;

    db.execute_unprepared("UPDATE invoice_items SET amount_minor = -5")
        .await
        .unwrap();
    let err = engine.recompute_invoice(OWNER, invoice_id).await.unwrap_err();
    assert!(matches!(err, EngineError::Consistency(_)), "{err:?}");
}

#[tokio::test]
async fn status_toggles_between_pending_and_paid() {
    let (engine, _db) = engine_with_db().await;
    let (invoice_id, _items) = invoice_with_items(&engine, &[10_00]).await;

    let paid = engine
        .set_invoice_status(OWNER, invoice_id, InvoiceStatus::Paid)
        .await
        .unwrap();
    assert_eq!(paid.status, InvoiceStatus::Paid);

    let err = engine
        .set_invoice_status(OWNER, invoice_id, InvoiceStatus::Paid)
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let filter = InvoiceFilter {
        status: Some(InvoiceStatus::Paid),
        ..InvoiceFilter::default()
    };
    assert_eq!(engine.list_invoices(OWNER, &filter).await.unwrap().len(), 1);

    let pending = engine
        .set_invoice_status(OWNER, invoice_id, InvoiceStatus::Pending)
        .await
        .unwrap();
    assert_eq!(pending.status, InvoiceStatus::Pending);
    assert_eq!(pending.total, MoneyCents::new(10_00));
}

#[tokio::test]
async fn deleting_an_invoice_removes_its_items() {
    let (engine, _db) = engine_with_db().await;
    let (invoice_id, items) = invoice_with_items(&engine, &[10_00, 20_00]).await;
    engine
        .set_invoice_status(OWNER, invoice_id, InvoiceStatus::Paid)
        .await
        .unwrap();

    assert_eq!(
        engine.delete_invoice("bob", invoice_id).await.unwrap_err(),
        EngineError::KeyNotFound("invoice not exists".to_string())
    );
    assert_eq!(engine.delete_invoice(OWNER, invoice_id).await.unwrap(), 2);

    assert_eq!(
        engine.invoice(OWNER, invoice_id).await.unwrap_err(),
        EngineError::KeyNotFound("invoice not exists".to_string())
    );
    for id in items {
        assert!(engine.item(OWNER, id).await.is_err());
    }
}

#[tokio::test]
async fn deleting_a_purchase_removes_every_installment() {
    let (engine, _db) = engine_with_db().await;
    let february = engine
        .create_invoice(NewInvoiceCmd::new(OWNER, CARD, date(2025, 2, 1)).card())
        .await
        .unwrap();
    engine
        .add_item(
            AddItemCmd::new(OWNER, february, MoneyCents::new(7_00), at(2025, 2, 1))
                .description("Lunch")
                .category("food"),
        )
        .await
        .unwrap();

    let ids = engine
        .allocate(
            PurchaseCmd::new(OWNER, CARD, MoneyCents::new(60_00), at(2025, 1, 15))
                .description("Headphones")
                .category("electronics")
                .installments(2),
        )
        .await
        .unwrap();
    let purchase_id = engine.item(OWNER, ids[0]).await.unwrap().purchase_id.unwrap();

    assert_eq!(engine.delete_purchase(OWNER, purchase_id).await.unwrap(), 2);
    assert_eq!(
        engine.invoice(OWNER, february).await.unwrap().total,
        MoneyCents::new(7_00)
    );
    assert_eq!(
        engine.delete_purchase(OWNER, purchase_id).await.unwrap_err(),
        EngineError::KeyNotFound("purchase not exists".to_string())
    );
}

#[tokio::test]
async fn items_are_listed_per_invoice() {
    let (engine, _db) = engine_with_db().await;
    let (invoice_id, items) = invoice_with_items(&engine, &[1_00, 2_00, 3_00]).await;

    let listed: Vec<Uuid> = engine
        .items_for_invoice(OWNER, invoice_id)
        .await
        .unwrap()
        .iter()
        .map(|i| i.id)
        .collect();
    assert_eq!(listed, items);
    assert!(engine.items_for_invoice("bob", invoice_id).await.is_err());
}
