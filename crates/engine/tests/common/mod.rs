#![allow(dead_code)]

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use sea_orm::{Database, DatabaseConnection};
use uuid::Uuid;

use engine::{Engine, RemainderPolicy};
use migration::MigratorTrait;

pub const OWNER: &str = "alice";
pub const CARD: &str = "Nubank";

pub async fn database() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    db
}

/// A throwaway SQLite file that several connections can share.
pub struct SharedFile {
    path: PathBuf,
}

impl SharedFile {
    pub async fn new() -> Self {
        let path = std::env::temp_dir().join(format!("ledgerline-{}.db", Uuid::new_v4()));
        let file = Self { path };
        let db = file.connect().await;
        migration::Migrator::up(&db, None).await.unwrap();
        db.close().await.unwrap();
        file
    }

    pub fn url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.path.display())
    }

    pub async fn connect(&self) -> DatabaseConnection {
        Database::connect(self.url()).await.unwrap()
    }

    /// An independent engine with its own connection pool.
    pub async fn engine(&self) -> Engine {
        Engine::builder()
            .database(self.connect().await)
            .build()
            .await
            .unwrap()
    }
}

impl Drop for SharedFile {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm", "-journal"] {
            let mut path = self.path.clone().into_os_string();
            path.push(suffix);
            let _ = std::fs::remove_file(path);
        }
    }
}

pub async fn engine_with_db() -> (Engine, DatabaseConnection) {
    let db = database().await;
    let engine = Engine::builder()
        .database(db.clone())
        .build()
        .await
        .unwrap();
    (engine, db)
}

pub async fn engine_with_policy(policy: RemainderPolicy) -> Engine {
    let db = database().await;
    Engine::builder()
        .database(db)
        .remainder_policy(policy)
        .build()
        .await
        .unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 30, 0).unwrap()
}
