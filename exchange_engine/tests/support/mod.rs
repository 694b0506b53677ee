//! Shared setup for integration tests: a fresh migrated database per test, seed data matching a
//! small working desk, and a notifier that records everything it is asked to send.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use exchange_engine::{
    db_types::{Actor, ChatId, NewBankAccount, NewRateTable, RateLimits, Role},
    helpers::MessageRef,
    notify::Notifier,
    ExchangerDatabase,
    SqliteDatabase,
};
use log::*;
use sqlx::{migrate, migrate::MigrateDatabase, Sqlite};
use xge_common::Rub;

pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🚀️ Logging initialised");
    create_database(url).await;
    run_migrations(url).await;
}

pub fn random_db_path() -> String {
    format!("sqlite://{}/xge_test_{}.db", std::env::temp_dir().display(), rand::random::<u64>())
}

pub async fn run_migrations(url: &str) {
    let db = SqliteDatabase::new(url, 5).await.expect("Error creating connection to database");
    migrate!("./migrations").run(db.pool()).await.expect("Error running DB migrations");
    info!("🚀️ Migrations complete");
}

pub async fn create_database(url: &str) {
    if let Err(e) = Sqlite::drop_database(url).await {
        warn!("Error dropping database {url}: {e:?}");
    }
    Sqlite::create_database(url).await.expect("Error creating database");
    info!("Created Sqlite database {url}");
}

/// Fresh migrated database at a random temp path.
pub async fn new_test_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new(&url, 5).await.expect("Error creating database")
}

/// Seeds the rate card, tier limits and two payout accounts (one actual, one special).
///
/// Base rate 15,000 with a tier-1 boundary of 67 RUB * 15,000 = 1,005,000 IDR, so a 700,000 IDR
/// order prices at the base rate to 47 RUB.
pub async fn seed_desk(db: &SqliteDatabase) {
    db.insert_rate_table(NewRateTable {
        main_rate: 15_000.0,
        rate1: 14_800.0,
        rate2: 14_600.0,
        rate3: 14_400.0,
        rate4: 14_200.0,
        rate_back: 14_500.0,
        special_threshold: Rub::from(500),
    })
    .await
    .expect("Error seeding rates");
    db.set_rate_limits(RateLimits {
        tier1: Rub::from(67),
        tier2: Rub::from(150),
        tier3: Rub::from(400),
        tier4: Rub::from(800),
    })
    .await
    .expect("Error seeding limits");
    let main = db
        .insert_account(NewBankAccount {
            bank: "MainBank".into(),
            card_number: "2200 1111 2222 3333".into(),
            recipient_name: "Main R.".into(),
            sbp_phone: "+7 900 111 11 11".into(),
            created_by: 404,
        })
        .await
        .expect("Error seeding main account");
    let special = db
        .insert_account(NewBankAccount {
            bank: "BigBank".into(),
            card_number: "2200 4444 5555 6666".into(),
            recipient_name: "Big R.".into(),
            sbp_phone: "+7 900 222 22 22".into(),
            created_by: 404,
        })
        .await
        .expect("Error seeding special account");
    assert!(db.set_actual_account(main).await.expect("Error setting actual account"));
    assert!(db.set_special_account(special).await.expect("Error setting special account"));
}

pub fn client() -> Actor {
    Actor::new(101, "@client", Role::User)
}

pub fn operator() -> Actor {
    Actor::new(202, "@operator", Role::Operator)
}

pub fn admin() -> Actor {
    Actor::new(303, "@admin", Role::Admin)
}

pub fn superadmin() -> Actor {
    Actor::new(404, "@root", Role::SuperAdmin)
}

pub const TEST_CHAT: ChatId = ChatId(-1001234567890);

pub fn origin(message_id: i64) -> MessageRef {
    MessageRef::new(TEST_CHAT, message_id)
}

/// Records every message it is asked to deliver, for assertions.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.contains(needle))
    }

    fn record(&self, prefix: &str, message: &str) {
        self.messages.lock().unwrap().push(format!("{prefix}: {message}"));
    }
}

impl Notifier for RecordingNotifier {
    async fn broadcast_to_groups(&self, message: &str) {
        self.record("groups", message);
    }

    async fn notify_admins(&self, message: &str) {
        self.record("admins", message);
    }

    async fn notify_role(&self, role: Role, message: &str) {
        self.record(&format!("role {role}"), message);
    }
}
