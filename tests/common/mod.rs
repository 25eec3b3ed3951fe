//! Common test utilities
//!
//! Database-backed tests connect to `DATABASE_URL` and skip when it is unset
//! or unreachable.

use ops_iam_core::domain::User;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;
use std::sync::Once;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

/// Ensure .env file is loaded once
static ENV_INIT: Once = Once::new();

/// Tests share one schema, so they run one at a time
static DB_LOCK: Mutex<()> = Mutex::const_new(());

fn init_env() {
    ENV_INIT.call_once(|| {
        let _ = dotenvy::dotenv();
    });
}

/// Exclusive handle on the test database
pub struct TestDb {
    pub pool: MySqlPool,
    _guard: MutexGuard<'static, ()>,
}

/// Connect, migrate and truncate, or `None` when no database is configured.
pub async fn test_db() -> Option<TestDb> {
    init_env();
    let guard = DB_LOCK.lock().await;

    let url = match std::env::var("DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => url,
        _ => {
            eprintln!("Skipping test: DATABASE_URL is not set");
            return None;
        }
    };

    let pool = match MySqlPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Skipping test: could not connect to database: {}", e);
            return None;
        }
    };

    setup_database(&pool).await.expect("Failed to migrate test database");
    cleanup_database(&pool).await.expect("Failed to clean test database");

    Some(TestDb {
        pool,
        _guard: guard,
    })
}

pub async fn setup_database(pool: &MySqlPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn cleanup_database(pool: &MySqlPool) -> anyhow::Result<()> {
    for table in ["auth_group_users", "auth_group", "auth_user", "casbin_rule"] {
        sqlx::query(&format!("DELETE FROM {}", table))
            .execute(pool)
            .await?;
    }
    Ok(())
}

/// Insert a locally managed user and return its id
#[allow(dead_code)]
pub async fn insert_local_user(pool: &MySqlPool, username: &str) -> u64 {
    sqlx::query(
        "INSERT INTO auth_user (username, name, password, is_active, phone_number, email, user_from) \
         VALUES (?, ?, 'hashed', TRUE, '', '', 'LOCAL')",
    )
    .bind(username)
    .bind(username)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_id()
}

/// Rows of the policy table as `ptype, v0, v1, v2` strings, sorted
#[allow(dead_code)]
pub async fn policy_rows(pool: &MySqlPool) -> Vec<String> {
    let rows: Vec<(String, String, String, String)> =
        sqlx::query_as("SELECT ptype, v0, v1, v2 FROM casbin_rule")
            .fetch_all(pool)
            .await
            .unwrap();
    let mut rows: Vec<String> = rows
        .into_iter()
        .map(|(p, v0, v1, v2)| {
            if v2.is_empty() {
                format!("{}, {}, {}", p, v0, v1)
            } else {
                format!("{}, {}, {}, {}", p, v0, v1, v2)
            }
        })
        .collect();
    rows.sort();
    rows
}

/// Load a user row by username, panicking when it is missing
#[allow(dead_code)]
pub async fn fetch_user(pool: &MySqlPool, username: &str) -> User {
    sqlx::query_as::<_, User>(
        "SELECT id, username, name, password, is_active, phone_number, email, user_from, created_at, updated_at \
         FROM auth_user WHERE username = ?",
    )
    .bind(username)
    .fetch_one(pool)
    .await
    .unwrap()
}
