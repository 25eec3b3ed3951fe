//! User repository

use crate::domain::{DirectoryUser, UpsertSummary, User, UserOrigin};
use crate::error::Result;
use async_trait::async_trait;
use sqlx::{MySql, MySqlPool, QueryBuilder};
use std::collections::{HashMap, HashSet};

/// Rows per multi-row statement
const BATCH_SIZE: usize = 500;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert or update directory users keyed by username, in one transaction.
    ///
    /// Rows that already carry the incoming state are not written. Users
    /// absent from `users` are left untouched.
    async fn upsert_directory_users(&self, users: &[DirectoryUser]) -> Result<UpsertSummary>;
}

pub struct UserRepositoryImpl {
    pool: MySqlPool,
}

impl UserRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

/// Write plan for one upsert pass
#[derive(Debug, Default)]
pub(crate) struct UpsertPlan<'a> {
    pub inserts: Vec<&'a DirectoryUser>,
    pub updates: Vec<&'a DirectoryUser>,
    pub unchanged: usize,
}

impl UpsertPlan<'_> {
    pub fn summary(&self) -> UpsertSummary {
        UpsertSummary {
            inserted: self.inserts.len(),
            updated: self.updates.len(),
            unchanged: self.unchanged,
        }
    }
}

/// Diff incoming directory users against stored rows.
///
/// Duplicate usernames keep their first occurrence.
pub(crate) fn plan_upsert<'a>(
    existing: &HashMap<String, User>,
    incoming: &'a [DirectoryUser],
) -> UpsertPlan<'a> {
    let mut plan = UpsertPlan::default();
    let mut seen = HashSet::new();

    for user in incoming {
        if !seen.insert(user.username.as_str()) {
            continue;
        }
        match existing.get(&user.username) {
            None => plan.inserts.push(user),
            Some(row) if user.matches(row) => plan.unchanged += 1,
            Some(_) => plan.updates.push(user),
        }
    }

    plan
}

#[async_trait]
impl UserRepository for UserRepositoryImpl {
    async fn upsert_directory_users(&self, users: &[DirectoryUser]) -> Result<UpsertSummary> {
        if users.is_empty() {
            return Ok(UpsertSummary::default());
        }

        let mut tx = self.pool.begin().await?;

        let mut existing = HashMap::with_capacity(users.len());
        for chunk in users.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<MySql> = QueryBuilder::new(
                "SELECT id, username, name, password, is_active, phone_number, email, user_from, created_at, updated_at \
                 FROM auth_user WHERE username IN (",
            );
            let mut separated = builder.separated(", ");
            for user in chunk {
                separated.push_bind(&user.username);
            }
            separated.push_unseparated(") FOR UPDATE");

            let rows = builder.build_query_as::<User>().fetch_all(&mut *tx).await?;
            for row in rows {
                existing.insert(row.username.clone(), row);
            }
        }

        let plan = plan_upsert(&existing, users);

        for chunk in plan.inserts.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<MySql> = QueryBuilder::new(
                "INSERT INTO auth_user \
                 (username, name, password, is_active, phone_number, email, user_from, created_at, updated_at) ",
            );
            builder.push_values(chunk, |mut row, user| {
                row.push_bind(&user.username)
                    .push_bind(&user.name)
                    .push_bind("")
                    .push_bind(user.is_active)
                    .push_bind(&user.phone_number)
                    .push_bind(&user.email)
                    .push_bind(UserOrigin::Ldap)
                    .push("NOW()")
                    .push("NOW()");
            });
            builder.build().execute(&mut *tx).await?;
        }

        for user in &plan.updates {
            sqlx::query(
                r#"
                UPDATE auth_user
                SET name = ?, password = '', is_active = ?, phone_number = ?, email = ?,
                    user_from = ?, updated_at = NOW()
                WHERE username = ?
                "#,
            )
            .bind(&user.name)
            .bind(user.is_active)
            .bind(&user.phone_number)
            .bind(&user.email)
            .bind(UserOrigin::Ldap)
            .bind(&user.username)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(plan.summary())
    }
}
