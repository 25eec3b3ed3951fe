//! Group repository
//!
//! Reads run against the pool. Every mutation runs inside a
//! [`GroupTransaction`], which locks the group row first so concurrent
//! operations on the same group serialize on the database.

use crate::domain::{CreateGroupInput, Group, User};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use sqlx::{MySql, MySqlPool, QueryBuilder, Transaction};

const GROUP_COLUMNS: &str = "id, name, is_role_group, created_at, updated_at";
const USER_COLUMNS: &str =
    "u.id, u.username, u.name, u.password, u.is_active, u.phone_number, u.email, u.user_from, u.created_at, u.updated_at";

#[async_trait]
pub trait GroupRepository: Send + Sync {
    async fn list(&self, name: Option<String>, offset: i64, limit: i64) -> Result<Vec<Group>>;
    async fn count(&self, name: Option<String>) -> Result<i64>;
    async fn find_by_id(&self, id: u64) -> Result<Option<Group>>;
    async fn create(&self, input: &CreateGroupInput) -> Result<Group>;

    /// Open a relational transaction.
    ///
    /// Dropping the returned handle without committing rolls it back.
    async fn begin(&self) -> Result<Box<dyn GroupTransaction>>;
}

#[async_trait]
pub trait GroupTransaction: Send {
    /// Load a group and hold its row lock until commit or rollback.
    async fn lock_group(&mut self, id: u64) -> Result<Option<Group>>;
    /// Delete the group row together with its membership rows.
    async fn delete_group(&mut self, id: u64) -> Result<()>;
    async fn rename_group(&mut self, id: u64, name: &str) -> Result<Group>;
    /// Resolve user ids to rows; ids without a row are simply absent.
    async fn find_users(&mut self, ids: &[u64]) -> Result<Vec<User>>;
    async fn replace_members(&mut self, group_id: u64, user_ids: &[u64]) -> Result<()>;
    async fn find_members(&mut self, group_id: u64) -> Result<Vec<User>>;
    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}

pub struct GroupRepositoryImpl {
    pool: MySqlPool,
}

impl GroupRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    fn push_name_filter(sql: &mut String, name: &Option<String>) {
        if name.as_deref().is_some_and(|n| !n.is_empty()) {
            sql.push_str(" WHERE name LIKE CONCAT('%', ?, '%')");
        }
    }
}

#[async_trait]
impl GroupRepository for GroupRepositoryImpl {
    async fn list(&self, name: Option<String>, offset: i64, limit: i64) -> Result<Vec<Group>> {
        let mut sql = format!("SELECT {} FROM auth_group", GROUP_COLUMNS);
        Self::push_name_filter(&mut sql, &name);
        sql.push_str(" ORDER BY id ASC LIMIT ? OFFSET ?");

        let mut query = sqlx::query_as::<_, Group>(&sql);
        if let Some(name) = name.as_deref().filter(|n| !n.is_empty()) {
            query = query.bind(name);
        }

        let groups = query.bind(limit).bind(offset).fetch_all(&self.pool).await?;
        Ok(groups)
    }

    async fn count(&self, name: Option<String>) -> Result<i64> {
        let mut sql = String::from("SELECT COUNT(*) FROM auth_group");
        Self::push_name_filter(&mut sql, &name);

        let mut query = sqlx::query_as::<_, (i64,)>(&sql);
        if let Some(name) = name.as_deref().filter(|n| !n.is_empty()) {
            query = query.bind(name);
        }

        let row = query.fetch_one(&self.pool).await?;
        Ok(row.0)
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<Group>> {
        let group = sqlx::query_as::<_, Group>(&format!(
            "SELECT {} FROM auth_group WHERE id = ?",
            GROUP_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(group)
    }

    async fn create(&self, input: &CreateGroupInput) -> Result<Group> {
        let result = sqlx::query(
            r#"
            INSERT INTO auth_group (name, is_role_group, created_at, updated_at)
            VALUES (?, ?, NOW(), NOW())
            "#,
        )
        .bind(&input.name)
        .bind(input.is_role_group)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_write(e, format!("Group '{}' already exists", input.name)))?;

        self.find_by_id(result.last_insert_id())
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to create group")))
    }

    async fn begin(&self) -> Result<Box<dyn GroupTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(MySqlGroupTransaction { tx }))
    }
}

/// Open MySQL transaction; sqlx rolls it back on drop.
pub struct MySqlGroupTransaction {
    tx: Transaction<'static, MySql>,
}

#[async_trait]
impl GroupTransaction for MySqlGroupTransaction {
    async fn lock_group(&mut self, id: u64) -> Result<Option<Group>> {
        let group = sqlx::query_as::<_, Group>(&format!(
            "SELECT {} FROM auth_group WHERE id = ? FOR UPDATE",
            GROUP_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(group)
    }

    async fn delete_group(&mut self, id: u64) -> Result<()> {
        sqlx::query("DELETE FROM auth_group_users WHERE group_id = ?")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        let result = sqlx::query("DELETE FROM auth_group WHERE id = ?")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Group {} not found", id)));
        }

        Ok(())
    }

    async fn rename_group(&mut self, id: u64, name: &str) -> Result<Group> {
        sqlx::query("UPDATE auth_group SET name = ?, updated_at = NOW() WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| AppError::from_write(e, format!("Group '{}' already exists", name)))?;

        self.lock_group(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Group {} not found", id)))
    }

    async fn find_users(&mut self, ids: &[u64]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let mut builder: QueryBuilder<MySql> =
            QueryBuilder::new(format!("SELECT {} FROM auth_user u WHERE u.id IN (", USER_COLUMNS));
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY u.id ASC");

        let users = builder
            .build_query_as::<User>()
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(users)
    }

    async fn replace_members(&mut self, group_id: u64, user_ids: &[u64]) -> Result<()> {
        sqlx::query("DELETE FROM auth_group_users WHERE group_id = ?")
            .bind(group_id)
            .execute(&mut *self.tx)
            .await?;

        if user_ids.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<MySql> =
            QueryBuilder::new("INSERT INTO auth_group_users (group_id, user_id) ");
        builder.push_values(user_ids, |mut row, user_id| {
            row.push_bind(group_id).push_bind(*user_id);
        });
        builder.build().execute(&mut *self.tx).await?;

        Ok(())
    }

    async fn find_members(&mut self, group_id: u64) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM auth_user u \
             INNER JOIN auth_group_users gu ON gu.user_id = u.id \
             WHERE gu.group_id = ? ORDER BY u.id ASC",
            USER_COLUMNS
        ))
        .bind(group_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(users)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
