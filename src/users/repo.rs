use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::model::{CreatedUser, NewUser, ProfilePatch, User};
use crate::error::ServiceError;

/// Credential store. Lookups only ever see live rows; mutations report whether
/// a live row was affected so callers can tell "no such user" from a failure.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, new: &NewUser) -> Result<CreatedUser, ServiceError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, ServiceError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, ServiceError>;
    async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, ServiceError>;
    async fn update_fields(&self, id: Uuid, patch: &ProfilePatch) -> Result<bool, ServiceError>;
    async fn update_password_hash(&self, id: Uuid, hash: &str) -> Result<bool, ServiceError>;
    async fn set_photo(&self, id: Uuid, photo: &str) -> Result<bool, ServiceError>;
    async fn clear_photo(&self, id: Uuid) -> Result<bool, ServiceError>;
    async fn soft_delete(&self, id: Uuid) -> Result<bool, ServiceError>;
    async fn exists(&self, id: Uuid) -> Result<bool, ServiceError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_insert_err(e: sqlx::Error) -> ServiceError {
    match &e {
        // users_email_live_key: the index, not the pre-check, decides concurrent registrations
        sqlx::Error::Database(db) if db.is_unique_violation() => ServiceError::DuplicateEmail,
        _ => ServiceError::store(e),
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create_user(&self, new: &NewUser) -> Result<CreatedUser, ServiceError> {
        let mut tx = self.db.begin().await.map_err(ServiceError::store)?;
        let (id, role) = sqlx::query_as::<_, (Uuid, String)>(
            r#"
            INSERT INTO users (email, name, surname, password_hash, phone_number, birth_date, gender)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, role
            "#,
        )
        .bind(&new.email)
        .bind(&new.name)
        .bind(&new.surname)
        .bind(&new.password_hash)
        .bind(&new.phone_number)
        .bind(new.birth_date)
        .bind(&new.gender)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_insert_err)?;
        tx.commit().await.map_err(map_insert_err)?;
        Ok(CreatedUser { id, role })
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, surname, password_hash, phone_number, birth_date, gender,
                   address, photo, role, created_at, updated_at, deleted_at
              FROM users
             WHERE email = $1 AND deleted_at = 0
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .map_err(ServiceError::store)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, ServiceError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, surname, password_hash, phone_number, birth_date, gender,
                   address, photo, role, created_at, updated_at, deleted_at
              FROM users
             WHERE id = $1 AND deleted_at = 0
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(ServiceError::store)
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, ServiceError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, surname, password_hash, phone_number, birth_date, gender,
                   address, photo, role, created_at, updated_at, deleted_at
              FROM users
             WHERE phone_number = $1 AND deleted_at = 0
             ORDER BY created_at ASC
             LIMIT 1
            "#,
        )
        .bind(phone)
        .fetch_optional(&self.db)
        .await
        .map_err(ServiceError::store)
    }

    async fn update_fields(&self, id: Uuid, patch: &ProfilePatch) -> Result<bool, ServiceError> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET name         = COALESCE($2, name),
                   surname      = COALESCE($3, surname),
                   birth_date   = COALESCE($4, birth_date),
                   gender       = COALESCE($5, gender),
                   address      = COALESCE($6, address),
                   phone_number = COALESCE($7, phone_number),
                   updated_at   = now()
             WHERE id = $1 AND deleted_at = 0
            "#,
        )
        .bind(id)
        .bind(&patch.name)
        .bind(&patch.surname)
        .bind(patch.birth_date)
        .bind(&patch.gender)
        .bind(&patch.address)
        .bind(&patch.phone_number)
        .execute(&self.db)
        .await
        .map_err(ServiceError::store)?;
        Ok(res.rows_affected() > 0)
    }

    async fn update_password_hash(&self, id: Uuid, hash: &str) -> Result<bool, ServiceError> {
        let res = sqlx::query(
            r#"
            UPDATE users SET password_hash = $2, updated_at = now()
             WHERE id = $1 AND deleted_at = 0
            "#,
        )
        .bind(id)
        .bind(hash)
        .execute(&self.db)
        .await
        .map_err(ServiceError::store)?;
        Ok(res.rows_affected() > 0)
    }

    async fn set_photo(&self, id: Uuid, photo: &str) -> Result<bool, ServiceError> {
        let res = sqlx::query(
            r#"
            UPDATE users SET photo = $2, updated_at = now()
             WHERE id = $1 AND deleted_at = 0
            "#,
        )
        .bind(id)
        .bind(photo)
        .execute(&self.db)
        .await
        .map_err(ServiceError::store)?;
        Ok(res.rows_affected() > 0)
    }

    async fn clear_photo(&self, id: Uuid) -> Result<bool, ServiceError> {
        let res = sqlx::query(
            r#"
            UPDATE users SET photo = NULL, updated_at = now()
             WHERE id = $1 AND deleted_at = 0
            "#,
        )
        .bind(id)
        .execute(&self.db)
        .await
        .map_err(ServiceError::store)?;
        Ok(res.rows_affected() > 0)
    }

    async fn soft_delete(&self, id: Uuid) -> Result<bool, ServiceError> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET deleted_at = extract(epoch from now())::bigint, updated_at = now()
             WHERE id = $1 AND deleted_at = 0
            "#,
        )
        .bind(id)
        .execute(&self.db)
        .await
        .map_err(ServiceError::store)?;
        Ok(res.rows_affected() > 0)
    }

    async fn exists(&self, id: Uuid) -> Result<bool, ServiceError> {
        sqlx::query_scalar::<_, bool>(
            r#"SELECT EXISTS (SELECT 1 FROM users WHERE id = $1 AND deleted_at = 0)"#,
        )
        .bind(id)
        .fetch_one(&self.db)
        .await
        .map_err(ServiceError::store)
    }
}
