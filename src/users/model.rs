use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

/// User row. `deleted_at` is 0 for live accounts, otherwise the deletion epoch.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub password_hash: String,
    pub phone_number: Option<String>,
    pub birth_date: Option<Date>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub photo: Option<String>,
    pub role: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: i64,
}

/// Insert payload; id and role are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub phone_number: Option<String>,
    pub birth_date: Date,
    pub gender: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedUser {
    pub id: Uuid,
    pub role: String,
}

/// Partial profile update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub birth_date: Option<Date>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub phone_number: Option<String>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.surname.is_none()
            && self.birth_date.is_none()
            && self.gender.is_none()
            && self.address.is_none()
            && self.phone_number.is_none()
    }
}
