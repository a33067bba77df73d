use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::model::User;

/// Request body for `PUT /user/profile`. Empty strings count as omitted.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub surname: Option<String>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct PhotoResponse {
    pub url: String,
}

/// Profile as shown to clients; the password hash never leaves the store layer.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PublicProfile {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub surname: Option<String>,
    /// `yyyy-mm-dd`
    pub birth_date: Option<String>,
    pub gender: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub photo: Option<String>,
    pub role: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<User> for PublicProfile {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            name: u.name,
            surname: u.surname,
            birth_date: u.birth_date.map(|d| d.to_string()),
            gender: u.gender,
            phone_number: u.phone_number,
            address: u.address,
            photo: u.photo,
            role: u.role,
            created_at: u.created_at,
        }
    }
}
