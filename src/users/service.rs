use std::sync::Arc;

use time::{macros::format_description, Date};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::codes::{generate_code, CodeMatch, CodeStore};
use super::dto::PublicProfile;
use super::mailer::Mailer;
use super::model::{NewUser, ProfilePatch};
use super::repo::UserStore;
use crate::auth::jwt::JwtKeys;
use crate::auth::password::{hash_password_blocking, verify_password_blocking};
use crate::error::ServiceError;

pub struct Registration {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub phone_number: Option<String>,
    /// `dd-mm-yyyy`
    pub birth_date: String,
    pub gender: Option<String>,
}

/// Raw profile update; blank strings are treated as omitted.
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub birth_date: Option<String>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub phone_number: Option<String>,
}

pub fn parse_birth_date(raw: &str) -> Result<Date, ServiceError> {
    Date::parse(raw.trim(), format_description!("[day]-[month]-[year]"))
        .map_err(|_| ServiceError::InvalidDate)
}

fn supplied(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty())
}

impl ProfileUpdate {
    fn into_patch(self) -> Result<ProfilePatch, ServiceError> {
        let birth_date = supplied(self.birth_date);
        let patch = ProfilePatch {
            name: supplied(self.name),
            surname: supplied(self.surname),
            birth_date: None,
            gender: supplied(self.gender),
            address: supplied(self.address),
            phone_number: supplied(self.phone_number),
        };
        if patch.is_empty() && birth_date.is_none() {
            return Err(ServiceError::NoFieldsProvided);
        }
        Ok(ProfilePatch {
            birth_date: birth_date.as_deref().map(parse_birth_date).transpose()?,
            ..patch
        })
    }
}

/// Credential and profile lifecycle. Every operation except `register`
/// requires a live account.
#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserStore>,
    codes: Arc<dyn CodeStore>,
    mailer: Arc<dyn Mailer>,
    jwt: JwtKeys,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UserStore>,
        codes: Arc<dyn CodeStore>,
        mailer: Arc<dyn Mailer>,
        jwt: JwtKeys,
    ) -> Self {
        Self {
            users,
            codes,
            mailer,
            jwt,
        }
    }

    /// Creates the account and returns a session token for it.
    #[instrument(skip_all, fields(email = %input.email))]
    pub async fn register(&self, input: Registration) -> Result<String, ServiceError> {
        if self.users.find_by_email(&input.email).await?.is_some() {
            warn!("email already registered");
            return Err(ServiceError::DuplicateEmail);
        }
        let birth_date = parse_birth_date(&input.birth_date)?;
        let password_hash = hash_password_blocking(input.password).await?;

        let created = self
            .users
            .create_user(&NewUser {
                email: input.email,
                password_hash,
                name: supplied(input.name),
                surname: supplied(input.surname),
                phone_number: supplied(input.phone_number),
                birth_date,
                gender: supplied(input.gender),
            })
            .await?;

        let token = self.jwt.issue(created.id, &created.role)?;
        info!(user_id = %created.id, "user registered");
        Ok(token)
    }

    /// `identifier` is tried as an email first, then as a phone number.
    #[instrument(skip_all)]
    pub async fn login(&self, identifier: &str, password: &str) -> Result<String, ServiceError> {
        let user = match self.users.find_by_email(identifier).await? {
            Some(u) => u,
            None => self
                .users
                .find_by_phone(identifier)
                .await?
                .ok_or(ServiceError::NotFound)?,
        };

        if !verify_password_blocking(password.to_owned(), user.password_hash).await? {
            warn!(user_id = %user.id, "login invalid password");
            return Err(ServiceError::InvalidCredentials);
        }

        let token = self.jwt.issue(user.id, &user.role)?;
        info!(user_id = %user.id, "user logged in");
        Ok(token)
    }

    /// Mails a fresh reset code, then stores it. Nothing is stored if mailing fails.
    #[instrument(skip(self))]
    pub async fn forgot_password(&self, email: &str) -> Result<(), ServiceError> {
        let code = generate_code();
        self.mailer
            .send_reset_code(email, &code)
            .await
            .map_err(ServiceError::EmailDelivery)?;
        // A failure here leaves a mailed code that can never be redeemed; the user asks again.
        self.codes.put(email, &code).await?;
        info!("reset code sent");
        Ok(())
    }

    #[instrument(skip(self, code, new_password))]
    pub async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        // Consumed before the overwrite; concurrent redemptions of one code get NoPendingReset.
        match self.codes.take_if_matches(email, code).await? {
            CodeMatch::Consumed => {}
            CodeMatch::Mismatch => {
                warn!("reset code mismatch");
                return Err(ServiceError::CodeMismatch);
            }
            CodeMatch::Absent => return Err(ServiceError::NoPendingReset),
        }

        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(ServiceError::NotFound)?;
        let hash = hash_password_blocking(new_password.to_owned()).await?;
        if !self.users.update_password_hash(user.id, &hash).await? {
            return Err(ServiceError::NotFound);
        }
        info!(user_id = %user.id, "password reset");
        Ok(())
    }

    #[instrument(skip(self, old_password, new_password))]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(ServiceError::NotFound)?;
        if !verify_password_blocking(old_password.to_owned(), user.password_hash).await? {
            warn!("change password with wrong old password");
            return Err(ServiceError::InvalidCredentials);
        }
        let hash = hash_password_blocking(new_password.to_owned()).await?;
        if !self.users.update_password_hash(user_id, &hash).await? {
            return Err(ServiceError::NotFound);
        }
        info!("password changed");
        Ok(())
    }

    #[instrument(skip(self, update))]
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        update: ProfileUpdate,
    ) -> Result<(), ServiceError> {
        let patch = update.into_patch()?;
        if !self.users.update_fields(user_id, &patch).await? {
            return Err(ServiceError::NotFound);
        }
        info!("profile updated");
        Ok(())
    }

    /// Points the profile at an already uploaded photo. Releasing a previous
    /// object is the caller's job.
    #[instrument(skip(self))]
    pub async fn associate_photo(&self, user_id: Uuid, photo_ref: &str) -> Result<(), ServiceError> {
        if !self.users.set_photo(user_id, photo_ref).await? {
            return Err(ServiceError::NotFound);
        }
        Ok(())
    }

    /// Clears the photo reference; succeeds when none is set.
    #[instrument(skip(self))]
    pub async fn dissociate_photo(&self, user_id: Uuid) -> Result<(), ServiceError> {
        if !self.users.clear_photo(user_id).await? {
            return Err(ServiceError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_account(&self, user_id: Uuid) -> Result<(), ServiceError> {
        if !self.users.soft_delete(user_id).await? {
            return Err(ServiceError::NotFound);
        }
        info!("account deleted");
        Ok(())
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<PublicProfile, ServiceError> {
        self.users
            .find_by_id(user_id)
            .await?
            .map(PublicProfile::from)
            .ok_or(ServiceError::NotFound)
    }

    pub async fn profile_by_email(&self, email: &str) -> Result<PublicProfile, ServiceError> {
        self.users
            .find_by_email(email)
            .await?
            .map(PublicProfile::from)
            .ok_or(ServiceError::NotFound)
    }

    pub async fn user_exists(&self, user_id: Uuid) -> Result<bool, ServiceError> {
        self.users.exists(user_id).await
    }
}
