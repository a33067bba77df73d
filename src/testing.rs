//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::jwt::JwtKeys;
use crate::config::AppConfig;
use crate::error::ServiceError;
use crate::storage::StorageClient;
use crate::users::codes::{CodeMatch, CodeStore, RESET_CODE_TTL_SECS};
use crate::users::mailer::Mailer;
use crate::users::model::{CreatedUser, NewUser, ProfilePatch, User};
use crate::users::repo::UserStore;
use crate::users::service::AccountService;

#[derive(Default)]
pub struct MemoryUserStore {
    rows: Mutex<Vec<User>>,
}

impl MemoryUserStore {
    /// Raw row access, including soft-deleted rows.
    pub fn row(&self, id: Uuid) -> Option<User> {
        self.rows.lock().unwrap().iter().find(|u| u.id == id).cloned()
    }

    fn with_live<T>(&self, id: Uuid, f: impl FnOnce(&mut User) -> T) -> Option<T> {
        let mut rows = self.rows.lock().unwrap();
        rows.iter_mut()
            .find(|u| u.id == id && u.deleted_at == 0)
            .map(f)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create_user(&self, new: &NewUser) -> Result<CreatedUser, ServiceError> {
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|u| u.email == new.email && u.deleted_at == 0) {
            return Err(ServiceError::DuplicateEmail);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: new.email.clone(),
            name: new.name.clone(),
            surname: new.surname.clone(),
            password_hash: new.password_hash.clone(),
            phone_number: new.phone_number.clone(),
            birth_date: Some(new.birth_date),
            gender: new.gender.clone(),
            address: None,
            photo: None,
            role: "user".into(),
            created_at: now,
            updated_at: now,
            deleted_at: 0,
        };
        let created = CreatedUser {
            id: user.id,
            role: user.role.clone(),
        };
        rows.push(user);
        Ok(created)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .find(|u| u.email == email && u.deleted_at == 0)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, ServiceError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .find(|u| u.id == id && u.deleted_at == 0)
            .cloned())
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, ServiceError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .find(|u| u.phone_number.as_deref() == Some(phone) && u.deleted_at == 0)
            .cloned())
    }

    async fn update_fields(&self, id: Uuid, patch: &ProfilePatch) -> Result<bool, ServiceError> {
        Ok(self
            .with_live(id, |u| {
                if let Some(v) = &patch.name {
                    u.name = Some(v.clone());
                }
                if let Some(v) = &patch.surname {
                    u.surname = Some(v.clone());
                }
                if let Some(v) = patch.birth_date {
                    u.birth_date = Some(v);
                }
                if let Some(v) = &patch.gender {
                    u.gender = Some(v.clone());
                }
                if let Some(v) = &patch.address {
                    u.address = Some(v.clone());
                }
                if let Some(v) = &patch.phone_number {
                    u.phone_number = Some(v.clone());
                }
                u.updated_at = OffsetDateTime::now_utc();
            })
            .is_some())
    }

    async fn update_password_hash(&self, id: Uuid, hash: &str) -> Result<bool, ServiceError> {
        Ok(self.with_live(id, |u| u.password_hash = hash.to_owned()).is_some())
    }

    async fn set_photo(&self, id: Uuid, photo: &str) -> Result<bool, ServiceError> {
        Ok(self.with_live(id, |u| u.photo = Some(photo.to_owned())).is_some())
    }

    async fn clear_photo(&self, id: Uuid) -> Result<bool, ServiceError> {
        Ok(self.with_live(id, |u| u.photo = None).is_some())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<bool, ServiceError> {
        let epoch = OffsetDateTime::now_utc().unix_timestamp().max(1);
        Ok(self.with_live(id, |u| u.deleted_at = epoch).is_some())
    }

    async fn exists(&self, id: Uuid) -> Result<bool, ServiceError> {
        Ok(self.with_live(id, |_| ()).is_some())
    }
}

pub struct MemoryCodeStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, (String, Instant)>>,
    fail_writes: bool,
}

impl Default for MemoryCodeStore {
    fn default() -> Self {
        Self::with_ttl(Duration::from_secs(RESET_CODE_TTL_SECS))
    }
}

impl MemoryCodeStore {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            fail_writes: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn pending(&self, email: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap()
            .get(email)
            .filter(|(_, exp)| Instant::now() < *exp)
            .map(|(code, _)| code.clone())
    }
}

#[async_trait]
impl CodeStore for MemoryCodeStore {
    async fn put(&self, email: &str, code: &str) -> Result<(), ServiceError> {
        if self.fail_writes {
            return Err(ServiceError::cache(anyhow::anyhow!("cache down")));
        }
        self.entries
            .lock()
            .unwrap()
            .insert(email.to_owned(), (code.to_owned(), Instant::now() + self.ttl));
        Ok(())
    }

    async fn take_if_matches(&self, email: &str, code: &str) -> Result<CodeMatch, ServiceError> {
        let mut entries = self.entries.lock().unwrap();
        let outcome = match entries.get(email) {
            Some((_, exp)) if Instant::now() >= *exp => CodeMatch::Absent,
            Some((pending, _)) if pending == code => CodeMatch::Consumed,
            Some(_) => CodeMatch::Mismatch,
            None => CodeMatch::Absent,
        };
        if outcome == CodeMatch::Consumed {
            entries.remove(email);
        }
        Ok(outcome)
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Last code mailed to `to`.
    pub fn last_code(&self, to: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(addr, _)| addr == to)
            .map(|(_, code)| code.clone())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_reset_code(&self, to: &str, code: &str) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("smtp unreachable");
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_owned(), code.to_owned()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, Bytes>>,
    undeletable: Mutex<Vec<String>>,
}

impl FakeStorage {
    /// Makes every later `delete_object(key)` fail.
    pub fn fail_deletes_of(&self, key: &str) {
        self.undeletable.lock().unwrap().push(key.to_owned());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StorageClient for FakeStorage {
    async fn put_object(&self, key: &str, body: Bytes, _ct: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().insert(key.to_owned(), body);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        if self.undeletable.lock().unwrap().iter().any(|k| k == key) {
            anyhow::bail!("delete refused for {key}");
        }
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Handles to the fakes behind an `AccountService` or `AppState`.
#[derive(Clone, Default)]
pub struct Fakes {
    pub users: Arc<MemoryUserStore>,
    pub codes: Arc<MemoryCodeStore>,
    pub mailer: Arc<RecordingMailer>,
    pub storage: Arc<FakeStorage>,
}

impl Fakes {
    pub fn jwt() -> JwtKeys {
        JwtKeys::new(&AppConfig::for_tests().jwt)
    }

    pub fn accounts(&self) -> AccountService {
        AccountService::new(
            self.users.clone(),
            self.codes.clone(),
            self.mailer.clone(),
            Self::jwt(),
        )
    }
}
