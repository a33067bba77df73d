use async_trait::async_trait;
use deadpool_redis::redis::{AsyncCommands, Script};
use deadpool_redis::Pool;
use lazy_static::lazy_static;
use rand::Rng;

use crate::error::ServiceError;

/// Lifetime of a pending password-reset code.
pub const RESET_CODE_TTL_SECS: u64 = 10 * 60;

/// Outcome of redeeming a reset code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeMatch {
    /// The code matched and is gone.
    Consumed,
    /// A different code is pending; it stays pending.
    Mismatch,
    /// Nothing pending, or it expired.
    Absent,
}

/// Short-lived email -> reset code cache. At most one code is pending per email.
#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Stores `code` for `email`, replacing any pending one.
    async fn put(&self, email: &str, code: &str) -> Result<(), ServiceError>;
    /// Compares and deletes in one step, so a code is redeemed at most once.
    async fn take_if_matches(&self, email: &str, code: &str) -> Result<CodeMatch, ServiceError>;
}

/// Six decimal digits, uniform over 100000..=999999.
pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999u32).to_string()
}

#[derive(Clone)]
pub struct RedisCodeStore {
    pool: Pool,
}

impl RedisCodeStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

lazy_static! {
    // 0 = absent, 1 = matched and deleted, 2 = mismatch (left in place)
    static ref TAKE_IF_MATCHES: Script = Script::new(
        r#"
        local pending = redis.call('GET', KEYS[1])
        if not pending then return 0 end
        if pending == ARGV[1] then
            redis.call('DEL', KEYS[1])
            return 1
        end
        return 2
        "#,
    );
}

fn reset_code_key(email: &str) -> String {
    format!("reset_code:{}", email)
}

#[async_trait]
impl CodeStore for RedisCodeStore {
    async fn put(&self, email: &str, code: &str) -> Result<(), ServiceError> {
        let mut conn = self.pool.get().await.map_err(ServiceError::cache)?;
        let (): () = conn
            .set_ex(reset_code_key(email), code, RESET_CODE_TTL_SECS)
            .await
            .map_err(ServiceError::cache)?;
        Ok(())
    }

    async fn take_if_matches(&self, email: &str, code: &str) -> Result<CodeMatch, ServiceError> {
        let mut conn = self.pool.get().await.map_err(ServiceError::cache)?;
        let outcome: i64 = TAKE_IF_MATCHES
            .key(reset_code_key(email))
            .arg(code)
            .invoke_async(&mut conn)
            .await
            .map_err(ServiceError::cache)?;
        Ok(match outcome {
            1 => CodeMatch::Consumed,
            2 => CodeMatch::Mismatch,
            _ => CodeMatch::Absent,
        })
    }
}
