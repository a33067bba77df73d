use std::sync::Arc;

use anyhow::Context;
use axum::extract::FromRef;
use deadpool_redis::{Config as RedisConfig, Runtime};
use sqlx::PgPool;

use crate::auth::jwt::JwtKeys;
use crate::config::AppConfig;
use crate::storage::{Storage, StorageClient};
use crate::users::codes::RedisCodeStore;
use crate::users::mailer::SmtpMailer;
use crate::users::repo::PgUserStore;
use crate::users::service::AccountService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub accounts: AccountService,
    pub storage: Arc<dyn StorageClient>,
    pub jwt: JwtKeys,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(st: &AppState) -> Self {
        st.jwt.clone()
    }
}

impl AppState {
    pub async fn init(config: Arc<AppConfig>, db: PgPool) -> anyhow::Result<Self> {
        let redis = RedisConfig::from_url(&config.redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .context("create redis pool")?;

        let storage = Arc::new(Storage::new(&config.minio, "us-east-1")) as Arc<dyn StorageClient>;
        let mailer = SmtpMailer::new(&config.smtp).context("build smtp transport")?;
        let jwt = JwtKeys::new(&config.jwt);

        let accounts = AccountService::new(
            Arc::new(PgUserStore::new(db)),
            Arc::new(RedisCodeStore::new(redis)),
            Arc::new(mailer),
            jwt.clone(),
        );

        Ok(Self {
            config,
            accounts,
            storage,
            jwt,
        })
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        Self::fake_with(&crate::testing::Fakes::default())
    }

    /// State wired to the given in-memory fakes.
    #[cfg(test)]
    pub fn fake_with(fakes: &crate::testing::Fakes) -> Self {
        Self {
            config: Arc::new(AppConfig::for_tests()),
            accounts: fakes.accounts(),
            storage: fakes.storage.clone(),
            jwt: crate::testing::Fakes::jwt(),
        }
    }
}
