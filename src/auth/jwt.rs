use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{util::days_in_year_month, Date, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{config::JwtConfig, error::ServiceError};

/// Session token payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

/// Identity resolved from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: Uuid,
    pub role: String,
}

/// HS256 signing and verification keys, built once from config.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    ttl_months: u32,
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            ttl_months: cfg.ttl_months,
        }
    }

    pub fn issue(&self, user_id: Uuid, role: &str) -> Result<String, ServiceError> {
        let now = OffsetDateTime::now_utc();
        let exp = add_months(now, self.ttl_months)?;
        let claims = Claims {
            sub: user_id,
            role: role.to_owned(),
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
            iss: self.issuer.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ServiceError::Signing(e.into()))?;
        debug!(user_id = %user_id, role, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Session, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            warn!(error = %e, "jwt rejected");
            ServiceError::InvalidToken
        })?;
        debug!(user_id = %data.claims.sub, "jwt verified");
        Ok(Session {
            user_id: data.claims.sub,
            role: data.claims.role,
        })
    }
}

/// Calendar-month addition; the day is clamped to the end of a shorter target month.
fn add_months(at: OffsetDateTime, months: u32) -> Result<OffsetDateTime, ServiceError> {
    let date = at.date();
    let month0 = date.month() as u32 - 1 + months;
    let year = date.year() + (month0 / 12) as i32;
    let month = date.month().nth_next((months % 12) as u8);
    let day = date.day().min(days_in_year_month(year, month));
    let target = Date::from_calendar_date(year, month, day)
        .map_err(|e| ServiceError::Signing(e.into()))?;
    Ok(at.replace_date(target))
}
