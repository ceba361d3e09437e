use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::ValidationError;

pub const PROMOCODE_MIN_LEN: usize = 3;
pub const PROMOCODE_MAX_LEN: usize = 32;

/// Promocode text, normalized to uppercase so lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PromocodeCode(String);

impl PromocodeCode {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if !(PROMOCODE_MIN_LEN..=PROMOCODE_MAX_LEN).contains(&trimmed.len()) {
            return Err(ValidationError::PromocodeFormat);
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ValidationError::PromocodeFormat);
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Wraps an already-normalized value loaded from storage.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for PromocodeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromocodeRecord {
    pub id: i64,
    pub code: PromocodeCode,
    pub reward: i64,
    pub max_uses: i64,
    pub current_uses: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PromocodeRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| now >= expiry)
    }

    pub fn remaining_uses(&self) -> i64 {
        (self.max_uses - self.current_uses).max(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPromocode {
    pub code: PromocodeCode,
    pub reward: i64,
    pub max_uses: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl NewPromocode {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.reward <= 0 {
            return Err(ValidationError::NonPositiveAmount);
        }
        if self.max_uses <= 0 {
            return Err(ValidationError::NonPositiveUses);
        }
        if self
            .expires_at
            .is_some_and(|expiry| expiry <= self.created_at)
        {
            return Err(ValidationError::ExpiryInPast);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedemptionOutcome {
    Redeemed { reward: i64, balance: i64 },
    NotFound,
    Expired,
    Exhausted,
    AlreadyRedeemed,
    AccountMissing,
    BalanceOverflow,
}
