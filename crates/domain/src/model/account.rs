use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::ValidationError;

/// Accepted length range (in ASCII digits) for user-supplied game identifiers.
pub const GAME_ID_MIN_LEN: usize = 4;
pub const GAME_ID_MAX_LEN: usize = 11;

/// Upper bound on provider-issued subject ids (Discord snowflakes are ~19 digits).
pub const EXTERNAL_ID_MAX_LEN: usize = 32;

/// Number of times an account may change its nickname over its lifetime.
pub const MAX_NICKNAME_CHANGES: i16 = 2;

pub const NICKNAME_MAX_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId(i64);

impl AccountId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validated in-game player identifier (digits only).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GameId(String);

impl GameId {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if !(GAME_ID_MIN_LEN..=GAME_ID_MAX_LEN).contains(&trimmed.len()) {
            return Err(ValidationError::GameIdLength {
                min: GAME_ID_MIN_LEN,
                max: GAME_ID_MAX_LEN,
            });
        }
        if !trimmed.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::GameIdNonDigit);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentitySource {
    Game,
    Discord,
}

impl IdentitySource {
    pub fn as_str(self) -> &'static str {
        match self {
            IdentitySource::Game => "game",
            IdentitySource::Discord => "discord",
        }
    }
}

/// Stable lookup key for an account: where the identity came from plus the
/// subject that source vouches for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    source: IdentitySource,
    subject: String,
}

impl IdentityKey {
    pub fn game(id: &GameId) -> Self {
        Self {
            source: IdentitySource::Game,
            subject: id.as_str().to_owned(),
        }
    }

    /// Key for a third-party identity. Game ids only enter through
    /// [`IdentityKey::game`], which validates them as [`GameId`]s.
    pub fn external(source: IdentitySource, subject: &str) -> Result<Self, ValidationError> {
        if source == IdentitySource::Game {
            return Err(ValidationError::ExternalId);
        }
        let subject = subject.trim();
        if subject.is_empty() || subject.len() > EXTERNAL_ID_MAX_LEN {
            return Err(ValidationError::ExternalId);
        }
        if !subject.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ValidationError::ExternalId);
        }
        Ok(Self {
            source,
            subject: subject.to_owned(),
        })
    }

    /// Rebuilds a key from persisted columns without re-validating them.
    pub fn from_parts(source: IdentitySource, subject: impl Into<String>) -> Self {
        Self {
            source,
            subject: subject.into(),
        }
    }

    pub fn source(&self) -> IdentitySource {
        self.source
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The in-game id when this account signed in with one.
    pub fn game_id(&self) -> Option<GameId> {
        match self.source {
            IdentitySource::Game => Some(GameId(self.subject.clone())),
            IdentitySource::Discord => None,
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source.as_str(), self.subject)
    }
}

/// Profile returned by an external provider after a successful code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalProfile {
    pub source: IdentitySource,
    pub external_id: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityAssertion {
    /// Raw, unvalidated identifier typed by the user.
    Game(String),
    External(ExternalProfile),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub id: AccountId,
    pub identity: IdentityKey,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
    pub nickname_changes: i16,
    pub balance: i64,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccountRecord {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn can_change_nickname(&self) -> bool {
        self.nickname_changes < MAX_NICKNAME_CHANGES
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub identity: IdentityKey,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertedAccount {
    pub account: AccountRecord,
    /// `false` when a concurrent resolve already created the row.
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameOutcome {
    Renamed(AccountRecord),
    LimitReached,
    AccountMissing,
}

/// Trims and checks a nickname candidate.
pub fn normalize_nickname(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    let len = trimmed.chars().count();
    if len == 0 || len > NICKNAME_MAX_LEN {
        return Err(ValidationError::NicknameLength {
            max: NICKNAME_MAX_LEN,
        });
    }
    if trimmed.chars().any(char::is_control) {
        return Err(ValidationError::NicknameCharacters);
    }
    Ok(trimmed.to_owned())
}
