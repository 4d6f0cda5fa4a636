//! User & session store: accounts, granted permissions, and opaque
//! bearer tokens.
//!
//! Password hashing follows the data model's only hard requirement —
//! stored credentials must be non-reversible — with a concrete default of
//! SHA-256 over a username-derived salt concatenated with the password.
//! Swapping in a memory-hard KDF (Argon2, scrypt) is a drop-in replacement
//! behind [`PasswordHash::compute`]; see DESIGN.md.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::errors::{DepotError, Result};
use crate::id::{Id, Kind};
use crate::internal::stash::{composite_key, load_index, retrieve, stage_record_and_index};
use crate::kv::{self, ColumnFamily, KvStore, WriteBatch};
use crate::permission::Action;

const USER_INDEX_KEY: &str = "__user__index__";
/// Issued tokens are valid for one week before they must be rotated.
const TOKEN_LIFETIME: Duration = Duration::weeks(1);
/// A token within this window of expiry is rotated on its next issuance
/// instead of being reused.
const TOKEN_ROTATION_WINDOW: Duration = Duration::days(1);

/// A non-reversible password hash: hex-encoded SHA-256 of `salt || password`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Derive the salt from `username` and hash `password` against it.
    pub fn compute(username: &str, password: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(username.as_bytes());
        hasher.update(password.as_bytes());
        PasswordHash(hex::encode(hasher.finalize()))
    }
}

impl fmt::Display for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PasswordHash {
    type Err = DepotError;

    fn from_str(s: &str) -> Result<Self> {
        hex::decode(s).map_err(|e| DepotError::Parsing(format!("`{s}` is not a valid password hash: {e}")))?;
        Ok(PasswordHash(s.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    pub username: String,
    pub email: String,
    pub password_hash: PasswordHash,
    pub active: bool,
    pub granted: Vec<Action>,
    pub created_at: DateTime<Utc>,
}

/// An opaque bearer token bound to a user, valid until `expires_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub token: String,
    pub user: Id,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub struct UserStore {
    store: Arc<dyn KvStore>,
}

impl UserStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        UserStore { store }
    }

    pub fn retrieve(&self, user_id: &Id) -> Result<User> {
        retrieve(self.store.as_ref(), ColumnFamily::Users, user_id.as_str(), || format!("user `{user_id}` not found"))
    }

    pub fn retrieve_by_username(&self, username: &str) -> Result<User> {
        let index = load_index(self.store.as_ref(), ColumnFamily::Users, USER_INDEX_KEY)?;
        let id = index.get(username).ok_or_else(|| DepotError::not_found(format!("user `{username}` not found")))?;
        self.retrieve(id)
    }

    pub fn list(&self) -> Result<Vec<User>> {
        let index = load_index(self.store.as_ref(), ColumnFamily::Users, USER_INDEX_KEY)?;
        index.values().map(|id| self.retrieve(id)).collect()
    }

    pub fn create(&self, username: &str, email: &str, password: &str, granted: Vec<Action>) -> Result<User> {
        let mut index = load_index(self.store.as_ref(), ColumnFamily::Users, USER_INDEX_KEY)?;
        if index.contains_key(username) {
            return Err(DepotError::Conflict(format!("user `{username}` already exists")));
        }

        let user = User {
            id: Id::new(Kind::User),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: PasswordHash::compute(username, password),
            active: true,
            granted,
            created_at: Utc::now(),
        };
        index.insert(username.to_string(), user.id.clone());

        let mut batch = WriteBatch::new();
        stage_record_and_index(&mut batch, ColumnFamily::Users, user.id.as_str(), &user, USER_INDEX_KEY, &index)?;
        self.store.write_batch(batch)?;

        Ok(user)
    }

    fn persist(&self, user: &User) -> Result<()> {
        kv::put_json(self.store.as_ref(), ColumnFamily::Users, user.id.as_str(), user)
    }

    pub fn deactivate(&self, user_id: &Id) -> Result<User> {
        let mut user = self.retrieve(user_id)?;
        user.active = false;
        self.persist(&user)?;
        Ok(user)
    }

    pub fn reactivate(&self, user_id: &Id) -> Result<User> {
        let mut user = self.retrieve(user_id)?;
        user.active = true;
        self.persist(&user)?;
        Ok(user)
    }

    pub fn grant(&self, user_id: &Id, action: Action) -> Result<User> {
        let mut user = self.retrieve(user_id)?;
        if !user.granted.contains(&action) {
            user.granted.push(action);
        }
        self.persist(&user)?;
        Ok(user)
    }

    pub fn revoke(&self, user_id: &Id, action: &Action) -> Result<User> {
        let mut user = self.retrieve(user_id)?;
        user.granted.retain(|a| a != action);
        self.persist(&user)?;
        Ok(user)
    }

    pub fn update_password(&self, user_id: &Id, new_password: &str) -> Result<User> {
        let mut user = self.retrieve(user_id)?;
        user.password_hash = PasswordHash::compute(&user.username, new_password);
        self.persist(&user)?;
        Ok(user)
    }

    /// Verify credentials. Fails with `Authentication` on bad username,
    /// bad password, or an inactive account.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Id> {
        let user = self.retrieve_by_username(username).map_err(|_| DepotError::Authentication("invalid credentials".into()))?;
        if !user.active {
            return Err(DepotError::Authentication("account is inactive".into()));
        }
        if user.password_hash != PasswordHash::compute(username, password) {
            return Err(DepotError::Authentication("invalid credentials".into()));
        }
        Ok(user.id)
    }

    fn current_token_key(user_id: &Id) -> String {
        composite_key(&["current", user_id.as_str()])
    }

    fn current_token(&self, user_id: &Id) -> Result<Option<Token>> {
        let Some(token_string) = kv::get_json::<String>(self.store.as_ref(), ColumnFamily::Tokens, &Self::current_token_key(user_id))? else {
            return Ok(None);
        };
        kv::get_json(self.store.as_ref(), ColumnFamily::Tokens, &token_string)
    }

    /// Issue a bearer token for `user_id`. An existing token with more than
    /// a day left on it is reused; otherwise a fresh one is minted and
    /// becomes the user's current token.
    pub fn issue_token(&self, user_id: &Id) -> Result<Token> {
        let user = self.retrieve(user_id)?;
        if !user.active {
            return Err(DepotError::Authentication("account is inactive".into()));
        }

        let now = Utc::now();
        if let Some(existing) = self.current_token(user_id)? {
            if existing.expires_at - now > TOKEN_ROTATION_WINDOW {
                return Ok(existing);
            }
        }

        let token = Token { token: Uuid::new_v4().to_string(), user: user_id.clone(), issued_at: now, expires_at: now + TOKEN_LIFETIME };
        let mut batch = WriteBatch::new();
        batch.put_json(ColumnFamily::Tokens, token.token.clone(), &token)?;
        batch.put_json(ColumnFamily::Tokens, Self::current_token_key(user_id), &token.token)?;
        self.store.write_batch(batch)?;
        Ok(token)
    }

    /// Check that `token` is present, bound to `user_id`, and unexpired.
    pub fn validate(&self, user_id: &Id, token: &str) -> Result<bool> {
        let Some(stored): Option<Token> = kv::get_json(self.store.as_ref(), ColumnFamily::Tokens, token)? else {
            return Ok(false);
        };
        Ok(&stored.user == user_id && stored.expires_at > Utc::now())
    }
}
