//! Depot configuration and first-run bootstrap.

use serde::{Deserialize, Serialize};

use crate::depot::Depot;
use crate::errors::Result;
use crate::id::Id;
use crate::permission::{Action, Level, ScopeType};

fn default_root_user() -> String {
    "root".to_string()
}

fn default_root_email() -> String {
    "root@localhost".to_string()
}

fn default_db_path() -> String {
    "./depot-data".to_string()
}

/// Top-level depot configuration, deserializable from TOML/JSON/env.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "rootUser")]
    pub root_user: String,
    #[serde(rename = "rootEmail")]
    pub root_email: String,
    #[serde(rename = "rootPassword")]
    pub root_password: String,
    #[serde(rename = "dbPath")]
    pub db_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Config { root_user: default_root_user(), root_email: default_root_email(), root_password: String::new(), db_path: default_db_path() }
    }
}

impl Config {
    pub fn from_toml(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| crate::errors::DepotError::Parsing(format!("invalid config: {e}")))
    }

    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Create the root user with blanket `Global:*:Admin` access if it does
    /// not already exist. Safe to call on every startup.
    pub fn bootstrap(&self, depot: &Depot) -> Result<Id> {
        if let Ok(existing) = depot.users.retrieve_by_username(&self.root_user) {
            return Ok(existing.id);
        }
        let admin = Action::new(ScopeType::Global, "*", Level::Admin);
        let user = depot.users.create(&self.root_user, &self.root_email, &self.root_password, vec![admin])?;
        Ok(user.id)
    }
}
