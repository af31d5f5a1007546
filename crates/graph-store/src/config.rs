use crate::error::{GraphStoreError, Result};
use serde::Deserialize;

/// Neo4j connection settings, read from `NEO4J_URI`, `NEO4J_USER` and
/// `NEO4J_PASSWORD`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Neo4jConfig {
    /// Bolt URI, e.g. bolt://localhost:7687
    #[serde(default = "default_uri")]
    pub uri: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_password")]
    pub password: String,
}

fn default_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_password() -> String {
    "neo4j".to_string()
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            user: default_user(),
            password: default_password(),
        }
    }
}

impl Neo4jConfig {
    /// Load `.env` if present, then read the `NEO4J_*` variables
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        envy::prefixed("NEO4J_")
            .from_env::<Self>()
            .map_err(|e| GraphStoreError::Config(e.to_string()))
    }

    fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed("NEO4J_")
            .from_iter::<_, Self>(vars)
            .map_err(|e| GraphStoreError::Config(e.to_string()))
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }
}
