//! Bearer credential sources for the push channel.

use async_trait::async_trait;

use crate::traits::CredentialProvider;

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// A fixed credential, or none.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    authorization: Option<String>,
}

impl StaticCredentials {
    #[must_use]
    pub fn bearer(token: &str) -> Self {
        Self {
            authorization: Some(bearer(token)),
        }
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn authorization(&self) -> anyhow::Result<Option<String>> {
        Ok(self.authorization.clone())
    }
}

/// Reads the token from an environment variable on every call, so a token
/// rotated between reconnects is picked up.
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    var: String,
}

impl EnvCredentials {
    #[must_use]
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentials {
    async fn authorization(&self) -> anyhow::Result<Option<String>> {
        match std::env::var(&self.var) {
            Ok(token) if token.is_empty() => Ok(None),
            Ok(token) => Ok(Some(bearer(&token))),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(err) => Err(anyhow::anyhow!("{}: {err}", self.var)),
        }
    }
}
