use crate::checkpoint::sanitize_identity;
use async_trait::async_trait;
use collector_core::config::InputConfig;
use collector_core::{Error, Result};

/// Placeholder the host writes back into the config once the real secret
/// has been moved to protected storage.
pub const MASKED_SECRET: &str = "**********";

/// Collaborator that turns the configured secret placeholder into the real
/// credential. Invoked once per input per run, before client construction.
#[async_trait]
pub trait SecretResolver: Send + Sync {
    async fn resolve(&self, input: &InputConfig) -> Result<String>;
}

/// Environment-backed resolver: a masked `client_secret` is looked up under
/// `COLLECTOR_SECRET_<NAME>` (the identity's name segment, uppercased), and
/// an unmasked value is taken literally. The literal path exists for local
/// runs; deployments are expected to mask.
pub struct EnvSecretResolver;

impl EnvSecretResolver {
    pub fn env_key(input_identity: &str) -> Result<String> {
        let name = sanitize_identity(input_identity)?;
        let key: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        Ok(format!("COLLECTOR_SECRET_{key}"))
    }
}

#[async_trait]
impl SecretResolver for EnvSecretResolver {
    async fn resolve(&self, input: &InputConfig) -> Result<String> {
        if input.client_secret != MASKED_SECRET {
            return Ok(input.client_secret.clone());
        }

        let key = Self::env_key(&input.name)?;
        std::env::var(&key).map_err(|_| Error::Secret {
            input: input.name.clone(),
            details: format!("client_secret is masked and {key} is not set"),
        })
    }
}
