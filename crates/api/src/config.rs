//! Configuration loaded from the environment at startup

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use linkguard_billing::{PolicyConfig, StripeConfig};
use thiserror::Error;

const DEFAULT_HOST: IpAddr = IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED);
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_REFERENCE_ID_PREFIX: &str = "sfx_";
const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;
const DEFAULT_STRIPE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub monitored_payment_links: Vec<String>,
    pub reference_id_prefix: String,
    pub webhook_tolerance_secs: i64,
    pub stripe_timeout: Duration,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("stripe_secret_key", &"[redacted]")
            .field("stripe_webhook_secret", &"[redacted]")
            .field("monitored_payment_links", &self.monitored_payment_links)
            .field("reference_id_prefix", &self.reference_id_prefix)
            .field("webhook_tolerance_secs", &self.webhook_tolerance_secs)
            .field("stripe_timeout", &self.stripe_timeout)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; `from_env` passes the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let stripe_webhook_secret =
            var("STRIPE_WEBHOOK_SECRET").ok_or(ConfigError::Missing("STRIPE_WEBHOOK_SECRET"))?;
        let stripe_secret_key =
            var("STRIPE_SECRET_KEY").ok_or(ConfigError::Missing("STRIPE_SECRET_KEY"))?;

        let host: IpAddr = parse_or("HOST", var("HOST"), DEFAULT_HOST)?;
        let port: u16 = parse_or("PORT", var("PORT"), DEFAULT_PORT)?;

        let monitored_payment_links = var("MONITORED_PAYMENT_LINKS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        // Whitespace is significant in the prefix, so no trimming here
        let reference_id_prefix = lookup("REFERENCE_ID_PREFIX")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_REFERENCE_ID_PREFIX.to_string());

        let webhook_tolerance_secs: i64 = parse_or(
            "WEBHOOK_TOLERANCE_SECS",
            var("WEBHOOK_TOLERANCE_SECS"),
            DEFAULT_WEBHOOK_TOLERANCE_SECS,
        )?;
        if webhook_tolerance_secs < 0 {
            return Err(ConfigError::Invalid {
                name: "WEBHOOK_TOLERANCE_SECS",
                value: webhook_tolerance_secs.to_string(),
                reason: "must not be negative".to_string(),
            });
        }

        let stripe_timeout_secs: u64 = parse_or(
            "STRIPE_TIMEOUT_SECS",
            var("STRIPE_TIMEOUT_SECS"),
            DEFAULT_STRIPE_TIMEOUT_SECS,
        )?;
        if stripe_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "STRIPE_TIMEOUT_SECS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            bind_address: SocketAddr::new(host, port),
            stripe_secret_key,
            stripe_webhook_secret,
            monitored_payment_links,
            reference_id_prefix,
            webhook_tolerance_secs,
            stripe_timeout: Duration::from_secs(stripe_timeout_secs),
        })
    }

    pub fn stripe_config(&self) -> StripeConfig {
        StripeConfig {
            secret_key: self.stripe_secret_key.clone(),
            webhook_secret: self.stripe_webhook_secret.clone(),
            webhook_tolerance_secs: self.webhook_tolerance_secs,
            request_timeout: self.stripe_timeout,
        }
    }

    pub fn policy_config(&self) -> PolicyConfig {
        PolicyConfig::new(
            self.monitored_payment_links.iter().cloned(),
            self.reference_id_prefix.clone(),
        )
    }
}

fn parse_or<T>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("STRIPE_WEBHOOK_SECRET", "whsec_test"),
        ("STRIPE_SECRET_KEY", "sk_test_123"),
    ];

    #[test]
    fn test_defaults() {
        let config = load(&REQUIRED).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:3000".parse::<SocketAddr>().unwrap());
        assert!(config.monitored_payment_links.is_empty());
        assert_eq!(config.reference_id_prefix, "sfx_");
        assert_eq!(config.webhook_tolerance_secs, 300);
        assert_eq!(config.stripe_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_missing_secrets() {
        let err = load(&[("STRIPE_SECRET_KEY", "sk_test_123")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("STRIPE_WEBHOOK_SECRET")));

        let err = load(&[
            ("STRIPE_WEBHOOK_SECRET", "whsec_test"),
            ("STRIPE_SECRET_KEY", "   "),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("STRIPE_SECRET_KEY")));
    }

    #[test]
    fn test_overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("MONITORED_PAYMENT_LINKS", "plink_A, plink_B,,"),
            ("REFERENCE_ID_PREFIX", "acme-"),
            ("WEBHOOK_TOLERANCE_SECS", "60"),
            ("STRIPE_TIMEOUT_SECS", "5"),
        ]);

        let config = load(&vars).unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.monitored_payment_links, vec!["plink_A", "plink_B"]);
        assert_eq!(config.reference_id_prefix, "acme-");
        assert_eq!(config.webhook_tolerance_secs, 60);
        assert_eq!(config.stripe_timeout, Duration::from_secs(5));

        let policy = config.policy_config();
        assert!(policy.monitored_payment_links.contains("plink_B"));
        assert_eq!(config.stripe_config().webhook_tolerance_secs, 60);
    }

    #[test]
    fn test_invalid_numbers() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("PORT", "http"));
        assert!(matches!(
            load(&vars).unwrap_err(),
            ConfigError::Invalid { name: "PORT", .. }
        ));

        let mut vars = REQUIRED.to_vec();
        vars.push(("STRIPE_TIMEOUT_SECS", "0"));
        assert!(matches!(
            load(&vars).unwrap_err(),
            ConfigError::Invalid {
                name: "STRIPE_TIMEOUT_SECS",
                ..
            }
        ));
    }

    #[test]
    fn test_ipv6_host() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("HOST", "::"));
        let config = load(&vars).unwrap();
        assert_eq!(config.bind_address, "[::]:3000".parse::<SocketAddr>().unwrap());
        assert!(config.bind_address.is_ipv6());
    }

    #[test]
    fn test_host_must_be_an_ip_address() {
        for host in ["not-an-ip", "localhost", "127.0.0.1:8080"] {
            let mut vars = REQUIRED.to_vec();
            vars.push(("HOST", host));
            let err = load(&vars).unwrap_err();
            assert!(
                matches!(&err, ConfigError::Invalid { name: "HOST", value, .. } if value == host),
                "{host}: {err:?}"
            );
        }
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", load(&REQUIRED).unwrap());
        assert!(!rendered.contains("whsec_test"));
        assert!(!rendered.contains("sk_test_123"));
    }
}
