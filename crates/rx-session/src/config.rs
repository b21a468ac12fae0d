//! Configuration: the constructor object (`api_key`/`secret`) and
//! `init(staging, opts)` options. Forward compatibility for added options is
//! modeled with `#[non_exhaustive]` on `InitOpts` — adding a field later
//! isn't a breaking change for callers who build it with
//! `InitOpts { debug: true, ..Default::default() }`.

use rx_adapters::Endpoints;
use rx_domain::RtError;

/// Required, non-empty credential pair; feeds straight into the
/// credential materializer.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub secret: String,
}

impl Config {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Result<Self, RtError> {
        let api_key = api_key.into();
        let secret = secret.into();

        if api_key.is_empty() {
            return Err(RtError::config("api_key must not be empty"));
        }
        if secret.is_empty() {
            return Err(RtError::config("secret must not be empty"));
        }

        Ok(Config { api_key, secret })
    }

    /// `RELAYX_API_KEY` / `RELAYX_SECRET`.
    pub fn from_env() -> Result<Self, RtError> {
        let api_key = std::env::var("RELAYX_API_KEY")
            .map_err(|_| RtError::config("RELAYX_API_KEY is not set"))?;
        let secret = std::env::var("RELAYX_SECRET")
            .map_err(|_| RtError::config("RELAYX_SECRET is not set"))?;
        Config::new(api_key, secret)
    }
}

/// `init(staging, opts)` options.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct InitOpts {
    pub staging: bool,
    pub debug: bool,
    /// Upper bound on internal stream/consumer create-or-update retries.
    /// Defaults to 5.
    pub max_retries: u32,
}

impl Default for InitOpts {
    fn default() -> Self {
        InitOpts { staging: false, debug: false, max_retries: 5 }
    }
}

impl InitOpts {
    /// `RELAYX_STAGING` / `RELAYX_DEBUG` / `RELAYX_MAX_RETRIES`.
    pub fn from_env() -> Self {
        let mut opts = InitOpts::default();

        if let Ok(v) = std::env::var("RELAYX_STAGING") {
            opts.staging = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var("RELAYX_DEBUG") {
            opts.debug = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var("RELAYX_MAX_RETRIES") {
            if let Ok(n) = v.parse() {
                opts.max_retries = n;
            }
        }

        opts
    }

    pub fn endpoints(&self) -> Endpoints {
        if self.staging {
            Endpoints::Staging
        } else {
            Endpoints::Production
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_credentials() {
        assert!(Config::new("", "secret").is_err());
        assert!(Config::new("key", "").is_err());
        assert!(Config::new("key", "secret").is_ok());
    }

    #[test]
    fn default_max_retries_is_five() {
        assert_eq!(InitOpts::default().max_retries, 5);
    }
}
