use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

const DEFAULT_ADDR: IpAddr = IpAddr::V6(Ipv6Addr::LOCALHOST);
const DEFAULT_PORT: u16 = 3000;

const DEFAULT_COOKIE_NAME: &str = "_postern_session";
const DEFAULT_SESSION_TTL: u64 = 8 * 60 * 60;

const DEFAULT_SCOPES: &str = "openid profile";
const DEFAULT_LOGIN_REDIRECT: &str = "/admin";

const DEFAULT_DATABASE_URL: &str = "sqlite://db.sqlite?mode=rwc";
const DEFAULT_PUBLIC_DIR: &str = "public";

/// Errors loading the configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read environment: {0}")]
    Env(#[from] envy::Error),
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("one of ISSUER or OKTA_ORG_URL must be set")]
    MissingIssuer,
}

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    #[serde(default = "default_addr")]
    pub ip: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(alias = "random_secret_word")]
    pub session_secret: String,
    /// Session lifetime in seconds.
    #[serde(default = "default_session_ttl")]
    pub session_ttl: u64,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default = "default_cookie_secure")]
    pub cookie_secure: bool,

    pub issuer: Option<String>,
    /// Okta organization url, used to build the issuer when `issuer` is unset.
    pub okta_org_url: Option<String>,
    #[serde(alias = "okta_client_id")]
    pub client_id: String,
    #[serde(alias = "okta_client_secret")]
    pub client_secret: String,
    #[serde(alias = "redirect_uri")]
    pub redirect_url: String,
    #[serde(default = "default_scopes")]
    pub scopes: String,
    #[serde(default = "default_login_redirect")]
    pub login_redirect: String,

    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn try_env() -> Result<Self, ConfigError> {
        Self::try_from_iter(std::env::vars())
    }

    /// Read the configuration from an iterator of environment variables.
    pub fn try_from_iter<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Self = envy::from_iter(vars)?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("SESSION_SECRET", &self.session_secret),
            ("CLIENT_ID", &self.client_id),
            ("CLIENT_SECRET", &self.client_secret),
            ("REDIRECT_URL", &self.redirect_url),
        ];
        if let Some((name, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(ConfigError::Empty(*name));
        }

        self.issuer_url().map(|_| ())
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    /// The OpenID issuer, either given directly or derived from the Okta
    /// organization's default authorization server.
    pub fn issuer_url(&self) -> Result<String, ConfigError> {
        match (&self.issuer, &self.okta_org_url) {
            (Some(issuer), _) if !issuer.trim().is_empty() => Ok(issuer.clone()),
            (_, Some(org)) if !org.trim().is_empty() => {
                Ok(format!("{}/oauth2/default", org.trim_end_matches('/')))
            }
            _ => Err(ConfigError::MissingIssuer),
        }
    }

    /// Extra scopes to request besides `openid`, which is always requested.
    pub fn extra_scopes(&self) -> impl Iterator<Item = &str> {
        self.scopes
            .split([' ', ','])
            .filter(|scope| !scope.is_empty() && *scope != "openid")
    }
}

const fn default_addr() -> IpAddr {
    DEFAULT_ADDR
}

const fn default_port() -> u16 {
    DEFAULT_PORT
}

const fn default_session_ttl() -> u64 {
    DEFAULT_SESSION_TTL
}

fn default_cookie_name() -> String {
    DEFAULT_COOKIE_NAME.to_string()
}

const fn default_cookie_secure() -> bool {
    true
}

fn default_scopes() -> String {
    DEFAULT_SCOPES.to_string()
}

fn default_login_redirect() -> String {
    DEFAULT_LOGIN_REDIRECT.to_string()
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_public_dir() -> PathBuf {
    PathBuf::from(DEFAULT_PUBLIC_DIR)
}
