//! Helper functions for performing the OIDC flow.

use crate::config::Config;
use crate::session::User;

use async_trait::async_trait;
use openidconnect::{
    core::{CoreAuthenticationFlow, CoreClient, CoreProviderMetadata},
    reqwest::async_http_client,
    url::Url,
    AuthorizationCode, ClientId, ClientSecret, CsrfToken, IssuerUrl, Nonce, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, Scope, TokenResponse,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{error, info};

/// How long a user has to complete a login at the identity provider.
pub const PENDING_LIFETIME: Duration = Duration::minutes(10);

/// Errors while setting up OIDC.
#[derive(Error, Clone, Debug)]
pub enum SetupError {
    #[error("invalid issuer url")]
    InvalidIssuer,
    #[error("invalid redirect url")]
    InvalidRedirect,
    #[error("error during OIDC discovery")]
    DiscoveryError,
}

/// Errors while completing a login.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum Error {
    #[error("state parameter does not match pending login")]
    StateMismatch,
    #[error("pending login expired")]
    Expired,
    #[error("failed to exchange authorization code")]
    ExchangeError,
    #[error("token response contained no ID token")]
    MissingIdToken,
    #[error("ID token failed verification")]
    InvalidIdToken,
}

/// The two halves of an authorization code login.
#[async_trait]
pub trait Authenticator: std::fmt::Debug + Send + Sync {
    /// Build the authorization url for a new login, along with the state
    /// that must be presented again at the callback.
    fn authorization_request(&self, redirect: &str) -> (Url, OidcState);

    /// Exchange an authorization code and verify the returned identity.
    async fn complete(&self, code: String, pending: &OidcState) -> Result<User, Error>;
}

/// The identity provider: an OIDC client configured from discovery.
#[derive(Clone, Debug)]
pub struct IdentityProvider {
    client: CoreClient,
    scopes: Vec<Scope>,
}

impl IdentityProvider {
    pub fn new(client: CoreClient, scopes: Vec<Scope>) -> Self {
        Self { client, scopes }
    }

    /// Discover the provider's endpoints and keys. The server must not
    /// accept connections until this has succeeded.
    pub async fn initialize(config: &Config) -> Result<Self, SetupError> {
        let issuer = config.issuer_url().map_err(|e| {
            error!("error reading issuer: {}", e);
            SetupError::InvalidIssuer
        })?;
        let issuer_url = IssuerUrl::new(issuer).map_err(|e| {
            error!("error setting up issuer url: {}", e);
            SetupError::InvalidIssuer
        })?;
        let redirect_url = RedirectUrl::new(config.redirect_url.clone()).map_err(|e| {
            error!("invalid redirect url: {}", e);
            SetupError::InvalidRedirect
        })?;

        let provider_metadata = CoreProviderMetadata::discover_async(issuer_url, async_http_client)
            .await
            .map_err(|e| {
                error!("failed OIDC discovery: {}", e);
                SetupError::DiscoveryError
            })?;

        info!(
            "discovered identity provider {}",
            provider_metadata.issuer().url()
        );

        let client = CoreClient::from_provider_metadata(
            provider_metadata,
            ClientId::new(config.client_id.clone()),
            Some(ClientSecret::new(config.client_secret.clone())),
        )
        .set_redirect_uri(redirect_url);

        let scopes = config
            .extra_scopes()
            .map(|scope| Scope::new(scope.to_string()))
            .collect();

        Ok(Self::new(client, scopes))
    }
}

#[async_trait]
impl Authenticator for IdentityProvider {
    fn authorization_request(&self, redirect: &str) -> (Url, OidcState) {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let request = self.client.authorize_url(
            CoreAuthenticationFlow::AuthorizationCode,
            CsrfToken::new_random,
            Nonce::new_random,
        );
        let (url, csrf, nonce) = self
            .scopes
            .iter()
            .cloned()
            .fold(request, |request, scope| request.add_scope(scope))
            .set_pkce_challenge(pkce_challenge)
            .url();

        let state = OidcState {
            csrf: csrf.secret().clone(),
            nonce: nonce.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
            redirect: redirect.to_string(),
            expires: OffsetDateTime::now_utc() + PENDING_LIFETIME,
        };

        (url, state)
    }

    async fn complete(&self, code: String, pending: &OidcState) -> Result<User, Error> {
        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(PkceCodeVerifier::new(pending.pkce_verifier.clone()))
            .request_async(async_http_client)
            .await
            .map_err(|e| {
                error!("error exchanging authorization code: {}", e);
                Error::ExchangeError
            })?;

        let id_token = response.id_token().ok_or_else(|| {
            error!("identity provider returned no ID token");
            Error::MissingIdToken
        })?;
        let claims = id_token
            .claims(&self.client.id_token_verifier(), &pending.get_nonce())
            .map_err(|e| {
                error!("error verifying ID token: {}", e);
                Error::InvalidIdToken
            })?;

        Ok(User {
            subject: claims.subject().as_str().to_string(),
            name: claims
                .name()
                .and_then(|name| name.get(None))
                .map(|name| name.as_str().to_string()),
            email: claims.email().map(|email| email.as_str().to_string()),
            preferred_username: claims
                .preferred_username()
                .map(|username| username.as_str().to_string()),
        })
    }
}

/// A login in progress, kept in the session between `/login` and the
/// callback.
#[derive(Deserialize, Serialize, Clone)]
pub struct OidcState {
    csrf: String,
    nonce: String,
    pkce_verifier: String,
    redirect: String,
    #[serde(with = "time::serde::rfc3339")]
    expires: OffsetDateTime,
}

impl OidcState {
    pub fn get_redirect(&self) -> &str {
        &self.redirect
    }

    pub fn get_nonce(&self) -> Nonce {
        Nonce::new(self.nonce.clone())
    }

    /// Check the `state` parameter returned by the provider against this
    /// login's CSRF token, and that the login has not gone stale.
    pub fn verify_state(&self, state: &str) -> Result<(), Error> {
        if !bool::from(self.csrf.as_bytes().ct_eq(state.as_bytes())) {
            return Err(Error::StateMismatch);
        }
        if self.expires <= OffsetDateTime::now_utc() {
            return Err(Error::Expired);
        }

        Ok(())
    }
}

impl std::fmt::Debug for OidcState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcState")
            .field("redirect", &self.redirect)
            .field("expires", &self.expires)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) fn test_provider() -> IdentityProvider {
    use openidconnect::{core::CoreJsonWebKeySet, AuthUrl, TokenUrl};

    let client = CoreClient::new(
        ClientId::new("postern".to_string()),
        Some(ClientSecret::new("client secret".to_string())),
        IssuerUrl::new("https://idp.example.com".to_string()).expect("issuer url"),
        AuthUrl::new("https://idp.example.com/authorize".to_string()).expect("auth url"),
        Some(TokenUrl::new("https://idp.example.com/token".to_string()).expect("token url")),
        None,
        CoreJsonWebKeySet::new(Vec::new()),
    )
    .set_redirect_uri(
        RedirectUrl::new("http://localhost:3000/authorization-code/callback".to_string())
            .expect("redirect url"),
    );

    IdentityProvider::new(client, vec![Scope::new("profile".to_string())])
}

/// Stands in for the identity provider's token endpoint: the code
/// `valid-code` logs in [`crate::session::test_user`], anything else fails
/// the exchange.
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct TestAuthenticator(pub IdentityProvider);

#[cfg(test)]
#[async_trait]
impl Authenticator for TestAuthenticator {
    fn authorization_request(&self, redirect: &str) -> (Url, OidcState) {
        self.0.authorization_request(redirect)
    }

    async fn complete(&self, code: String, _pending: &OidcState) -> Result<User, Error> {
        if code == "valid-code" {
            Ok(crate::session::test_user())
        } else {
            Err(Error::ExchangeError)
        }
    }
}
