//! Token exchange and the authenticated storage session.

use crate::error::{FetchError, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{Client, Response};
use serde::Deserialize;
use std::env;
use url::Url;

const CLIENT_ID: &str = "cdse-public";

pub const USERNAME_VAR: &str = "COPERNICUS_USERNAME";
pub const PASSWORD_VAR: &str = "COPERNICUS_PASSWORD";

#[derive(Debug, Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Credentials {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn from_env() -> Result<Credentials> {
        let username = env::var(USERNAME_VAR)
            .map_err(|_| FetchError::Input(format!("{USERNAME_VAR} is not set")))?;
        let password = env::var(PASSWORD_VAR)
            .map_err(|_| FetchError::Input(format!("{PASSWORD_VAR} is not set")))?;
        Ok(Credentials { username, password })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Exchanges credentials for an access token with the password grant.
pub async fn request_token(token_url: &Url, credentials: &Credentials) -> Result<String> {
    let params = [
        ("client_id", CLIENT_ID),
        ("username", credentials.username.as_str()),
        ("password", credentials.password.as_str()),
        ("grant_type", "password"),
    ];
    let response = Client::new()
        .post(token_url.clone())
        .form(&params)
        .send()
        .await
        .map_err(|e| FetchError::AuthenticationFailed { reason: e.to_string() })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(FetchError::AuthenticationFailed {
            reason: format!("token endpoint answered {status}: {body}"),
        });
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| FetchError::AuthenticationFailed { reason: e.to_string() })?;
    token
        .access_token
        .ok_or_else(|| FetchError::AuthenticationFailed {
            reason: "token response carries no access_token".to_string(),
        })
}

/// An authenticated client for the storage endpoint. The storage service
/// answers with a redirect to a signed location; the client does not follow
/// it automatically because the bearer header must be re-sent by hand.
pub struct Session {
    client: Client,
}

impl Session {
    pub async fn acquire(token_url: &Url, credentials: &Credentials) -> Result<Session> {
        let token = request_token(token_url, credentials).await?;
        Session::with_token(&token)
    }

    fn with_token(token: &str) -> Result<Session> {
        let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
            FetchError::AuthenticationFailed {
                reason: "token is not usable as a header value".to_string(),
            }
        })?;
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        let client = Client::builder()
            .redirect(Policy::none())
            .default_headers(headers)
            .build()?;
        Ok(Session { client })
    }

    /// Issues a GET, re-issuing it at most once against a redirect target.
    pub async fn get(&self, url: &str) -> Result<Response> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_redirection() {
            return Ok(response);
        }
        let target = redirect_target(&response, url)?;
        Ok(self.client.get(target).send().await?)
    }
}

fn redirect_target(response: &Response, url: &str) -> Result<Url> {
    let status = response.status().as_u16();
    let unusable = || FetchError::HttpStatus {
        status,
        url: url.to_string(),
    };
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(unusable)?;
    let base = Url::parse(url).map_err(|_| unusable())?;
    base.join(location).map_err(|_| unusable())
}
