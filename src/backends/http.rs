//! Shared HTTP plumbing for the remote backends.

use crate::core::DependencyError;

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// How a backend presents its credential.
pub(crate) enum Credential<'a> {
    None,
    Bearer(&'a SecretString),
    Header(&'static str, &'a SecretString),
}

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, DependencyError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DependencyError::NotConfigured {
            dependency: format!("http client: {}", e),
        })
}

fn apply_credential(
    request: reqwest::RequestBuilder,
    credential: Credential<'_>,
) -> reqwest::RequestBuilder {
    match credential {
        Credential::None => request,
        Credential::Bearer(token) => request.bearer_auth(token.expose_secret()),
        Credential::Header(name, value) => request.header(name, value.expose_secret()),
    }
}

fn transport_error(dependency: &str, timeout: Duration, err: reqwest::Error) -> DependencyError {
    if err.is_timeout() {
        DependencyError::timeout(dependency, timeout)
    } else {
        DependencyError::connection_failed(dependency, err.to_string())
    }
}

async fn read_json<R: DeserializeOwned>(
    dependency: &str,
    timeout: Duration,
    response: reqwest::Response,
) -> Result<R, DependencyError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message: String = body.chars().take(200).collect();
        return Err(DependencyError::status(dependency, status.as_u16(), message));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| transport_error(dependency, timeout, e))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| DependencyError::invalid_response(dependency, e.to_string()))
}

/// POSTs a JSON body and decodes a JSON response.
pub(crate) async fn post_json<B, R>(
    client: &reqwest::Client,
    dependency: &str,
    timeout: Duration,
    url: &str,
    credential: Credential<'_>,
    body: &B,
) -> Result<R, DependencyError>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let request = apply_credential(client.post(url).json(body), credential);
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(dependency, timeout, e))?;
    read_json(dependency, timeout, response).await
}

/// GETs a URL and checks for a success status.
pub(crate) async fn probe(
    client: &reqwest::Client,
    dependency: &str,
    timeout: Duration,
    url: &str,
    credential: Credential<'_>,
) -> Result<(), DependencyError> {
    let response = apply_credential(client.get(url), credential)
        .send()
        .await
        .map_err(|e| transport_error(dependency, timeout, e))?;

    if response.status().is_success() {
        Ok(())
    } else {
        Err(DependencyError::status(
            dependency,
            response.status().as_u16(),
            "health probe failed",
        ))
    }
}

pub(crate) fn trim_base(url: &str) -> &str {
    url.trim_end_matches('/')
}
