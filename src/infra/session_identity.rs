use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::app::ports::IdentityPort;
use crate::domain::OwnerId;
use crate::error::{QuickpitchError, Result};

#[derive(Debug, Deserialize)]
struct SessionResponse {
    user: Option<SessionUser>,
}

#[derive(Debug, Deserialize)]
struct SessionUser {
    id: String,
}

/// Resolves the caller by asking the auth service's session endpoint,
/// forwarding the request's cookie and authorization headers.
pub struct SessionEndpointIdentity {
    client: reqwest::Client,
    session_url: String,
}

impl SessionEndpointIdentity {
    pub fn new(session_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            session_url: session_url.into(),
        })
    }
}

fn owner_from_body(body: &str) -> Option<OwnerId> {
    // The endpoint answers `null` when there is no session
    let session: Option<SessionResponse> = serde_json::from_str(body).ok()?;
    session?
        .user
        .map(|u| u.id)
        .filter(|id| !id.trim().is_empty())
        .map(OwnerId::new)
}

#[async_trait]
impl IdentityPort for SessionEndpointIdentity {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<OwnerId>> {
        let cookie = headers.get(header::COOKIE);
        let authorization = headers.get(header::AUTHORIZATION);
        if cookie.is_none() && authorization.is_none() {
            return Ok(None);
        }

        let mut request = self.client.get(&self.session_url);
        if let Some(value) = cookie {
            request = request.header(header::COOKIE, value.clone());
        }
        if let Some(value) = authorization {
            request = request.header(header::AUTHORIZATION, value.clone());
        }

        let resp = request
            .send()
            .await
            .map_err(|e| QuickpitchError::Identity {
                message: format!("session endpoint unreachable: {e}"),
            })?;
        let status = resp.status();
        if !status.is_success() {
            debug!("Session endpoint answered {}", status);
            return Ok(None);
        }
        let body = resp.text().await?;
        Ok(owner_from_body(&body))
    }
}
