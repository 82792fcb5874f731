//! Session management against the account backend.
//!
//! Owns the HTTP client, the per-process instance id, and the session token.
//! Authenticated calls carry the token both as a `JSESSIONID` cookie and a
//! `sid` header, the way the mobile app does. The token is only ever mutated
//! here: stored on successful authentication, cleared before re-login.

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use reqwest::header;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Authentication state and REST plumbing for one cloud account.
pub struct SessionManager {
    http: reqwest::Client,
    ucenter_base: String,
    life2_base: String,
    instance_id: String,
    username: String,
    password: String,
    token: Mutex<Option<String>>,
}

#[derive(Serialize)]
struct AuthRequest<'a> {
    uuid: &'a str,
    user: &'a str,
    pwd: &'a str,
    #[serde(rename = "osType")]
    os_type: &'a str,
    #[serde(rename = "productCode")]
    product_code: &'a str,
    #[serde(rename = "appCode")]
    app_code: &'a str,
}

#[derive(Deserialize)]
struct AuthResponse {
    #[serde(rename = "jsessionId", default)]
    jsession_id: Option<String>,
}

#[derive(Serialize)]
struct ProbeRequest<'a> {
    uuid: &'a str,
    // The probe endpoint wants snake_case here, unlike the auth endpoint.
    os_type: &'a str,
    #[serde(rename = "appCode")]
    app_code: &'a str,
}

#[derive(Deserialize)]
struct ProbeResponse {
    #[serde(default)]
    info: Option<String>,
}

impl SessionManager {
    pub fn new(config: &BridgeConfig) -> BridgeResult<Self> {
        let password = config.account.resolve_password()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.rest.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            ucenter_base: config.rest.ucenter_base.trim_end_matches('/').to_string(),
            life2_base: config.rest.life2_base.trim_end_matches('/').to_string(),
            instance_id: new_instance_id(),
            username: config.account.username.clone(),
            password,
            token: Mutex::new(None),
        })
    }

    /// Stable per-process client instance identifier.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub(crate) fn life2_base(&self) -> &str {
        &self.life2_base
    }

    /// Current session token, if any.
    pub fn token(&self) -> Option<String> {
        lock(&self.token).clone()
    }

    /// Drop the session token; the next login must re-authenticate.
    pub fn clear_token(&self) {
        *lock(&self.token) = None;
    }

    /// Authenticate with the stored credentials and keep the issued token.
    ///
    /// Success requires an HTTP success status and a non-empty token in the
    /// response; anything else fails without touching other state.
    pub async fn authenticate(&self) -> BridgeResult<()> {
        let url = format!("{}/user/app/customer/v2/AuthenCross.json", self.ucenter_base);
        let body = AuthRequest {
            uuid: &self.instance_id,
            user: &self.username,
            pwd: &self.password,
            os_type: "android",
            product_code: "life",
            app_code: "life",
        };

        let response = self.http.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(BridgeError::auth(format!(
                "login rejected with status {}",
                response.status()
            )));
        }

        let data: AuthResponse = response
            .json()
            .await
            .map_err(|err| BridgeError::protocol(format!("invalid login response: {err}")))?;

        match data.jsession_id.filter(|token| !token.is_empty()) {
            Some(token) => {
                debug!(instance_id = %self.instance_id, "session established");
                *lock(&self.token) = Some(token);
                Ok(())
            }
            None => Err(BridgeError::auth("login response carried no session token")),
        }
    }

    /// Ask the backend whether the current session is still live.
    ///
    /// Anything short of an HTTP success with `info == "OK"` counts as
    /// expired: transport errors, malformed payloads, and explicit
    /// not-OK statuses all force re-authentication.
    pub async fn probe_alive(&self) -> bool {
        if self.token().is_none() {
            return false;
        }

        let url = format!(
            "{}/user/app/customer/isSessionTimeout.json",
            self.ucenter_base
        );
        let body = ProbeRequest {
            uuid: &self.instance_id,
            os_type: "android",
            app_code: "life",
        };

        match self.post_session_json::<_, ProbeResponse>(&url, &body).await {
            Ok(response) => response.info.as_deref() == Some("OK"),
            Err(err) => {
                debug!(error = %err, "session probe failed");
                false
            }
        }
    }

    /// POST a JSON body with session headers attached, expecting a JSON
    /// response.
    pub(crate) async fn post_session_json<B, T>(&self, url: &str, body: &B) -> BridgeResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self.http.post(url).json(body);
        if let Some(token) = self.token() {
            request = request
                .header(header::COOKIE, format!("JSESSIONID={token}"))
                .header("sid", token)
                .header("X-Requested-With", "com.sengled.life2");
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(BridgeError::transport(format!(
                "{url} returned status {}",
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|err| BridgeError::protocol(format!("invalid response from {url}: {err}")))
    }

    #[cfg(test)]
    pub(crate) fn set_token_for_tests(&self, token: &str) {
        *lock(&self.token) = Some(token.to_string());
    }
}

/// Half of a v4 UUID, matching the id format the mobile app registers.
fn new_instance_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    hex[..16].to_string()
}
