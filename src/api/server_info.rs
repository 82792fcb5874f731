//! Realtime endpoint discovery.
//!
//! The REST backend advertises the MQTT broker as an "inception address"
//! URI. Resolution runs once per successful login; any failure here is
//! non-fatal and the caller keeps the last known-good endpoint.

use crate::api::session::SessionManager;
use crate::error::{BridgeError, BridgeResult};
use crate::transport::mqtt::BrokerEndpoint;
use serde::Deserialize;

#[derive(Deserialize)]
struct ServerInfoResponse {
    #[serde(rename = "inceptionAddr", default)]
    inception_addr: Option<String>,
}

/// Ask the backend for the realtime broker endpoint.
pub async fn resolve_endpoint(session: &SessionManager) -> BridgeResult<BrokerEndpoint> {
    if session.token().is_none() {
        return Err(BridgeError::auth("endpoint discovery requires a session"));
    }

    let url = format!("{}/life2/server/getServerInfo.json", session.life2_base());
    let response: ServerInfoResponse = session
        .post_session_json(&url, &serde_json::json!({}))
        .await?;

    let addr = response
        .inception_addr
        .filter(|addr| !addr.is_empty())
        .ok_or_else(|| BridgeError::protocol("server info carried no inception address"))?;

    BrokerEndpoint::parse_inception_addr(&addr)
}
