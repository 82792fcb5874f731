//! Device directory fetch.

use crate::api::session::SessionManager;
use crate::device::attributes::Attribute;
use crate::error::BridgeResult;
use serde::{Deserialize, Serialize};

/// One directory entry as returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceRecord {
    #[serde(rename = "deviceUuid")]
    pub device_uuid: String,
    #[serde(default)]
    pub category: String,
    #[serde(rename = "typeCode", default)]
    pub type_code: String,
    #[serde(rename = "attributeList", default)]
    pub attribute_list: Vec<Attribute>,
}

#[derive(Deserialize)]
struct DeviceListResponse {
    #[serde(rename = "deviceList", default)]
    device_list: Vec<DeviceRecord>,
}

/// Fetch the account's device list. An absent or empty list is returned as
/// an empty vector; the caller decides what to do with its cache.
pub async fn fetch_device_list(session: &SessionManager) -> BridgeResult<Vec<DeviceRecord>> {
    let url = format!("{}/life2/device/list.json", session.life2_base());
    let response: DeviceListResponse = session
        .post_session_json(&url, &serde_json::json!({}))
        .await?;
    Ok(response.device_list)
}
