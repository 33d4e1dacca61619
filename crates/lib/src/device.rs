//! Device selection: the device id comes from the hosting page's `deviceId` query parameter.

use crate::connector::DeviceId;

const DEVICE_ID_PARAM: &str = "deviceId";

/// Extract the device id from a page URL (first non-empty `deviceId` query value). None if absent or unparsable.
pub fn device_id_from_url(page_url: &str) -> Option<DeviceId> {
    let url = reqwest::Url::parse(page_url.trim()).ok()?;
    url.query_pairs()
        .filter(|(k, _)| k == DEVICE_ID_PARAM)
        .map(|(_, v)| v.trim().to_string())
        .find(|v| !v.is_empty())
}
