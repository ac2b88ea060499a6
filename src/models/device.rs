use mongodb::bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};

pub const DEVICE_LOOKBACK_DAYS: i64 = 90;
pub const DEVICE_PRUNE_BATCH: i64 = 50;

/// One record per (account, device) pair, keyed by a hash of the two so the
/// raw device id never appears in storage. "New device" means exactly: no
/// record with this key existed before.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub uid: String,
    pub device_id_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_token_hash: Option<String>,
    pub first_seen_at: BsonDateTime,
    pub last_seen_at: BsonDateTime,
}
