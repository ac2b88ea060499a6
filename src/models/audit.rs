use mongodb::bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};

/// Append-only forensic record. Emails are masked and correlation fields
/// hashed, so the log is useless to an attacker who dumps it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    pub email_masked: String,
    pub email_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_hash: Option<String>,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub created_at: BsonDateTime,
}
