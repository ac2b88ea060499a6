use mongodb::bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::purpose::OtpPurpose;

pub const SESSION_TTL_SECONDS: i64 = 20 * 60;
pub const SESSION_TOKEN_BYTES: usize = 24;

/// A verified OTP exchanged for one sensitive mutation. Keyed by the hash of
/// the opaque bearer token; the raw token is returned to the client once and
/// never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpSession {
    #[serde(rename = "_id")]
    pub token_hash: String,
    pub purpose: OtpPurpose,
    pub email: String,
    /// Identity-store subject bound at issuance, when the flow already had
    /// an authenticated actor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// Free-form context captured at issuance (e.g. the new email requested
    /// in a CHANGE_EMAIL flow).
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub consumed: bool,
    pub expires_at: BsonDateTime,
    pub created_at: BsonDateTime,
}
