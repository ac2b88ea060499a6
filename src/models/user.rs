use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

/// Identity-store account document. This subsystem only touches the fields
/// its step-up flows mutate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub email_verified: bool,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

/// Bearer-token claims minted by the login service; this subsystem only
/// consumes them.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    pub exp: usize,
}
