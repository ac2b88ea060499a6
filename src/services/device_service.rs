use chrono::{Duration, Utc};
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, DateTime as BsonDateTime},
    options::ReturnDocument,
    Collection, Database,
};

use crate::errors::Result;
use crate::models::device::{DeviceRecord, DEVICE_LOOKBACK_DAYS, DEVICE_PRUNE_BATCH};
use crate::services::hash_engine::HashEngine;

/// Device metadata reported by the client on login.
#[derive(Debug, Clone, Default)]
pub struct DeviceMeta {
    pub device_id: Option<String>,
    pub platform: Option<String>,
    pub model: Option<String>,
    pub app_version: Option<String>,
    pub locale: Option<String>,
    pub push_token: Option<String>,
}

/// Tracks which devices an account has signed in from. First-seen detection
/// is exactly "no prior record with this key existed".
#[derive(Clone)]
pub struct DeviceService {
    collection: Collection<DeviceRecord>,
    hash: HashEngine,
}

impl DeviceService {
    pub fn new(db: &Database, hash: HashEngine) -> Self {
        Self {
            collection: db.collection("login_devices"),
            hash,
        }
    }

    /// Upsert the record for this (account, device) pair and report whether
    /// the device was seen for the first time. The upsert and the pre-image
    /// read are one operation, so two concurrent logins from a brand-new
    /// device produce a single "new device" verdict.
    pub async fn record_login(
        &self,
        uid: &str,
        meta: &DeviceMeta,
        ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<bool> {
        // Stable per-device identity: client-supplied id, or a fingerprint
        // of what the network layer saw when the client sends none
        let device_id = match &meta.device_id {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => format!(
                "fp:{}|{}|{}|{}",
                user_agent.unwrap_or(""),
                ip.unwrap_or(""),
                meta.platform.as_deref().unwrap_or(""),
                meta.model.as_deref().unwrap_or(""),
            ),
        };

        let key = self.hash.device_key(uid, &device_id);
        let now = BsonDateTime::now();

        let mut set = doc! { "last_seen_at": now };
        if let Some(ip) = ip {
            set.insert("ip_hash", self.hash.hash_identifier(ip));
        }
        if let Some(ua) = user_agent {
            set.insert("user_agent", ua);
        }
        if let Some(platform) = &meta.platform {
            set.insert("platform", platform);
        }
        if let Some(model) = &meta.model {
            set.insert("model", model);
        }
        if let Some(version) = &meta.app_version {
            set.insert("app_version", version);
        }
        if let Some(locale) = &meta.locale {
            set.insert("locale", locale);
        }
        if let Some(push_token) = &meta.push_token {
            set.insert("push_token_hash", self.hash.hash_identifier(push_token));
        }

        let update = doc! {
            "$set": set,
            "$setOnInsert": {
                "uid": uid,
                "device_id_hash": self.hash.hash_identifier(&device_id),
                "first_seen_at": now,
            },
        };

        let previous = self
            .collection
            .find_one_and_update(doc! { "_id": &key }, update)
            .upsert(true)
            .return_document(ReturnDocument::Before)
            .await?;

        Ok(previous.is_none())
    }

    /// Drop records not seen for 90 days, at most one small batch per call.
    /// Best-effort: callers log failures and move on.
    pub async fn prune_stale(&self) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(DEVICE_LOOKBACK_DAYS);
        let filter = doc! {
            "last_seen_at": { "$lt": BsonDateTime::from_millis(cutoff.timestamp_millis()) }
        };

        let mut cursor = self
            .collection
            .find(filter)
            .limit(DEVICE_PRUNE_BATCH)
            .await?;

        let mut stale_ids = Vec::new();
        while let Some(record) = cursor.try_next().await? {
            stale_ids.push(record.id);
        }
        if stale_ids.is_empty() {
            return Ok(0);
        }

        let result = self
            .collection
            .delete_many(doc! { "_id": { "$in": stale_ids } })
            .await?;
        Ok(result.deleted_count)
    }
}
