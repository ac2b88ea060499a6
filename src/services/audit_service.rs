use mongodb::{bson::DateTime as BsonDateTime, Collection, Database};
use uuid::Uuid;

use crate::models::audit::AuditLogEntry;
use crate::models::purpose::OtpPurpose;
use crate::services::hash_engine::HashEngine;

/// Mask an email so the log stays readable but non-reversible:
/// `alice@example.com` -> `a***@example.com`.
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let first = local.chars().next().map(String::from).unwrap_or_default();
            format!("{}***@{}", first, domain)
        }
        None => "***".to_string(),
    }
}

/// Append-only forensic log. Writes are best-effort: a failed insert is a
/// warning, never an error surfaced to the caller.
#[derive(Clone)]
pub struct AuditService {
    collection: Collection<AuditLogEntry>,
    hash: HashEngine,
}

pub struct AuditEvent<'a> {
    pub event: &'a str,
    pub purpose: Option<OtpPurpose>,
    pub email: &'a str,
    pub uid: Option<&'a str>,
    pub ip: Option<&'a str>,
    pub outcome: &'a str,
    pub reason: Option<&'a str>,
}

impl AuditService {
    pub fn new(db: &Database, hash: HashEngine) -> Self {
        Self {
            collection: db.collection("audit_log"),
            hash,
        }
    }

    pub async fn log(&self, ev: AuditEvent<'_>) {
        let entry = AuditLogEntry {
            id: Uuid::new_v4().to_string(),
            event: ev.event.to_string(),
            purpose: ev.purpose.map(|p| p.tag().to_string()),
            email_masked: mask_email(ev.email),
            email_hash: self.hash.hash_identifier(ev.email),
            uid: ev.uid.map(String::from),
            ip_hash: ev.ip.map(|ip| self.hash.hash_identifier(ip)),
            outcome: ev.outcome.to_string(),
            reason: ev.reason.map(String::from),
            created_at: BsonDateTime::now(),
        };

        if let Err(e) = self.collection.insert_one(entry).await {
            tracing::warn!("audit log write failed for event {}: {}", ev.event, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masking_keeps_first_char_and_domain() {
        assert_eq!(mask_email("alice@example.com"), "a***@example.com");
        assert_eq!(mask_email("b@x.com"), "b***@x.com");
    }

    #[test]
    fn masking_never_panics_on_garbage() {
        assert_eq!(mask_email("@x.com"), "***@x.com");
        assert_eq!(mask_email("not-an-email"), "***");
        assert_eq!(mask_email(""), "***");
    }
}
