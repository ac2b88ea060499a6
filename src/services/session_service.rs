use chrono::Utc;
use mongodb::{
    bson::{doc, DateTime as BsonDateTime},
    Collection, Database,
};
use std::collections::HashMap;

use crate::errors::{AppError, Result};
use crate::models::otp_session::{OtpSession, SESSION_TTL_SECONDS};
use crate::models::purpose::OtpPurpose;
use crate::services::hash_engine::HashEngine;

/// Issues and consumes the single-use verification tokens produced by a
/// successful OTP check. A token converts the short human-typed code into a
/// high-entropy credential good for exactly one sensitive mutation.
#[derive(Clone)]
pub struct SessionService {
    collection: Collection<OtpSession>,
    hash: HashEngine,
}

impl SessionService {
    pub fn new(db: &Database, hash: HashEngine) -> Self {
        Self {
            collection: db.collection("otp_sessions"),
            hash,
        }
    }

    /// Mint a session bound to (purpose, email, uid). Returns the raw token
    /// and its TTL in seconds; only the token's hash is stored.
    pub async fn issue(
        &self,
        purpose: OtpPurpose,
        email: &str,
        uid: Option<String>,
        metadata: HashMap<String, String>,
    ) -> Result<(String, i64)> {
        let token = HashEngine::generate_session_token();
        let now = Utc::now().timestamp_millis();

        let session = OtpSession {
            token_hash: self.hash.hash_token(&token),
            purpose,
            email: email.to_string(),
            uid,
            metadata,
            consumed: false,
            expires_at: BsonDateTime::from_millis(now + SESSION_TTL_SECONDS * 1000),
            created_at: BsonDateTime::from_millis(now),
        };

        self.collection.insert_one(&session).await?;
        Ok((token, SESSION_TTL_SECONDS))
    }

    /// Atomically consume a presented token. The filter carries the full
    /// binding (hash, purpose, email, uid, unconsumed, unexpired) and flips
    /// `consumed` in the same operation, so two concurrent consumers cannot
    /// both succeed. The follow-up read only classifies the failure.
    pub async fn consume(
        &self,
        token: &str,
        purpose: OtpPurpose,
        email: Option<&str>,
        uid: Option<&str>,
    ) -> Result<OtpSession> {
        let token_hash = self.hash.hash_token(token);
        let now = Utc::now();
        let now_bson = BsonDateTime::from_millis(now.timestamp_millis());

        let mut filter = doc! {
            "_id": &token_hash,
            "purpose": purpose.tag(),
            "consumed": false,
            "expires_at": { "$gt": now_bson },
        };
        if let Some(email) = email {
            filter.insert("email", email);
        }
        match uid {
            Some(uid) => filter.insert("uid", uid),
            None => filter.insert("uid", doc! { "$exists": false }),
        };

        let consumed = self
            .collection
            .find_one_and_update(filter, doc! { "$set": { "consumed": true } })
            .await?;

        if let Some(session) = consumed {
            return Ok(session);
        }

        // Nothing matched; figure out why, without mutating anything
        let existing = self.collection.find_one(doc! { "_id": &token_hash }).await?;
        Err(classify_consume_failure(
            existing.as_ref(),
            purpose,
            email,
            uid,
            now,
        ))
    }
}

/// Why a presented token failed the atomic consume pass. Precedence:
/// unknown and binding mismatches are permission-denied (a mismatched
/// token reveals nothing about its real binding), a spent token is
/// permission-denied, and only a token that matched in every other way
/// reports deadline-exceeded on expiry.
fn classify_consume_failure(
    session: Option<&OtpSession>,
    purpose: OtpPurpose,
    email: Option<&str>,
    uid: Option<&str>,
    now: chrono::DateTime<Utc>,
) -> AppError {
    let Some(session) = session else {
        return AppError::denied("Unknown verification token");
    };

    if session.purpose != purpose
        || email.is_some_and(|e| session.email != e)
        || session.uid.as_deref() != uid
    {
        return AppError::denied("Verification token binding mismatch");
    }
    if session.consumed {
        return AppError::denied("Verification token already used");
    }
    if session.expires_at.timestamp_millis() <= now.timestamp_millis() {
        return AppError::expired("Verification token expired");
    }

    // Matched on re-read but not in the atomic pass: a concurrent
    // consumer won the race between our two reads
    AppError::denied("Verification token already used")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration};

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn session(now: DateTime<Utc>) -> OtpSession {
        OtpSession {
            token_hash: "hash".to_string(),
            purpose: OtpPurpose::ResetPassword,
            email: "a@x.com".to_string(),
            uid: None,
            metadata: HashMap::new(),
            consumed: false,
            expires_at: BsonDateTime::from_millis(
                (now + Duration::seconds(SESSION_TTL_SECONDS)).timestamp_millis(),
            ),
            created_at: BsonDateTime::from_millis(now.timestamp_millis()),
        }
    }

    fn is_denied(err: &AppError) -> bool {
        matches!(err, AppError::PermissionDenied(_))
    }

    #[test]
    fn unknown_token_is_permission_denied() {
        let err =
            classify_consume_failure(None, OtpPurpose::ResetPassword, Some("a@x.com"), None, t0());
        assert!(is_denied(&err), "{:?}", err);
    }

    #[test]
    fn spent_token_is_permission_denied() {
        let now = t0();
        let mut s = session(now);
        s.consumed = true;
        let err = classify_consume_failure(
            Some(&s),
            OtpPurpose::ResetPassword,
            Some("a@x.com"),
            None,
            now + Duration::seconds(30),
        );
        assert!(is_denied(&err), "{:?}", err);
    }

    #[test]
    fn expired_token_is_deadline_exceeded_even_when_never_consumed() {
        let now = t0();
        let s = session(now);
        let late = now + Duration::seconds(SESSION_TTL_SECONDS);
        let err =
            classify_consume_failure(Some(&s), OtpPurpose::ResetPassword, Some("a@x.com"), None, late);
        assert!(matches!(err, AppError::DeadlineExceeded(_)), "{:?}", err);
    }

    #[test]
    fn wrong_purpose_or_email_is_a_binding_mismatch() {
        let now = t0();
        let s = session(now);
        let at = now + Duration::seconds(30);

        let err =
            classify_consume_failure(Some(&s), OtpPurpose::SignupVerify, Some("a@x.com"), None, at);
        assert!(is_denied(&err), "{:?}", err);

        // Token issued for a@x.com presented against another address
        let err = classify_consume_failure(
            Some(&s),
            OtpPurpose::ResetPassword,
            Some("old@x.com"),
            None,
            at,
        );
        assert!(is_denied(&err), "{:?}", err);
    }

    #[test]
    fn uid_binding_must_match_exactly() {
        let now = t0();
        let at = now + Duration::seconds(30);

        let mut s = session(now);
        s.uid = Some("uid-1".to_string());

        // Bound to a caller, presented without one (and vice versa)
        let err =
            classify_consume_failure(Some(&s), OtpPurpose::ResetPassword, Some("a@x.com"), None, at);
        assert!(is_denied(&err), "{:?}", err);

        let anonymous = session(now);
        let err = classify_consume_failure(
            Some(&anonymous),
            OtpPurpose::ResetPassword,
            Some("a@x.com"),
            Some("uid-1"),
            at,
        );
        assert!(is_denied(&err), "{:?}", err);
    }

    #[test]
    fn mismatch_takes_precedence_over_expiry() {
        // A stale token for someone else must not leak that it expired
        let now = t0();
        let s = session(now);
        let late = now + Duration::seconds(SESSION_TTL_SECONDS + 60);
        let err = classify_consume_failure(
            Some(&s),
            OtpPurpose::ResetPassword,
            Some("other@x.com"),
            None,
            late,
        );
        assert!(is_denied(&err), "{:?}", err);
    }
}
