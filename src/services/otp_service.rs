use chrono::Utc;
use mongodb::{bson::doc, Collection, Database};

use crate::errors::{AppError, Result};
use crate::models::otp_request::{OtpRequest, RateVerdict, VerifyOutcome};
use crate::models::purpose::OtpPurpose;
use crate::services::hash_engine::HashEngine;

/// Bounded optimistic retries; contention on a single (email, purpose) pair
/// is rare and short-lived.
const CAS_MAX_RETRIES: usize = 4;

#[derive(Debug)]
pub struct IssuedCode {
    pub cooldown_seconds: i64,
    /// Present only when a fresh code was generated this call. The caller
    /// delivers it; it is never stored in plaintext.
    pub code: Option<String>,
}

#[derive(Debug, Clone)]
pub enum OtpVerification {
    Verified,
    Failed {
        reason: &'static str,
        attempts_left: Option<i32>,
        retry_after_seconds: Option<i64>,
    },
}

/// OTP issuance and verification over the per-(email,purpose) record.
/// Every read-decide-write runs as a compare-and-swap on the record's
/// revision so concurrent callers for the same pair serialize; callers on
/// different pairs never contend.
#[derive(Clone)]
pub struct OtpService {
    collection: Collection<OtpRequest>,
    hash: HashEngine,
}

impl OtpService {
    pub fn new(db: &Database, hash: HashEngine) -> Self {
        Self {
            collection: db.collection("otp_requests"),
            hash,
        }
    }

    /// Rate-limit gate + code generation (60s cooldown, 8/hour window,
    /// 15min lockout). A cooldown hit is a success-shaped no-op; a lockout
    /// is an error carrying the remaining seconds.
    pub async fn request_code(&self, email: &str, purpose: OtpPurpose) -> Result<IssuedCode> {
        let id = self.hash.request_key(purpose, email);
        let email_hash = self.hash.hash_identifier(email);

        for _ in 0..CAS_MAX_RETRIES {
            let now = Utc::now();
            match self.collection.find_one(doc! { "_id": &id }).await? {
                Some(mut rec) => {
                    let expected = rec.revision;
                    let lock_before = rec.locked_until;
                    match rec.gate_send(now) {
                        RateVerdict::Locked { seconds_left } => {
                            // A lockout triggered by this very call must stick
                            if rec.locked_until != lock_before
                                && !self.persist(&rec, expected).await?
                            {
                                continue;
                            }
                            return Err(AppError::exhausted(
                                "Too many code requests, try again later",
                                seconds_left,
                            ));
                        }
                        RateVerdict::Cooldown { seconds_left } => {
                            // No new code, no email, no write
                            return Ok(IssuedCode {
                                cooldown_seconds: seconds_left,
                                code: None,
                            });
                        }
                        RateVerdict::Send => {
                            let code = HashEngine::generate_code();
                            let salt = HashEngine::generate_salt();
                            rec.arm(self.hash.hash_code(&code, &salt), salt, now);
                            if self.persist(&rec, expected).await? {
                                return Ok(IssuedCode {
                                    cooldown_seconds: 0,
                                    code: Some(code),
                                });
                            }
                        }
                    }
                }
                None => {
                    let mut rec = OtpRequest::new(id.clone(), purpose, email_hash.clone(), now);
                    let verdict = rec.gate_send(now);
                    debug_assert_eq!(verdict, RateVerdict::Send);
                    let code = HashEngine::generate_code();
                    let salt = HashEngine::generate_salt();
                    rec.arm(self.hash.hash_code(&code, &salt), salt, now);
                    rec.revision = 1;
                    match self.collection.insert_one(&rec).await {
                        Ok(_) => {
                            return Ok(IssuedCode {
                                cooldown_seconds: 0,
                                code: Some(code),
                            })
                        }
                        // Concurrent first request for the same pair won
                        Err(e) if is_duplicate_key(&e) => continue,
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }

        Err(AppError::internal("Write contention on OTP record"))
    }

    /// One verification attempt. The submitted code's shape is validated by
    /// the caller before storage is touched.
    pub async fn verify_code(
        &self,
        email: &str,
        purpose: OtpPurpose,
        code: &str,
    ) -> Result<OtpVerification> {
        let id = self.hash.request_key(purpose, email);

        for _ in 0..CAS_MAX_RETRIES {
            let now = Utc::now();
            let Some(mut rec) = self.collection.find_one(doc! { "_id": &id }).await? else {
                return Ok(OtpVerification::Failed {
                    reason: "not_found",
                    attempts_left: None,
                    retry_after_seconds: None,
                });
            };

            let expected = rec.revision;
            let code_matches = self.hash.hash_code(code, &rec.salt) == rec.code_hash;
            let outcome = rec.apply_verify(code_matches, now);

            let mutated = matches!(
                outcome,
                VerifyOutcome::Verified
                    | VerifyOutcome::MaxAttempts { .. }
                    | VerifyOutcome::InvalidCode { .. }
            );
            if mutated && !self.persist(&rec, expected).await? {
                continue;
            }

            return Ok(match outcome {
                VerifyOutcome::Verified => OtpVerification::Verified,
                VerifyOutcome::AlreadyUsed => OtpVerification::Failed {
                    reason: "used",
                    attempts_left: None,
                    retry_after_seconds: None,
                },
                VerifyOutcome::Locked { seconds_left } => OtpVerification::Failed {
                    reason: "locked",
                    attempts_left: None,
                    retry_after_seconds: Some(seconds_left),
                },
                VerifyOutcome::Expired => OtpVerification::Failed {
                    reason: "expired",
                    attempts_left: None,
                    retry_after_seconds: None,
                },
                VerifyOutcome::MaxAttempts { seconds_left } => OtpVerification::Failed {
                    reason: "max_attempts",
                    attempts_left: Some(0),
                    retry_after_seconds: Some(seconds_left),
                },
                VerifyOutcome::InvalidCode { attempts_left } => OtpVerification::Failed {
                    reason: "invalid_code",
                    attempts_left: Some(attempts_left),
                    retry_after_seconds: None,
                },
            });
        }

        Err(AppError::internal("Write contention on OTP record"))
    }

    /// Compare-and-swap the whole record against the revision it was read
    /// at. Returns false when a concurrent writer got there first.
    async fn persist(&self, rec: &OtpRequest, expected_revision: i64) -> Result<bool> {
        let mut next = rec.clone();
        next.revision = expected_revision + 1;
        let result = self
            .collection
            .replace_one(
                doc! { "_id": &rec.id, "revision": expected_revision },
                &next,
            )
            .await?;
        Ok(result.matched_count > 0)
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        *err.kind,
        mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(ref we))
            if we.code == 11000
    )
}
