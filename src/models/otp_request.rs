use chrono::{DateTime, Utc};
use mongodb::bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};

use crate::models::purpose::OtpPurpose;

pub const RESEND_COOLDOWN_SECONDS: i64 = 60;
pub const WINDOW_SECONDS: i64 = 60 * 60;
pub const MAX_SENDS_PER_WINDOW: i32 = 8;
pub const LOCKOUT_SECONDS: i64 = 15 * 60;
pub const CODE_TTL_SECONDS: i64 = 10 * 60;
pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;

/// One pending OTP per (email, purpose) pair, keyed by a deterministic id so
/// a new request supersedes the previous code but keeps the attempt/window
/// counters. Never hard-deleted; an old record goes inert once expired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpRequest {
    #[serde(rename = "_id")]
    pub id: String,
    pub purpose: OtpPurpose,
    pub email_hash: String,
    pub code_hash: String,
    pub salt: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub window_start_at: BsonDateTime,
    pub request_count_in_window: i32,
    pub last_sent_at: BsonDateTime,
    pub expires_at: BsonDateTime,
    pub locked_until: Option<BsonDateTime>,
    pub used: bool,
    /// Optimistic-concurrency counter; every persisted transition bumps it.
    pub revision: i64,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

/// Outcome of the send gate (60s cooldown, 8 sends per
/// rolling hour, 15 minute lockout).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateVerdict {
    /// Counters updated; caller must arm fresh code material and send it.
    Send,
    /// Inside the resend cooldown: no new code, no email, success-shaped
    /// response carrying the seconds left.
    Cooldown { seconds_left: i64 },
    /// Locked out (pre-existing or triggered by this very request).
    Locked { seconds_left: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified,
    AlreadyUsed,
    Locked { seconds_left: i64 },
    Expired,
    /// This failure was the last allowed attempt; the pair is now locked.
    MaxAttempts { seconds_left: i64 },
    InvalidCode { attempts_left: i32 },
}

fn seconds_until(later: BsonDateTime, now: DateTime<Utc>) -> i64 {
    // Round up so a client never retries a second early
    (later.timestamp_millis() - now.timestamp_millis() + 999) / 1000
}

impl OtpRequest {
    /// Fresh record for the first request of an (email, purpose) pair.
    /// `last_sent_at` starts at the epoch so the first send clears the
    /// cooldown gate; the window opens with count 0 and is incremented by
    /// `gate_send`.
    pub fn new(id: String, purpose: OtpPurpose, email_hash: String, now: DateTime<Utc>) -> Self {
        let now_bson = BsonDateTime::from_millis(now.timestamp_millis());
        OtpRequest {
            id,
            purpose,
            email_hash,
            code_hash: String::new(),
            salt: String::new(),
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            window_start_at: now_bson,
            request_count_in_window: 0,
            last_sent_at: BsonDateTime::from_millis(0),
            expires_at: BsonDateTime::from_millis(0),
            locked_until: None,
            used: false,
            revision: 0,
            created_at: now_bson,
            updated_at: now_bson,
        }
    }

    fn is_locked(&self, now: DateTime<Utc>) -> Option<i64> {
        self.locked_until
            .filter(|until| until.timestamp_millis() > now.timestamp_millis())
            .map(|until| seconds_until(until, now))
    }

    /// Decide whether a new code may be generated and sent right now,
    /// updating window/lockout counters in place. The caller persists the
    /// whole record in one compare-and-swap so concurrent requests for the
    /// same pair serialize.
    pub fn gate_send(&mut self, now: DateTime<Utc>) -> RateVerdict {
        if let Some(seconds_left) = self.is_locked(now) {
            return RateVerdict::Locked { seconds_left };
        }

        let now_millis = now.timestamp_millis();
        let cooldown_ends = self.last_sent_at.timestamp_millis() + RESEND_COOLDOWN_SECONDS * 1000;
        if now_millis < cooldown_ends {
            return RateVerdict::Cooldown {
                seconds_left: (cooldown_ends - now_millis + 999) / 1000,
            };
        }

        // Rolling window: resets only once fully elapsed
        let window_ends = self.window_start_at.timestamp_millis() + WINDOW_SECONDS * 1000;
        if now_millis < window_ends {
            self.request_count_in_window += 1;
        } else {
            self.window_start_at = BsonDateTime::from_millis(now_millis);
            self.request_count_in_window = 1;
        }

        if self.request_count_in_window > MAX_SENDS_PER_WINDOW {
            let until = now_millis + LOCKOUT_SECONDS * 1000;
            self.locked_until = Some(BsonDateTime::from_millis(until));
            return RateVerdict::Locked {
                seconds_left: LOCKOUT_SECONDS,
            };
        }

        RateVerdict::Send
    }

    /// Install fresh code material after `gate_send` returned `Send`. The
    /// new code supersedes the old one; attempt and window counters carry
    /// over per record, not per code.
    pub fn arm(&mut self, code_hash: String, salt: String, now: DateTime<Utc>) {
        let now_millis = now.timestamp_millis();
        self.code_hash = code_hash;
        self.salt = salt;
        self.attempts = 0;
        self.used = false;
        self.last_sent_at = BsonDateTime::from_millis(now_millis);
        self.expires_at = BsonDateTime::from_millis(now_millis + CODE_TTL_SECONDS * 1000);
        self.updated_at = BsonDateTime::from_millis(now_millis);
    }

    /// Apply one verification attempt. `code_matches` is the hash
    /// comparison result computed by the caller; all state transitions
    /// happen here so they stay in one testable place.
    pub fn apply_verify(&mut self, code_matches: bool, now: DateTime<Utc>) -> VerifyOutcome {
        if self.used {
            return VerifyOutcome::AlreadyUsed;
        }
        if let Some(seconds_left) = self.is_locked(now) {
            return VerifyOutcome::Locked { seconds_left };
        }
        if now.timestamp_millis() >= self.expires_at.timestamp_millis() {
            return VerifyOutcome::Expired;
        }

        if !code_matches {
            self.attempts += 1;
            self.updated_at = BsonDateTime::from_millis(now.timestamp_millis());
            if self.attempts >= self.max_attempts {
                self.locked_until = Some(BsonDateTime::from_millis(
                    now.timestamp_millis() + LOCKOUT_SECONDS * 1000,
                ));
                return VerifyOutcome::MaxAttempts {
                    seconds_left: LOCKOUT_SECONDS,
                };
            }
            return VerifyOutcome::InvalidCode {
                attempts_left: self.max_attempts - self.attempts,
            };
        }

        self.used = true;
        self.updated_at = BsonDateTime::from_millis(now.timestamp_millis());
        VerifyOutcome::Verified
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(now: DateTime<Utc>) -> OtpRequest {
        OtpRequest::new(
            "id".to_string(),
            OtpPurpose::ResetPassword,
            "ehash".to_string(),
            now,
        )
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn send(rec: &mut OtpRequest, n: u32, now: DateTime<Utc>) {
        assert_eq!(rec.gate_send(now), RateVerdict::Send, "send #{}", n);
        rec.arm(format!("hash{}", n), format!("salt{}", n), now);
    }

    #[test]
    fn first_send_passes_the_gate() {
        let now = t0();
        let mut rec = record(now);
        assert_eq!(rec.gate_send(now), RateVerdict::Send);
        assert_eq!(rec.request_count_in_window, 1);
    }

    #[test]
    fn rapid_double_tap_hits_cooldown_without_new_code() {
        let now = t0();
        let mut rec = record(now);
        send(&mut rec, 1, now);

        let again = now + Duration::seconds(10);
        match rec.gate_send(again) {
            RateVerdict::Cooldown { seconds_left } => assert_eq!(seconds_left, 50),
            other => panic!("expected cooldown, got {:?}", other),
        }
        // Counters untouched on the no-op path
        assert_eq!(rec.request_count_in_window, 1);
        assert_eq!(rec.code_hash, "hash1");
    }

    #[test]
    fn resend_after_cooldown_supersedes_code_but_keeps_window_count() {
        let now = t0();
        let mut rec = record(now);
        send(&mut rec, 1, now);

        let later = now + Duration::seconds(61);
        send(&mut rec, 2, later);
        assert_eq!(rec.request_count_in_window, 2);
        assert_eq!(rec.code_hash, "hash2");
        assert_eq!(rec.attempts, 0);
    }

    #[test]
    fn ninth_send_in_window_locks_for_fifteen_minutes() {
        let mut now = t0();
        let mut rec = record(now);
        for n in 1..=8 {
            send(&mut rec, n, now);
            now = now + Duration::seconds(61);
        }
        match rec.gate_send(now) {
            RateVerdict::Locked { seconds_left } => assert_eq!(seconds_left, LOCKOUT_SECONDS),
            other => panic!("expected lockout, got {:?}", other),
        }
        assert!(rec.locked_until.is_some());
    }

    #[test]
    fn window_rolls_over_after_an_hour() {
        let now = t0();
        let mut rec = record(now);
        send(&mut rec, 1, now);
        send(&mut rec, 2, now + Duration::seconds(120));

        let next_hour = now + Duration::seconds(WINDOW_SECONDS + 1);
        assert_eq!(rec.gate_send(next_hour), RateVerdict::Send);
        assert_eq!(rec.request_count_in_window, 1);
    }

    #[test]
    fn lockout_expires_and_sends_resume() {
        let mut now = t0();
        let mut rec = record(now);
        for n in 1..=8 {
            send(&mut rec, n, now);
            now = now + Duration::seconds(61);
        }
        assert!(matches!(rec.gate_send(now), RateVerdict::Locked { .. }));

        // After the penalty the old window has also elapsed
        let after = now + Duration::seconds(WINDOW_SECONDS + 1);
        assert_eq!(rec.gate_send(after), RateVerdict::Send);
    }

    #[test]
    fn five_wrong_codes_lock_the_pair() {
        let now = t0();
        let mut rec = record(now);
        send(&mut rec, 1, now);

        let at = now + Duration::seconds(5);
        for expected_left in [4, 3, 2, 1] {
            match rec.apply_verify(false, at) {
                VerifyOutcome::InvalidCode { attempts_left } => {
                    assert_eq!(attempts_left, expected_left)
                }
                other => panic!("expected invalid_code, got {:?}", other),
            }
        }
        match rec.apply_verify(false, at) {
            VerifyOutcome::MaxAttempts { seconds_left } => {
                assert_eq!(seconds_left, LOCKOUT_SECONDS)
            }
            other => panic!("expected max_attempts on 5th failure, got {:?}", other),
        }
        // Even the right code is refused while locked
        assert!(matches!(
            rec.apply_verify(true, at + Duration::seconds(1)),
            VerifyOutcome::Locked { .. }
        ));
    }

    #[test]
    fn successful_verify_marks_used_and_keeps_attempts() {
        let now = t0();
        let mut rec = record(now);
        send(&mut rec, 1, now);

        let at = now + Duration::seconds(5);
        assert!(matches!(
            rec.apply_verify(false, at),
            VerifyOutcome::InvalidCode { attempts_left: 4 }
        ));
        assert_eq!(rec.apply_verify(true, at), VerifyOutcome::Verified);
        assert!(rec.used);
        assert_eq!(rec.attempts, 1);

        // Codes are single-use
        assert_eq!(rec.apply_verify(true, at), VerifyOutcome::AlreadyUsed);
    }

    #[test]
    fn expired_code_is_rejected_even_when_correct() {
        let now = t0();
        let mut rec = record(now);
        send(&mut rec, 1, now);

        let late = now + Duration::seconds(CODE_TTL_SECONDS);
        assert_eq!(rec.apply_verify(true, late), VerifyOutcome::Expired);
        assert!(!rec.used);
    }
}
