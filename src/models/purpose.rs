use serde::{Deserialize, Serialize};

/// The account action an OTP or verification session is scoped to.
/// Bindings are never cross-purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OtpPurpose {
    SignupVerify,
    EmailVerify,
    ResetPassword,
    ChangePassword,
    ChangeEmail,
    Other,
}

/// Where the binding email for a code comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailSource {
    /// Client-supplied email (unauthenticated flows).
    Client,
    /// Derived from the authenticated caller's verified identity.
    Caller,
}

/// Per-purpose authentication matrix, kept in one place so it stays auditable.
#[derive(Debug, Clone, Copy)]
pub struct PurposePolicy {
    pub requires_caller: bool,
    pub email_source: EmailSource,
    /// CHANGE_EMAIL binds the code to metadata["new_email"] instead.
    pub needs_new_email: bool,
}

impl OtpPurpose {
    pub fn policy(self) -> PurposePolicy {
        match self {
            OtpPurpose::SignupVerify | OtpPurpose::ResetPassword | OtpPurpose::Other => {
                PurposePolicy {
                    requires_caller: false,
                    email_source: EmailSource::Client,
                    needs_new_email: false,
                }
            }
            OtpPurpose::EmailVerify | OtpPurpose::ChangePassword => PurposePolicy {
                requires_caller: true,
                email_source: EmailSource::Caller,
                needs_new_email: false,
            },
            OtpPurpose::ChangeEmail => PurposePolicy {
                requires_caller: true,
                email_source: EmailSource::Caller,
                needs_new_email: true,
            },
        }
    }

    /// Stable tag used in record keys and audit entries.
    pub fn tag(self) -> &'static str {
        match self {
            OtpPurpose::SignupVerify => "SIGNUP_VERIFY",
            OtpPurpose::EmailVerify => "EMAIL_VERIFY",
            OtpPurpose::ResetPassword => "RESET_PASSWORD",
            OtpPurpose::ChangePassword => "CHANGE_PASSWORD",
            OtpPurpose::ChangeEmail => "CHANGE_EMAIL",
            OtpPurpose::Other => "OTHER",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthenticated_purposes_take_client_email() {
        for p in [OtpPurpose::SignupVerify, OtpPurpose::ResetPassword, OtpPurpose::Other] {
            let policy = p.policy();
            assert!(!policy.requires_caller, "{:?}", p);
            assert_eq!(policy.email_source, EmailSource::Client);
            assert!(!policy.needs_new_email);
        }
    }

    #[test]
    fn authenticated_purposes_derive_email_from_caller() {
        for p in [OtpPurpose::EmailVerify, OtpPurpose::ChangePassword, OtpPurpose::ChangeEmail] {
            let policy = p.policy();
            assert!(policy.requires_caller, "{:?}", p);
            assert_eq!(policy.email_source, EmailSource::Caller);
        }
    }

    #[test]
    fn only_change_email_needs_a_destination_address() {
        assert!(OtpPurpose::ChangeEmail.policy().needs_new_email);
        assert!(!OtpPurpose::ChangePassword.policy().needs_new_email);
    }

    #[test]
    fn purpose_tags_round_trip_through_serde() {
        let json = serde_json::to_string(&OtpPurpose::ResetPassword).unwrap();
        assert_eq!(json, "\"RESET_PASSWORD\"");
        let back: OtpPurpose = serde_json::from_str("\"CHANGE_EMAIL\"").unwrap();
        assert_eq!(back, OtpPurpose::ChangeEmail);
    }
}
