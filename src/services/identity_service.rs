use bcrypt::{hash, DEFAULT_COST};
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime as BsonDateTime},
    Collection, Database,
};
use validator::ValidateEmail;

use crate::errors::{AppError, Result};
use crate::models::user::Account;

/// Canonical form of a client- or caller-supplied email address.
/// Everything downstream (hashing, record keys, bindings) sees only this.
pub fn normalize_email(raw: &str) -> Result<String> {
    let email = raw.trim().to_lowercase();
    if !email.validate_email() {
        return Err(AppError::invalid("Malformed email address"));
    }
    Ok(email)
}

/// The identity/password store, consumed at its interface: create account,
/// update password, update email, mark verified, look up by email.
#[derive(Clone)]
pub struct IdentityService {
    collection: Collection<Account>,
}

impl IdentityService {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("users"),
        }
    }

    pub async fn lookup_by_email(&self, email: &str) -> Result<Option<Account>> {
        Ok(self.collection.find_one(doc! { "email": email }).await?)
    }

    /// Registration target. The email arrives here already OTP-verified, so
    /// the account starts with `email_verified: true`.
    pub async fn create_account(&self, email: &str, name: &str, password: &str) -> Result<String> {
        if self.lookup_by_email(email).await?.is_some() {
            return Err(AppError::AlreadyExists(
                "An account with this email already exists".to_string(),
            ));
        }

        let password_hash = hash(password, DEFAULT_COST)?;
        let id = ObjectId::new();
        let now = BsonDateTime::now();
        let account = Account {
            _id: Some(id),
            email: email.to_string(),
            name: name.to_string(),
            password_hash,
            email_verified: true,
            created_at: now,
            updated_at: now,
        };

        self.collection.insert_one(&account).await?;
        Ok(id.to_hex())
    }

    pub async fn set_password_by_email(&self, email: &str, password: &str) -> Result<()> {
        let password_hash = hash(password, DEFAULT_COST)?;
        let result = self
            .collection
            .update_one(
                doc! { "email": email },
                doc! { "$set": { "password_hash": password_hash, "updated_at": BsonDateTime::now() } },
            )
            .await?;

        if result.matched_count == 0 {
            return Err(AppError::NotFound("No account for this email".to_string()));
        }
        Ok(())
    }

    pub async fn set_password_by_uid(&self, uid: &str, password: &str) -> Result<()> {
        let id = parse_uid(uid)?;
        let password_hash = hash(password, DEFAULT_COST)?;
        let result = self
            .collection
            .update_one(
                doc! { "_id": id },
                doc! { "$set": { "password_hash": password_hash, "updated_at": BsonDateTime::now() } },
            )
            .await?;

        if result.matched_count == 0 {
            return Err(AppError::NotFound("Account not found".to_string()));
        }
        Ok(())
    }

    pub async fn mark_email_verified(&self, uid: &str) -> Result<()> {
        let id = parse_uid(uid)?;
        let result = self
            .collection
            .update_one(
                doc! { "_id": id },
                doc! { "$set": { "email_verified": true, "updated_at": BsonDateTime::now() } },
            )
            .await?;

        if result.matched_count == 0 {
            return Err(AppError::NotFound("Account not found".to_string()));
        }
        Ok(())
    }

    /// Sets the new address and marks it verified in one update; the OTP
    /// session consumed just before this proved control of that mailbox.
    pub async fn set_email(&self, uid: &str, new_email: &str) -> Result<()> {
        let id = parse_uid(uid)?;
        if self.lookup_by_email(new_email).await?.is_some() {
            return Err(AppError::AlreadyExists(
                "An account with this email already exists".to_string(),
            ));
        }

        let result = self
            .collection
            .update_one(
                doc! { "_id": id },
                doc! { "$set": {
                    "email": new_email,
                    "email_verified": true,
                    "updated_at": BsonDateTime::now(),
                } },
            )
            .await?;

        if result.matched_count == 0 {
            return Err(AppError::NotFound("Account not found".to_string()));
        }
        Ok(())
    }
}

fn parse_uid(uid: &str) -> Result<ObjectId> {
    ObjectId::parse_str(uid).map_err(|_| AppError::invalid("Invalid account id"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_trims_and_lowercases() {
        assert_eq!(normalize_email("  Alice@Example.COM ").unwrap(), "alice@example.com");
    }

    #[test]
    fn malformed_emails_are_rejected() {
        for bad in ["", "not-an-email", "a@", "@x.com", "a b@x.com"] {
            assert!(normalize_email(bad).is_err(), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn plain_addresses_pass() {
        assert!(normalize_email("a@x.com").is_ok());
        assert!(normalize_email("first.last+tag@sub.domain.org").is_ok());
    }
}
