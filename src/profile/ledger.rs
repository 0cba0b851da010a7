//! Lock guard and version ledger — all post-onboarding profile mutation.
//!
//! Every mutation requires a reason and produces exactly one new version
//! row whose number is computed in the same transaction as the update.
//! Locked profiles reject mutation unless the caller passes `unlock=true`.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::ProfileError;
use crate::profile::model::{Profile, ProfileVersion};
use crate::store::Database;

/// A requested profile mutation.
#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    /// Domain-section patches, keyed by section name. The special key
    /// `locked` takes a boolean and changes the lock flag itself.
    pub updates: Map<String, Value>,
    /// Required audit reason, recorded on the version row.
    pub reason: String,
    /// Bypass the lock guard for this one mutation. Does not itself
    /// persist an unlocked state.
    pub unlock: bool,
}

pub struct ProfileLedger {
    db: Arc<dyn Database>,
}

impl ProfileLedger {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Load the user's profile, failing with `NotFound` if absent.
    pub async fn get(&self, user_id: &str) -> Result<Profile, ProfileError> {
        self.db
            .get_profile(user_id)
            .await?
            .ok_or_else(|| ProfileError::NotFound {
                user_id: user_id.to_string(),
            })
    }

    /// Apply a mutation and append the next version row.
    ///
    /// Fails with `Locked` (no mutation, no version) when the profile is
    /// locked and `unlock` was not passed. The lock flag itself only
    /// changes when `updates` explicitly sets it.
    pub async fn update_profile(
        &self,
        user_id: &str,
        update: ProfileUpdate,
    ) -> Result<Profile, ProfileError> {
        if update.reason.trim().is_empty() {
            return Err(ProfileError::MissingReason);
        }

        let mut profile = self.get(user_id).await?;
        if profile.locked && !update.unlock {
            return Err(ProfileError::Locked);
        }

        apply_updates(&mut profile, &update.updates)?;
        profile.updated_at = chrono::Utc::now();

        let version = self
            .db
            .update_profile_with_version(&profile, update.reason.trim())
            .await?;
        tracing::info!(
            user_id,
            profile_id = %profile.id,
            version,
            reason = update.reason.trim(),
            "Profile updated"
        );
        Ok(profile)
    }

    /// Set `locked = true`. Locking alone is not a data change and does
    /// not create a version row.
    pub async fn lock_profile(&self, user_id: &str) -> Result<Profile, ProfileError> {
        self.db
            .set_profile_locked(user_id, true)
            .await?
            .ok_or_else(|| ProfileError::NotFound {
                user_id: user_id.to_string(),
            })
    }

    /// The profile's version ledger, newest first.
    pub async fn versions(&self, user_id: &str) -> Result<Vec<ProfileVersion>, ProfileError> {
        let profile = self.get(user_id).await?;
        Ok(self.db.list_profile_versions(profile.id).await?)
    }
}

/// Merge section patches into the profile, re-validating the result
/// through the typed attribute structs.
fn apply_updates(profile: &mut Profile, updates: &Map<String, Value>) -> Result<(), ProfileError> {
    let mut attributes = serde_json::to_value(&profile.attributes).map_err(|e| {
        ProfileError::InvalidUpdate {
            section: "attributes".to_string(),
            reason: e.to_string(),
        }
    })?;

    for (key, value) in updates {
        if key == "locked" {
            profile.locked = value.as_bool().ok_or_else(|| ProfileError::InvalidUpdate {
                section: "locked".to_string(),
                reason: "must be a boolean".to_string(),
            })?;
            continue;
        }

        let section = attributes
            .get_mut(key.as_str())
            .ok_or_else(|| ProfileError::InvalidUpdate {
                section: key.clone(),
                reason: "unknown profile section".to_string(),
            })?;
        let patch = value.as_object().ok_or_else(|| ProfileError::InvalidUpdate {
            section: key.clone(),
            reason: "section patch must be an object".to_string(),
        })?;
        let target = section
            .as_object_mut()
            .ok_or_else(|| ProfileError::InvalidUpdate {
                section: key.clone(),
                reason: "section is not an object".to_string(),
            })?;
        for (field, field_value) in patch {
            target.insert(field.clone(), field_value.clone());
        }
    }

    profile.attributes =
        serde_json::from_value(attributes).map_err(|e| ProfileError::InvalidUpdate {
            section: "attributes".to_string(),
            reason: e.to_string(),
        })?;
    Ok(())
}
