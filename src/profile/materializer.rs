//! Profile materializer — builds the locked profile and version 1 from a
//! completed onboarding context.

use std::sync::Arc;

use crate::error::{DatabaseError, ProfileError};
use crate::onboarding::engine::ProgressionEngine;
use crate::profile::model::{
    INITIAL_VERSION_REASON, Profile, ProfileAttributes, ProfileVersion,
};
use crate::store::Database;

pub struct ProfileMaterializer {
    db: Arc<dyn Database>,
    engine: Arc<ProgressionEngine>,
}

impl ProfileMaterializer {
    pub fn new(db: Arc<dyn Database>, engine: Arc<ProgressionEngine>) -> Self {
        Self { db, engine }
    }

    /// Assemble the profile from the user's completed context.
    ///
    /// Requires all 9 states to be complete and no non-deleted profile to
    /// exist. The profile row and its first version are written in one
    /// transaction; a profile without a version (or vice versa) is never
    /// observable. The profile is created locked.
    pub async fn create_profile(&self, user_id: &str) -> Result<Profile, ProfileError> {
        let context = self.engine.complete(user_id).await?;

        if self.db.get_profile(user_id).await?.is_some() {
            return Err(ProfileError::Conflict {
                user_id: user_id.to_string(),
            });
        }

        let attributes = ProfileAttributes::from_context(&context)?;
        let profile = Profile::new(user_id, attributes);
        let snapshot = serde_json::to_value(&profile)
            .map_err(|e| ProfileError::Database(DatabaseError::Serialization(e.to_string())))?;
        let version = ProfileVersion::new(profile.id, 1, INITIAL_VERSION_REASON, snapshot);

        match self.db.create_profile_with_version(&profile, &version).await {
            Ok(()) => {
                tracing::info!(user_id, profile_id = %profile.id, "Profile materialized");
                Ok(profile)
            }
            // Lost a creation race against a concurrent complete() call.
            Err(DatabaseError::Constraint(_)) => Err(ProfileError::Conflict {
                user_id: user_id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}
