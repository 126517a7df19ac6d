// persona-core/src/runtime/assembler.rs
// ============================================================================
// Module: Persona Read Assembler
// Description: Unified profile reads, listings, and the delete cascade.
// Purpose: Resolve children to their merged parent view at read time.
// Dependencies: crate::core, crate::interfaces, crate::runtime::condition
// ============================================================================

//! ## Overview
//! Reading a child profile returns the parent document re-attributed with the
//! child's identifier and a child-view hierarchy, so the caller sees itself
//! inside the merged view while still seeing its peers. Listings hide
//! synthetic parents by construction (`list_profile=false`). The delete
//! cascade removes a profile, its events, and, for parents, every child.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use crate::core::Profile;
use crate::core::ProfileHierarchy;
use crate::core::ProfileId;
use crate::core::ServiceError;
use crate::interfaces::EventStore;
use crate::interfaces::FilterClause;
use crate::interfaces::ProfileStore;
use crate::runtime::condition::document_matches;

// ============================================================================
// SECTION: Read Assembler
// ============================================================================

/// Profile read and listing surface.
#[derive(Clone)]
pub struct ReadAssembler {
    /// Profile collection.
    profiles: Arc<dyn ProfileStore>,
}

impl ReadAssembler {
    /// Creates a read assembler.
    #[must_use]
    pub fn new(profiles: Arc<dyn ProfileStore>) -> Self {
        Self { profiles }
    }

    /// Returns the unified view for a profile id.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] when the profile or its parent does
    /// not exist.
    pub fn read(&self, profile_id: &ProfileId) -> Result<Profile, ServiceError> {
        let profile = self
            .profiles
            .find(profile_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("profile {profile_id}")))?;
        if profile.hierarchy.is_parent {
            return Ok(profile);
        }
        let parent_id = profile.hierarchy.parent_profile_id.clone().ok_or_else(|| {
            ServiceError::Internal(format!("child profile {profile_id} has no parent"))
        })?;
        let parent = self
            .profiles
            .find(&parent_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("profile {parent_id}")))?;

        // The caller sees the merged state attributed to its own id, as a
        // child of the merged view with its peers visible.
        let mut view = parent.clone();
        view.profile_id = profile.profile_id;
        view.hierarchy = ProfileHierarchy {
            is_parent: false,
            list_profile: true,
            parent_profile_id: Some(parent.profile_id),
            children: parent.hierarchy.children,
        };
        Ok(view)
    }

    /// Lists profiles with `list_profile=true`, optionally filtered.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] when the read fails.
    pub fn list(&self, clauses: &[FilterClause]) -> Result<Vec<Profile>, ServiceError> {
        let profiles = self.profiles.list()?;
        Ok(profiles
            .into_iter()
            .filter(|profile| profile.hierarchy.list_profile)
            .filter(|profile| {
                clauses.is_empty() || document_matches(&profile.to_document(), clauses)
            })
            .collect())
    }
}

// ============================================================================
// SECTION: Delete Cascade
// ============================================================================

/// Cascade deletion of profiles and their events.
#[derive(Clone)]
pub struct CascadeDeleter {
    /// Profile collection.
    profiles: Arc<dyn ProfileStore>,
    /// Event log.
    events: Arc<dyn EventStore>,
}

impl CascadeDeleter {
    /// Creates a cascade deleter.
    #[must_use]
    pub fn new(profiles: Arc<dyn ProfileStore>, events: Arc<dyn EventStore>) -> Self {
        Self { profiles, events }
    }

    /// Deletes a profile with its events; parents take their children along,
    /// children detach from their parent.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] when the profile does not exist.
    pub fn delete(&self, profile_id: &ProfileId) -> Result<(), ServiceError> {
        let profile = self
            .profiles
            .find(profile_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("profile {profile_id}")))?;

        self.events.delete_for_profile(profile_id)?;

        if profile.hierarchy.is_parent {
            for link in &profile.hierarchy.children {
                self.events.delete_for_profile(&link.child_profile_id)?;
                self.profiles.delete(&link.child_profile_id)?;
            }
            self.profiles.delete(profile_id)?;
            return Ok(());
        }

        self.profiles.delete(profile_id)?;
        if let Some(parent_id) = &profile.hierarchy.parent_profile_id {
            if let Some(mut parent) = self.profiles.find(parent_id)? {
                parent
                    .hierarchy
                    .children
                    .retain(|link| &link.child_profile_id != profile_id);
                self.profiles.save(&parent)?;
            }
        }
        Ok(())
    }
}
