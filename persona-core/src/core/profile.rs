// persona-core/src/core/profile.rs
// ============================================================================
// Module: Persona Profiles
// Description: Unified per-person profile documents and hierarchy links.
// Purpose: Define the profile record mutated by the ingestion pipeline.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A profile aggregates identity attributes, enriched traits, and
//! per-application data for one person. Profiles form a forest of depth one:
//! a parent owns state and zero or more children redirect to it through
//! `parent_profile_id`. Synthetic merged parents are created by the resolution
//! engine and are hidden from listings.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::AppId;
use crate::core::identifiers::ProfileId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Devices and Application Data
// ============================================================================

/// Device captured from event context, keyed by `device_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Device {
    /// Stable device identifier.
    pub device_id: String,
    /// Operating system name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    /// Browser name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    /// Browser version string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_version: Option<String>,
    /// Last observed IP address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// Device class (mobile, desktop, tablet).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    /// Timestamp of the last event observed from this device.
    #[serde(default)]
    pub last_used: Timestamp,
}

impl Device {
    /// Builds a device from event context, returning `None` when the context
    /// carries no usable `device_id`.
    #[must_use]
    pub fn from_context(context: &BTreeMap<String, Value>, observed_at: Timestamp) -> Option<Self> {
        let device_id = context.get("device_id").and_then(Value::as_str)?;
        if device_id.is_empty() {
            return None;
        }
        let field = |name: &str| context.get(name).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            device_id: device_id.to_string(),
            os: field("os"),
            browser: field("browser"),
            browser_version: field("browser_version"),
            ip: field("ip"),
            device_type: field("device_type"),
            last_used: observed_at,
        })
    }

    /// Merges another observation of the same device, last write wins per
    /// field.
    pub fn absorb(&mut self, incoming: &Self) {
        if incoming.os.is_some() {
            self.os.clone_from(&incoming.os);
        }
        if incoming.browser.is_some() {
            self.browser.clone_from(&incoming.browser);
        }
        if incoming.browser_version.is_some() {
            self.browser_version.clone_from(&incoming.browser_version);
        }
        if incoming.ip.is_some() {
            self.ip.clone_from(&incoming.ip);
        }
        if incoming.device_type.is_some() {
            self.device_type.clone_from(&incoming.device_type);
        }
        if incoming.last_used > self.last_used {
            self.last_used = incoming.last_used;
        }
    }
}

/// Per-application record inside a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ApplicationData {
    /// Application identifier.
    pub app_id: AppId,
    /// Devices observed for this application, keyed by `device_id`.
    #[serde(default)]
    pub devices: Vec<Device>,
    /// Free-form application specific data.
    #[serde(default)]
    pub app_specific_data: BTreeMap<String, Value>,
}

impl ApplicationData {
    /// Inserts or updates a device by `device_id`.
    pub fn upsert_device(&mut self, device: &Device) {
        if let Some(existing) =
            self.devices.iter_mut().find(|entry| entry.device_id == device.device_id)
        {
            existing.absorb(device);
        } else {
            self.devices.push(device.clone());
        }
    }
}

// ============================================================================
// SECTION: Hierarchy
// ============================================================================

/// Link from a parent profile to one of its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildLink {
    /// Child profile identifier.
    pub child_profile_id: ProfileId,
    /// Resolution rule that created the link.
    pub rule_name: String,
}

/// Parent/child placement of a profile within the merge forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileHierarchy {
    /// Whether this profile owns its state.
    pub is_parent: bool,
    /// Whether the profile appears in listings.
    pub list_profile: bool,
    /// Parent identifier, set exactly when `is_parent` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_profile_id: Option<ProfileId>,
    /// Children of a synthetic merged parent.
    #[serde(default)]
    pub children: Vec<ChildLink>,
}

impl ProfileHierarchy {
    /// Hierarchy for a freshly created leaf profile.
    #[must_use]
    pub const fn leaf() -> Self {
        Self {
            is_parent: true,
            list_profile: true,
            parent_profile_id: None,
            children: Vec::new(),
        }
    }

    /// Hierarchy for a synthetic merged parent.
    #[must_use]
    pub const fn merged_parent(children: Vec<ChildLink>) -> Self {
        Self {
            is_parent: true,
            list_profile: false,
            parent_profile_id: None,
            children,
        }
    }

    /// Hierarchy for a child redirecting to `parent`.
    #[must_use]
    pub const fn child_of(parent: ProfileId) -> Self {
        Self {
            is_parent: false,
            list_profile: true,
            parent_profile_id: Some(parent),
            children: Vec::new(),
        }
    }
}

impl Default for ProfileHierarchy {
    fn default() -> Self {
        Self::leaf()
    }
}

// ============================================================================
// SECTION: Profile
// ============================================================================

/// Canonical per-person profile document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Profile {
    /// Stable opaque identifier.
    pub profile_id: ProfileId,
    /// Identity attributes (email, user name, phone number, free-form).
    #[serde(default)]
    pub identity_attributes: BTreeMap<String, Value>,
    /// Traits written exclusively by enrichment rules.
    #[serde(default)]
    pub traits: BTreeMap<String, Value>,
    /// Ordered per-application records, keyed by `app_id`.
    #[serde(default)]
    pub application_data: Vec<ApplicationData>,
    /// Placement within the merge forest.
    #[serde(default)]
    pub hierarchy: ProfileHierarchy,
    /// Creation time in epoch seconds.
    #[serde(default)]
    pub created_at: Timestamp,
    /// Last update time in epoch seconds.
    #[serde(default)]
    pub updated_at: Timestamp,
}

impl Profile {
    /// Creates a fresh leaf profile skeleton for an unseen profile id.
    #[must_use]
    pub fn skeleton(profile_id: ProfileId, now: Timestamp) -> Self {
        Self {
            profile_id,
            hierarchy: ProfileHierarchy::leaf(),
            created_at: now,
            updated_at: now,
            ..Self::default()
        }
    }

    /// Identifier of the profile that receives enrichment writes: the parent
    /// when this profile has one, otherwise the profile itself.
    #[must_use]
    pub fn effective_parent_id(&self) -> ProfileId {
        match &self.hierarchy.parent_profile_id {
            Some(parent) if !self.hierarchy.is_parent => parent.clone(),
            _ => self.profile_id.clone(),
        }
    }

    /// Returns the application data record for `app_id`, creating it on
    /// demand.
    pub fn application_data_mut(&mut self, app_id: &AppId) -> &mut ApplicationData {
        if let Some(index) = self.application_data.iter().position(|data| &data.app_id == app_id) {
            return &mut self.application_data[index];
        }
        self.application_data.push(ApplicationData {
            app_id: app_id.clone(),
            ..ApplicationData::default()
        });
        let last = self.application_data.len() - 1;
        &mut self.application_data[last]
    }

    /// Renders the profile as a JSON document for dotted-path extraction and
    /// filter evaluation.
    #[must_use]
    pub fn to_document(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
