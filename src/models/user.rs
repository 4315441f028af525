//! User directory view model.
//!
//! Identity, profiles, and authentication live in an external user
//! service; this is the read-mostly slice the core consults. The core
//! writes back only point/stat credits and realtime location updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Point;

/// Which side of the marketplace the user prefers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RolePreference {
    /// Posts tasks.
    Requester,
    /// Performs tasks.
    Helper,
    /// Both sides.
    Both,
}

impl RolePreference {
    /// Stable wire/storage name for the preference.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requester => "requester",
            Self::Helper => "helper",
            Self::Both => "both",
        }
    }

    /// Whether the user is eligible to be matched as a helper.
    #[must_use]
    pub fn can_help(self) -> bool {
        matches!(self, Self::Helper | Self::Both)
    }
}

/// A user account as seen by the coordination core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct UserAccount {
    /// Unique record identifier.
    pub id: String,
    /// Display name.
    pub username: String,
    /// Marketplace side preference.
    pub role_preference: RolePreference,
    /// Guests may browse but not create or apply.
    pub is_guest: bool,
    /// Phone number confirmed.
    pub phone_verified: bool,
    /// Identity document confirmed.
    pub id_verified: bool,
    /// Last known latitude.
    pub latitude: Option<f64>,
    /// Last known longitude.
    pub longitude: Option<f64>,
    /// When the location was last refreshed.
    pub location_updated_at: Option<DateTime<Utc>>,
    /// Reward points earned from completed tasks.
    pub points: i64,
    /// Tasks this user has completed as a helper.
    pub tasks_helped: i64,
    /// Tasks this user has posted as a requester.
    pub tasks_requested: i64,
}

impl UserAccount {
    /// Last known location, if any.
    #[must_use]
    pub fn location(&self) -> Option<Point> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(Point::new(lat, lon)),
            _ => None,
        }
    }

    /// Whether the location is fresh enough to match against.
    #[must_use]
    pub fn location_fresh_within(&self, now: DateTime<Utc>, minutes: i64) -> bool {
        self.location_updated_at
            .is_some_and(|ts| now - ts <= chrono::Duration::minutes(minutes))
    }
}
