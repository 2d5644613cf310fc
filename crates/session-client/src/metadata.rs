//! Cached session metadata.
//!
//! Metadata is resolved once at login and only used to route the renewal
//! exchange to the right endpoint. It is never an authorization input.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SessionError;
use crate::store::{CredentialStore, StoreKey};

/// The two user classes, each with its own login and renewal endpoints.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum UserClass {
    #[default]
    Staff,
    Examinee,
}

/// Session metadata persisted under [`StoreKey::UserData`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    #[serde(default)]
    pub user_class: UserClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SessionMetadata {
    pub fn new(user_class: UserClass) -> Self {
        Self {
            user_class,
            ..Self::default()
        }
    }

    /// Build metadata from a login response's `user` object.
    ///
    /// `isExaminee` in the payload overrides the class the login was made
    /// under.
    pub fn from_login_user(class: UserClass, user: Option<&serde_json::Value>) -> Self {
        let mut metadata = Self::new(class);
        let Some(serde_json::Value::Object(user)) = user else {
            return metadata;
        };

        if let Some(is_examinee) = user.get("isExaminee").and_then(|v| v.as_bool()) {
            metadata.user_class = if is_examinee {
                UserClass::Examinee
            } else {
                UserClass::Staff
            };
        }
        metadata.user_id = user
            .get("id")
            .and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
        metadata.display_name = ["name", "displayName", "email"]
            .iter()
            .find_map(|field| user.get(*field).and_then(|v| v.as_str()).map(str::to_owned));
        metadata.extra = user
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), "id" | "isExaminee"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        metadata
    }

    /// Parse stored metadata, also accepting the `isExaminee` flag form.
    pub fn parse(raw: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(raw).ok()?;
        let mut metadata: Self = serde_json::from_value(value.clone()).ok()?;
        if value.get("user_class").is_some() {
            return Some(metadata);
        }
        if let Some(is_examinee) = value.get("isExaminee").and_then(|v| v.as_bool()) {
            metadata.user_class = if is_examinee {
                UserClass::Examinee
            } else {
                UserClass::Staff
            };
            metadata.extra.remove("isExaminee");
        }
        Some(metadata)
    }

    pub fn is_examinee(&self) -> bool {
        self.user_class == UserClass::Examinee
    }

    /// Load metadata from the store. Missing or unreadable metadata is
    /// `None`.
    pub fn load(store: &dyn CredentialStore) -> Option<Self> {
        let raw = store.get(StoreKey::UserData).ok().flatten()?;
        let parsed = Self::parse(&raw);
        if parsed.is_none() {
            debug!("Stored session metadata is unreadable");
        }
        parsed
    }

    pub fn save(&self, store: &dyn CredentialStore) -> Result<(), SessionError> {
        let raw = serde_json::to_string(self).map_err(|e| SessionError::Storage(e.to_string()))?;
        store.set(StoreKey::UserData, &raw)
    }

    /// Class used to route the renewal exchange. Falls back to
    /// [`UserClass::Staff`] when nothing usable is stored.
    pub fn renewal_class(store: &dyn CredentialStore) -> UserClass {
        match Self::load(store) {
            Some(metadata) => metadata.user_class,
            None => {
                debug!("No session metadata; routing renewal as staff");
                UserClass::Staff
            }
        }
    }
}
