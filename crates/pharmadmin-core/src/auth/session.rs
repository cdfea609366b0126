use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Administrative role attached to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[serde(alias = "super")]
    SuperAdmin,
    #[serde(alias = "pharmacy")]
    Pharmacist,
    #[serde(alias = "doctor")]
    DoctorAdmin,
}

/// Screens a role may reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Dashboard,
    Chat,
    Inventory,
    DrugCatalog,
    BillUpload,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Pharmacist => "pharmacist",
            Role::DoctorAdmin => "doctor_admin",
        }
    }

    /// Short segment used in dashboard paths (`/admin/<segment>`).
    pub fn route_segment(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super",
            Role::Pharmacist => "pharmacy",
            Role::DoctorAdmin => "doctor",
        }
    }

    pub fn dashboard_path(&self) -> String {
        format!("/admin/{}", self.route_segment())
    }

    pub fn allows(&self, feature: Feature) -> bool {
        match self {
            Role::Pharmacist => true,
            Role::SuperAdmin | Role::DoctorAdmin => {
                matches!(feature, Feature::Dashboard | Feature::Chat)
            }
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "super_admin" | "super" => Ok(Role::SuperAdmin),
            "pharmacist" | "pharmacy" => Ok(Role::Pharmacist),
            "doctor_admin" | "doctor" => Ok(Role::DoctorAdmin),
            other => Err(format!(
                "unknown role '{}' (expected super_admin, pharmacist or doctor_admin)",
                other
            )),
        }
    }
}

/// The logged-in identity, as returned in the `user` field of the login and
/// signup responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "id", deserialize_with = "subject_id_from_any")]
    pub subject_id: String,
    pub role: Role,
    #[serde(rename = "name", default)]
    pub display_name: String,
    pub email: String,
}

impl Session {
    pub fn can(&self, feature: Feature) -> bool {
        self.role.allows(feature)
    }
}

/// Backends hand out either integer or UUID primary keys.
fn subject_id_from_any<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Number(n) => n.to_string(),
        RawId::Text(s) => s,
    })
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access: String,
    pub refresh: String,
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    LoggedOut,
    LoggedIn,
}
