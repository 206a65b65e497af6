//! Core domain types for the Track4Health system.
//!
//! This module defines the records collected in the field:
//! - Users and their roles
//! - Awareness sessions and their attendees
//! - Child screenings and the screened children
//! - GPS-tagged photos

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Users
// ============================================================================

/// Role of a user; fixed at creation
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Developer,
    Master,
    Fmt,
    SocialMobilizer,
}

impl Role {
    /// Developers and masters administer user accounts
    pub fn can_manage_users(self) -> bool {
        matches!(self, Role::Developer | Role::Master)
    }

    /// Field workers may add records but not delete them
    pub fn can_delete_records(self) -> bool {
        matches!(self, Role::Developer | Role::Master)
    }

    /// FMT and social mobilizers only see records they created
    pub fn can_view_all_records(self) -> bool {
        matches!(self, Role::Developer | Role::Master)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Developer => "developer",
            Role::Master => "master",
            Role::Fmt => "fmt",
            Role::SocialMobilizer => "socialMobilizer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "developer" => Ok(Role::Developer),
            "master" => Ok(Role::Master),
            "fmt" => Ok(Role::Fmt),
            "socialmobilizer" => Ok(Role::SocialMobilizer),
            _ => Err(crate::Error::Validation(format!("Unknown role: {}", s))),
        }
    }
}

/// A latitude/longitude pair in decimal degrees
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    /// Build a location, rejecting out-of-range or non-finite coordinates
    pub fn new(latitude: f64, longitude: f64) -> crate::Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(crate::Error::Validation(format!(
                "Latitude out of range: {}",
                latitude
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(crate::Error::Validation(format!(
                "Longitude out of range: {}",
                longitude
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// An application user
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub username: String,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub last_active: Option<DateTime<Utc>>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub designation: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
}

/// Fields needed to create a user remotely
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub name: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub designation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
}

/// MySQL-backed endpoints return ids as numbers or strings depending on the driver
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
    })
}

// ============================================================================
// Shared enums
// ============================================================================

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    #[default]
    Male,
    Female,
    Other,
}

impl std::str::FromStr for Gender {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_lowercase().as_str() {
            "male" | "m" => Ok(Gender::Male),
            "female" | "f" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            _ => Err(crate::Error::Validation(format!("Unknown gender: {}", s))),
        }
    }
}

/// Vaccination progress recorded for an attendee or a screened child
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum VaccinationStatus {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "0-Dose")]
    ZeroDose,
    #[serde(rename = "1st-Dose")]
    FirstDose,
    #[serde(rename = "2nd-Dose")]
    SecondDose,
    #[serde(rename = "3rd-Dose")]
    ThirdDose,
    #[serde(rename = "MR-1")]
    Mr1,
    #[serde(rename = "MR-2")]
    Mr2,
    #[serde(rename = "Completed")]
    Completed,
}

impl VaccinationStatus {
    /// Statuses an awareness-session attendee may be recorded with
    pub fn valid_for_attendee(self) -> bool {
        !matches!(self, VaccinationStatus::Mr2 | VaccinationStatus::Completed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VaccinationStatus::None => "none",
            VaccinationStatus::ZeroDose => "0-Dose",
            VaccinationStatus::FirstDose => "1st-Dose",
            VaccinationStatus::SecondDose => "2nd-Dose",
            VaccinationStatus::ThirdDose => "3rd-Dose",
            VaccinationStatus::Mr1 => "MR-1",
            VaccinationStatus::Mr2 => "MR-2",
            VaccinationStatus::Completed => "Completed",
        }
    }
}

impl std::str::FromStr for VaccinationStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let all = [
            VaccinationStatus::None,
            VaccinationStatus::ZeroDose,
            VaccinationStatus::FirstDose,
            VaccinationStatus::SecondDose,
            VaccinationStatus::ThirdDose,
            VaccinationStatus::Mr1,
            VaccinationStatus::Mr2,
            VaccinationStatus::Completed,
        ];
        all.into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| crate::Error::Validation(format!("Unknown vaccination status: {}", s)))
    }
}

/// Acute malnutrition classification derived from MUAC
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NutritionStatus {
    #[serde(rename = "SAM")]
    Sam,
    #[serde(rename = "MAM")]
    Mam,
    Normal,
}

impl fmt::Display for NutritionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NutritionStatus::Sam => "SAM",
            NutritionStatus::Mam => "MAM",
            NutritionStatus::Normal => "Normal",
        })
    }
}

// ============================================================================
// Sessions
// ============================================================================

fn default_session_number() -> u32 {
    1
}

/// Fields shared by awareness sessions and child screenings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetails {
    pub date: NaiveDate,
    pub village_name: String,
    pub uc_name: String,
    pub conducted_by: String,
    #[serde(default)]
    pub designation: String,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default = "default_session_number")]
    pub session_number: u32,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub created_by: String,
}

/// A person who attended an awareness session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub id: Uuid,
    pub name: String,
    pub father_husband_name: String,
    /// Years; zero when only a date of birth was captured
    pub age: u32,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Gender,
    #[serde(default)]
    pub children_under_five: u32,
    #[serde(default)]
    pub contact_number: Option<String>,
    #[serde(default)]
    pub remarks: String,
    #[serde(default = "default_true")]
    pub same_uc: bool,
    #[serde(default)]
    pub alternate_address: Option<String>,
    #[serde(default)]
    pub vaccination_status: VaccinationStatus,
    #[serde(default)]
    pub vaccine_due: bool,
    #[serde(default)]
    pub conducted_by: String,
    #[serde(default)]
    pub designation: String,
}

/// A child measured during a screening session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScreenedChild {
    pub id: Uuid,
    pub name: String,
    pub father_name: String,
    pub age_months: u32,
    pub muac_cm: f64,
    pub gender: Gender,
    #[serde(default)]
    pub vaccination_status: VaccinationStatus,
    #[serde(default)]
    pub vaccine_due: bool,
    #[serde(default)]
    pub remarks: String,
    pub nutrition_status: NutritionStatus,
    #[serde(default = "default_true")]
    pub same_uc: bool,
    #[serde(default)]
    pub alternate_address: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
}

fn default_true() -> bool {
    true
}

/// An awareness session and its attendance list
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AwarenessSession {
    pub id: Uuid,
    #[serde(flatten)]
    pub details: SessionDetails,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
}

/// A nutrition screening session and the children measured in it
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChildScreening {
    pub id: Uuid,
    #[serde(flatten)]
    pub details: SessionDetails,
    #[serde(default)]
    pub children: Vec<ScreenedChild>,
}

/// Which of the two session collections an operation targets
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Awareness,
    Screening,
}

impl SessionKind {
    /// Local storage key holding the collection for this kind
    pub fn storage_key(self) -> &'static str {
        match self {
            SessionKind::Awareness => crate::storage::keys::AWARENESS_SESSIONS,
            SessionKind::Screening => crate::storage::keys::CHILD_SCREENINGS,
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionKind::Awareness => "awareness session",
            SessionKind::Screening => "child screening",
        })
    }
}

/// A nested record of either session kind
#[derive(Clone, Debug, PartialEq)]
pub enum Entry {
    Attendee(Attendee),
    Child(ScreenedChild),
}

impl Entry {
    pub fn id(&self) -> Uuid {
        match self {
            Entry::Attendee(a) => a.id,
            Entry::Child(c) => c.id,
        }
    }

    /// The session kind that owns this entry type
    pub fn kind(&self) -> SessionKind {
        match self {
            Entry::Attendee(_) => SessionKind::Awareness,
            Entry::Child(_) => SessionKind::Screening,
        }
    }

    /// Name and father/guardian name, as used for duplicate detection
    pub fn identity(&self) -> (&str, &str) {
        match self {
            Entry::Attendee(a) => (&a.name, &a.father_husband_name),
            Entry::Child(c) => (&c.name, &c.father_name),
        }
    }
}

impl From<Attendee> for Entry {
    fn from(attendee: Attendee) -> Self {
        Entry::Attendee(attendee)
    }
}

impl From<ScreenedChild> for Entry {
    fn from(child: ScreenedChild) -> Self {
        Entry::Child(child)
    }
}

// ============================================================================
// Photos
// ============================================================================

/// A photo captured with a GPS overlay
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GpsPhoto {
    pub id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub location: Location,
    #[serde(default)]
    pub address: Option<String>,
    /// File path or data URL of the image
    pub image: String,
    #[serde(default)]
    pub created_by: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization() {
        assert_eq!(
            serde_json::to_string(&Role::SocialMobilizer).unwrap(),
            "\"socialMobilizer\""
        );
        let role: Role = serde_json::from_str("\"fmt\"").unwrap();
        assert_eq!(role, Role::Fmt);
        assert_eq!("social_mobilizer".parse::<Role>().unwrap(), Role::SocialMobilizer);
    }

    #[test]
    fn test_role_permissions() {
        assert!(Role::Master.can_manage_users());
        assert!(Role::Developer.can_delete_records());
        assert!(!Role::Fmt.can_manage_users());
        assert!(!Role::SocialMobilizer.can_view_all_records());
    }

    #[test]
    fn test_user_id_accepts_numbers() {
        let json = r#"{"id": 42, "username": "ali", "name": "Ali", "role": "master"}"#;
        let user: User = serde_json::from_str(json).unwrap();
        assert_eq!(user.id, "42");
        assert!(!user.is_online);
        assert!(user.location.is_none());
    }

    #[test]
    fn test_vaccination_status_names() {
        assert_eq!(
            serde_json::to_string(&VaccinationStatus::FirstDose).unwrap(),
            "\"1st-Dose\""
        );
        assert_eq!("mr-1".parse::<VaccinationStatus>().unwrap(), VaccinationStatus::Mr1);
        assert!(VaccinationStatus::Mr1.valid_for_attendee());
        assert!(!VaccinationStatus::Completed.valid_for_attendee());
        assert_eq!(VaccinationStatus::default(), VaccinationStatus::None);
    }

    #[test]
    fn test_location_bounds() {
        assert!(Location::new(31.5, 74.3).is_ok());
        assert!(Location::new(91.0, 0.0).is_err());
        assert!(Location::new(0.0, f64::NAN).is_err());
    }

    #[test]
    fn test_session_flattens_details() {
        let session = AwarenessSession {
            id: Uuid::new_v4(),
            details: SessionDetails {
                date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                village_name: "Model Town".into(),
                uc_name: "UC-12".into(),
                conducted_by: "Sana".into(),
                designation: "FMT".into(),
                location: None,
                session_number: 1,
                images: vec![],
                created_by: "sana".into(),
            },
            attendees: vec![],
        };

        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["villageName"], "Model Town");
        assert_eq!(value["date"], "2024-03-01");
        assert!(value["attendees"].as_array().unwrap().is_empty());

        let back: AwarenessSession = serde_json::from_value(value).unwrap();
        assert_eq!(back, session);
    }
}
