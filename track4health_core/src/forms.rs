//! Validation and submission of data-entry forms.
//!
//! Raw input is validated, normalized (title-cased names, derived age or
//! date of birth, MUAC classification) and duplicate-checked at the moment
//! it is submitted. Nothing is written unless every check passes.

use crate::classify::{self, AgeUnit, MuacThresholds};
use crate::storage::KeyValueStore;
use crate::store::RecordStore;
use crate::{
    Attendee, Error, Gender, Result, ScreenedChild, SessionDetails, SessionKind,
    VaccinationStatus,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Youngest and oldest child (in months) covered by nutrition screening
pub const SCREENING_AGE_MONTHS: std::ops::RangeInclusive<u32> = 6..=59;

/// Largest MUAC value accepted as a plausible measurement
pub const MAX_MUAC_CM: f64 = 30.0;

/// Attendee fields as entered on the form
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendeeInput {
    pub name: String,
    pub father_husband_name: String,
    #[serde(default)]
    pub age: u32,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
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
}

/// Screened child fields as entered on the form
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildInput {
    pub name: String,
    pub father_name: String,
    #[serde(default)]
    pub age_months: Option<u32>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    pub muac_cm: f64,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default)]
    pub vaccination_status: VaccinationStatus,
    #[serde(default)]
    pub vaccine_due: bool,
    #[serde(default)]
    pub remarks: String,
    #[serde(default = "default_true")]
    pub same_uc: bool,
    #[serde(default)]
    pub alternate_address: Option<String>,
}

fn default_true() -> bool {
    true
}

/// An awareness session staged for submission
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwarenessDraft {
    #[serde(flatten)]
    pub details: SessionDetails,
    #[serde(default)]
    pub attendees: Vec<AttendeeInput>,
}

/// A child screening staged for submission
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreeningDraft {
    #[serde(flatten)]
    pub details: SessionDetails,
    #[serde(default)]
    pub children: Vec<ChildInput>,
}

fn require(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{} is required", field)));
    }
    Ok(())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Check and normalize session-level fields
pub fn validate_details(details: &SessionDetails) -> Result<SessionDetails> {
    require(&details.village_name, "Village name")?;
    require(&details.uc_name, "Union council")?;
    if details.session_number == 0 {
        return Err(Error::Validation(
            "Session number must be a positive integer".into(),
        ));
    }

    let mut normalized = details.clone();
    normalized.village_name = classify::to_title_case(&details.village_name);
    normalized.uc_name = details.uc_name.trim().to_string();
    normalized.conducted_by = classify::to_title_case(&details.conducted_by);
    Ok(normalized)
}

fn parse_optional_dob(input: Option<&str>, today: NaiveDate) -> Result<Option<NaiveDate>> {
    match input.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(raw) => {
            let dob = classify::parse_dob(raw)?;
            if dob > today {
                return Err(Error::Validation(format!(
                    "Date of birth {} is in the future",
                    dob
                )));
            }
            Ok(Some(dob))
        }
    }
}

/// Validate an attendee and turn it into a record for `details`
pub fn build_attendee(
    input: AttendeeInput,
    details: &SessionDetails,
    today: NaiveDate,
) -> Result<Attendee> {
    require(&input.name, "Name")?;
    require(&input.father_husband_name, "Father/husband name")?;

    let dob = parse_optional_dob(input.date_of_birth.as_deref(), today)?;
    let (age, date_of_birth) = match (input.age, dob) {
        (0, None) => {
            return Err(Error::Validation(
                "Either age or date of birth is required".into(),
            ))
        }
        (0, Some(dob)) => (classify::age_from_dob(dob, AgeUnit::Years, today), Some(dob)),
        (age, Some(dob)) => (age, Some(dob)),
        (age, None) => (age, Some(classify::dob_from_age(age, AgeUnit::Years, today))),
    };

    if !input.vaccination_status.valid_for_attendee() {
        return Err(Error::Validation(format!(
            "Vaccination status {} does not apply to attendees",
            input.vaccination_status.as_str()
        )));
    }

    Ok(Attendee {
        id: Uuid::new_v4(),
        name: classify::to_title_case(&input.name),
        father_husband_name: classify::to_title_case(&input.father_husband_name),
        age,
        date_of_birth,
        gender: input.gender,
        children_under_five: input.children_under_five,
        contact_number: optional_text(input.contact_number),
        remarks: input.remarks.trim().to_string(),
        same_uc: input.same_uc,
        alternate_address: if input.same_uc {
            None
        } else {
            optional_text(input.alternate_address)
        },
        vaccination_status: input.vaccination_status,
        vaccine_due: input.vaccine_due,
        conducted_by: details.conducted_by.clone(),
        designation: details.designation.clone(),
    })
}

/// Validate a screened child, deriving nutritional status from MUAC
pub fn build_child(
    input: ChildInput,
    thresholds: &MuacThresholds,
    today: NaiveDate,
) -> Result<ScreenedChild> {
    require(&input.name, "Child name")?;
    require(&input.father_name, "Father name")?;

    let dob = parse_optional_dob(input.date_of_birth.as_deref(), today)?;
    let age_months = match (input.age_months, dob) {
        (Some(age), _) => age,
        (None, Some(dob)) => classify::age_from_dob(dob, AgeUnit::Months, today),
        (None, None) => {
            return Err(Error::Validation(
                "Either age in months or date of birth is required".into(),
            ))
        }
    };
    if !SCREENING_AGE_MONTHS.contains(&age_months) {
        return Err(Error::Validation(format!(
            "Age must be between {} and {} months, got {}",
            SCREENING_AGE_MONTHS.start(),
            SCREENING_AGE_MONTHS.end(),
            age_months
        )));
    }

    if !input.muac_cm.is_finite() || input.muac_cm <= 0.0 || input.muac_cm > MAX_MUAC_CM {
        return Err(Error::Validation(format!(
            "MUAC must be between 0 and {} cm, got {}",
            MAX_MUAC_CM, input.muac_cm
        )));
    }

    let date_of_birth =
        dob.or_else(|| Some(classify::dob_from_age(age_months, AgeUnit::Months, today)));

    Ok(ScreenedChild {
        id: Uuid::new_v4(),
        name: classify::to_title_case(&input.name),
        father_name: classify::to_title_case(&input.father_name),
        age_months,
        muac_cm: input.muac_cm,
        gender: input.gender,
        vaccination_status: input.vaccination_status,
        vaccine_due: input.vaccine_due,
        remarks: input.remarks.trim().to_string(),
        nutrition_status: thresholds.classify(input.muac_cm),
        same_uc: input.same_uc,
        alternate_address: if input.same_uc {
            None
        } else {
            optional_text(input.alternate_address)
        },
        date_of_birth,
    })
}

/// Fail if `(name, father_name)` is already staged or already stored for the same place and day
fn ensure_unique<'a>(
    name: &str,
    father_name: &str,
    staged: &[(String, String)],
    persisted: &[(&'a str, &'a str)],
) -> Result<()> {
    let staged_pairs = staged.iter().map(|(n, f)| (n.as_str(), f.as_str()));
    if classify::is_duplicate(name, father_name, staged_pairs)
        || classify::is_duplicate(name, father_name, persisted.iter().copied())
    {
        return Err(Error::Duplicate {
            name: name.to_string(),
            father_name: father_name.to_string(),
        });
    }
    Ok(())
}

/// Validate a whole awareness session and store it with its attendees
///
/// Rejected when there are no attendees, when any attendee is invalid, or
/// when an attendee repeats one already staged or already recorded for the
/// same village and date.
pub fn submit_awareness<S: KeyValueStore>(
    store: &mut RecordStore<S>,
    draft: AwarenessDraft,
    today: NaiveDate,
) -> Result<Uuid> {
    let details = validate_details(&draft.details)?;
    if draft.attendees.is_empty() {
        return Err(Error::Validation(
            "Add at least one attendee before saving".into(),
        ));
    }

    let persisted =
        store.identities_on(SessionKind::Awareness, &details.village_name, details.date);
    let mut staged: Vec<(String, String)> = Vec::new();
    let mut attendees = Vec::with_capacity(draft.attendees.len());

    for input in draft.attendees {
        let attendee = build_attendee(input, &details, today)?;
        ensure_unique(
            &attendee.name,
            &attendee.father_husband_name,
            &staged,
            &persisted,
        )?;
        staged.push((attendee.name.clone(), attendee.father_husband_name.clone()));
        attendees.push(attendee);
    }

    store.add_awareness_with_attendees(details, attendees)
}

/// Validate a whole screening session and store it with its children
pub fn submit_screening<S: KeyValueStore>(
    store: &mut RecordStore<S>,
    draft: ScreeningDraft,
    thresholds: &MuacThresholds,
    today: NaiveDate,
) -> Result<Uuid> {
    let details = validate_details(&draft.details)?;
    if draft.children.is_empty() {
        return Err(Error::Validation(
            "Add at least one child before saving".into(),
        ));
    }

    let persisted =
        store.identities_on(SessionKind::Screening, &details.village_name, details.date);
    let mut staged: Vec<(String, String)> = Vec::new();
    let mut children = Vec::with_capacity(draft.children.len());

    for input in draft.children {
        let child = build_child(input, thresholds, today)?;
        ensure_unique(&child.name, &child.father_name, &staged, &persisted)?;
        staged.push((child.name.clone(), child.father_name.clone()));
        children.push(child);
    }

    store.add_screening_with_children(details, children)
}

/// Validate and append one attendee to an existing awareness session
pub fn add_attendee_checked<S: KeyValueStore>(
    store: &mut RecordStore<S>,
    session_id: Uuid,
    input: AttendeeInput,
    today: NaiveDate,
) -> Result<Attendee> {
    let details = store
        .awareness(session_id)
        .map(|s| s.details.clone())
        .ok_or_else(|| Error::NotFound(format!("awareness session {}", session_id)))?;

    let attendee = build_attendee(input, &details, today)?;
    let persisted =
        store.identities_on(SessionKind::Awareness, &details.village_name, details.date);
    ensure_unique(&attendee.name, &attendee.father_husband_name, &[], &persisted)?;

    store.add_entry(session_id, attendee.clone())?;
    Ok(attendee)
}

/// Validate and append one child to an existing screening session
pub fn add_child_checked<S: KeyValueStore>(
    store: &mut RecordStore<S>,
    session_id: Uuid,
    input: ChildInput,
    thresholds: &MuacThresholds,
    today: NaiveDate,
) -> Result<ScreenedChild> {
    let details = store
        .screening(session_id)
        .map(|s| s.details.clone())
        .ok_or_else(|| Error::NotFound(format!("child screening {}", session_id)))?;

    let child = build_child(input, thresholds, today)?;
    let persisted =
        store.identities_on(SessionKind::Screening, &details.village_name, details.date);
    ensure_unique(&child.name, &child.father_name, &[], &persisted)?;

    store.add_entry(session_id, child.clone())?;
    Ok(child)
}

/// Validate a replacement for an existing attendee, keeping its id
///
/// The duplicate check ignores the attendee being replaced, so an edit
/// that keeps the same name is allowed.
pub fn update_attendee_checked<S: KeyValueStore>(
    store: &mut RecordStore<S>,
    session_id: Uuid,
    attendee_id: Uuid,
    input: AttendeeInput,
    today: NaiveDate,
) -> Result<Attendee> {
    let session = store
        .awareness(session_id)
        .ok_or_else(|| Error::NotFound(format!("awareness session {}", session_id)))?;
    if !session.attendees.iter().any(|a| a.id == attendee_id) {
        return Err(Error::NotFound(format!("attendee {}", attendee_id)));
    }
    let details = session.details.clone();

    let mut attendee = build_attendee(input, &details, today)?;
    attendee.id = attendee_id;
    let persisted = store.identities_on_except(
        SessionKind::Awareness,
        &details.village_name,
        details.date,
        Some(attendee_id),
    );
    ensure_unique(&attendee.name, &attendee.father_husband_name, &[], &persisted)?;

    store.update_entry(session_id, attendee.clone())?;
    Ok(attendee)
}

/// Validate a replacement for an existing child, re-deriving nutritional status
pub fn update_child_checked<S: KeyValueStore>(
    store: &mut RecordStore<S>,
    session_id: Uuid,
    child_id: Uuid,
    input: ChildInput,
    thresholds: &MuacThresholds,
    today: NaiveDate,
) -> Result<ScreenedChild> {
    let session = store
        .screening(session_id)
        .ok_or_else(|| Error::NotFound(format!("child screening {}", session_id)))?;
    if !session.children.iter().any(|c| c.id == child_id) {
        return Err(Error::NotFound(format!("child {}", child_id)));
    }
    let details = session.details.clone();

    let mut child = build_child(input, thresholds, today)?;
    child.id = child_id;
    let persisted = store.identities_on_except(
        SessionKind::Screening,
        &details.village_name,
        details.date,
        Some(child_id),
    );
    ensure_unique(&child.name, &child.father_name, &[], &persisted)?;

    store.update_entry(session_id, child.clone())?;
    Ok(child)
}

/// Validate new details and apply them to an existing session
pub fn update_session_checked<S: KeyValueStore>(
    store: &mut RecordStore<S>,
    kind: SessionKind,
    session_id: Uuid,
    details: &SessionDetails,
) -> Result<bool> {
    let details = validate_details(details)?;
    store.update_session(kind, session_id, details)
}
