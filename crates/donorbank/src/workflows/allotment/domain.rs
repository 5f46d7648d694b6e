//! Records and wire types for the donor-request allotment workflow.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::{CentreId, UserId};

/// Identifier wrapper for donor requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

/// Identifier wrapper for donor records. Ordered so allotment history can
/// live in a `BTreeSet` and serialize deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DonorId(pub String);

/// Identifier wrapper for notifications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub String);

/// Lifecycle of a donor record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DonorStatus {
    Pending,
    Active,
    Allotted,
    Inactive,
    Referred,
    S2sAccepted,
}

impl DonorStatus {
    pub const fn label(self) -> &'static str {
        match self {
            DonorStatus::Pending => "pending",
            DonorStatus::Active => "active",
            DonorStatus::Allotted => "allotted",
            DonorStatus::Inactive => "inactive",
            DonorStatus::Referred => "referred",
            DonorStatus::S2sAccepted => "s2s_accepted",
        }
    }

    /// Whether the donor may be offered to a request.
    pub const fn is_available(self) -> bool {
        matches!(self, DonorStatus::Active | DonorStatus::Pending)
    }
}

/// Lifecycle of a donor request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Accepted,
    Rejected,
    Fulfilled,
}

impl RequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Fulfilled => "fulfilled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub const fn label(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaritalStatus {
    Single,
    Married,
    Divorced,
    Widowed,
}

/// Blood groups use their clinical notation on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BloodGroup {
    #[serde(rename = "A+")]
    APositive,
    #[serde(rename = "A-")]
    ANegative,
    #[serde(rename = "B+")]
    BPositive,
    #[serde(rename = "B-")]
    BNegative,
    #[serde(rename = "AB+")]
    AbPositive,
    #[serde(rename = "AB-")]
    AbNegative,
    #[serde(rename = "O+")]
    OPositive,
    #[serde(rename = "O-")]
    ONegative,
}

impl BloodGroup {
    pub const fn label(self) -> &'static str {
        match self {
            BloodGroup::APositive => "A+",
            BloodGroup::ANegative => "A-",
            BloodGroup::BPositive => "B+",
            BloodGroup::BNegative => "B-",
            BloodGroup::AbPositive => "AB+",
            BloodGroup::AbNegative => "AB-",
            BloodGroup::OPositive => "O+",
            BloodGroup::ONegative => "O-",
        }
    }
}

/// Inclusive numeric bound on a donor attribute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriteriaRange<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy> CriteriaRange<T> {
    pub fn contains(&self, value: T) -> bool {
        value >= self.min && value <= self.max
    }
}

/// The donor attributes a request may constrain. Every field is optional on
/// stored records; absent criteria do not filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCriteria {
    pub gender: Option<Gender>,
    pub age_range: Option<CriteriaRange<u32>>,
    pub marital_status: Option<MaritalStatus>,
    pub cast: Option<String>,
    pub blood_group: Option<BloodGroup>,
    pub nationality: Option<String>,
    pub height_range: Option<CriteriaRange<f32>>,
    pub weight_range: Option<CriteriaRange<f32>>,
    pub skin_color: Option<String>,
    pub hair_color: Option<String>,
    pub eye_color: Option<String>,
    pub donor_education: Option<String>,
}

impl MatchCriteria {
    /// The relaxed form used by the fallback matching pass: only gender and
    /// blood group survive.
    pub fn relaxed(&self) -> Self {
        MatchCriteria {
            gender: self.gender,
            blood_group: self.blood_group,
            ..MatchCriteria::default()
        }
    }
}

/// A hospital's request for a donor matching a set of criteria.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorRequest {
    pub id: RequestId,
    #[serde(flatten)]
    pub criteria: MatchCriteria,
    pub doctor_id: UserId,
    pub hospital_id: CentreId,
    pub required_by_date: NaiveDate,
    pub status: RequestStatus,
    // Wire name keeps the legacy single-t spelling clients already depend on.
    #[serde(rename = "isAlloted")]
    pub is_allotted: bool,
    pub allotted_to: Option<DonorId>,
    /// Every donor ever allotted to this request, kept across rejections.
    pub allotted_donors: BTreeSet<DonorId>,
    pub allotted_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub version: u64,
}

/// A registered donor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Donor {
    pub id: DonorId,
    /// Human-facing registration code, distinct from the record id.
    #[serde(rename = "donorId")]
    pub donor_code: String,
    pub name: String,
    pub phone: String,
    pub gender: Gender,
    pub age: u32,
    pub marital_status: MaritalStatus,
    pub blood_group: BloodGroup,
    pub cast: String,
    pub nationality: String,
    pub height: f32,
    pub weight: f32,
    pub skin_color: String,
    pub hair_color: String,
    pub eye_color: String,
    pub donor_education: String,
    #[serde(default)]
    pub medical_notes: Option<String>,
    pub status: DonorStatus,
    pub is_allotted: bool,
    pub allotted_to_request: Option<RequestId>,
    /// Which request currently claims the donor, cleared on reject/cancel.
    pub allotted_by_request: Option<RequestId>,
    /// Doctor the donor was accepted for, set on acceptance only.
    pub allotted_by_doctor: Option<UserId>,
    pub registered_by: UserId,
    pub registered_at: DateTime<Utc>,
    #[serde(skip)]
    pub version: u64,
}

/// Payload accepted by the request-creation endpoint. Every criterion is
/// required up front even though stored records treat them as optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSubmission {
    pub gender: Gender,
    pub age_range: CriteriaRange<u32>,
    pub marital_status: MaritalStatus,
    pub cast: String,
    pub blood_group: BloodGroup,
    pub nationality: String,
    pub height_range: CriteriaRange<f32>,
    pub weight_range: CriteriaRange<f32>,
    pub skin_color: String,
    pub hair_color: String,
    pub eye_color: String,
    pub donor_education: String,
    pub doctor_id: UserId,
    pub required_by_date: NaiveDate,
}

impl RequestSubmission {
    pub fn validate(&self) -> Result<(), String> {
        if self.age_range.min > self.age_range.max {
            return Err("ageRange minimum exceeds its maximum".to_string());
        }
        if self.height_range.min > self.height_range.max {
            return Err("heightRange minimum exceeds its maximum".to_string());
        }
        if self.weight_range.min > self.weight_range.max {
            return Err("weightRange minimum exceeds its maximum".to_string());
        }
        Ok(())
    }

    pub fn criteria(&self) -> MatchCriteria {
        MatchCriteria {
            gender: Some(self.gender),
            age_range: Some(self.age_range),
            marital_status: Some(self.marital_status),
            cast: Some(self.cast.clone()),
            blood_group: Some(self.blood_group),
            nationality: Some(self.nationality.clone()),
            height_range: Some(self.height_range),
            weight_range: Some(self.weight_range),
            skin_color: Some(self.skin_color.clone()),
            hair_color: Some(self.hair_color.clone()),
            eye_color: Some(self.eye_color.clone()),
            donor_education: Some(self.donor_education.clone()),
        }
    }
}

/// Payload accepted by the donor-registration endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorRegistration {
    pub name: String,
    pub phone: String,
    pub gender: Gender,
    pub age: u32,
    pub marital_status: MaritalStatus,
    pub blood_group: BloodGroup,
    pub cast: String,
    pub nationality: String,
    pub height: f32,
    pub weight: f32,
    pub skin_color: String,
    pub hair_color: String,
    pub eye_color: String,
    pub donor_education: String,
    #[serde(default)]
    pub medical_notes: Option<String>,
}

impl DonorRegistration {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.phone.trim().is_empty() {
            return Err("phone must not be empty".to_string());
        }
        if self.age == 0 {
            return Err("age must be a positive number of years".to_string());
        }
        if !self.height.is_finite() || self.height <= 0.0 {
            return Err("height must be a positive measurement in centimetres".to_string());
        }
        if !self.weight.is_finite() || self.weight <= 0.0 {
            return Err("weight must be a positive measurement in kilograms".to_string());
        }
        Ok(())
    }
}

/// Which matching pass produced a candidate list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPass {
    Primary,
    Fallback,
}

impl MatchPass {
    pub const fn label(self) -> &'static str {
        match self {
            MatchPass::Primary => "primary",
            MatchPass::Fallback => "fallback",
        }
    }
}

/// Event categories delivered to user notification feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    DonorRequestCreated,
    DonorAllotted,
    AllotmentAccepted,
    AllotmentRejected,
    AllotmentCancelled,
}

/// A single entry in a user's notification feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub recipient: UserId,
    pub sender: UserId,
    /// Id of the record the event concerns, when there is one.
    pub related: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
