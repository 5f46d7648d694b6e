//! Storage and messaging seams for the allotment workflow, plus the read
//! models the API serves.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::identity::{CentreId, UserId};

use super::domain::{
    BloodGroup, Donor, DonorId, DonorRequest, DonorStatus, Gender, MaritalStatus, Notification,
    NotificationId, RequestId, RequestStatus,
};
use super::matching::{contains_ci, DonorFilter};

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Duplicate,
    #[error("record not found")]
    Missing,
    #[error("record version changed since read")]
    VersionConflict,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Storage abstraction so the service layer can be exercised in isolation.
///
/// Records carry a version counter. Mutating methods are conditional writes:
/// they compare the incoming record's version against the stored one, fail
/// with [`StoreError::VersionConflict`] on a mismatch, and bump the counter
/// on success. [`AllotmentStore::update_pair`] persists a request and a donor
/// together; implementations must apply both writes or neither.
pub trait AllotmentStore: Send + Sync {
    fn insert_request(&self, request: DonorRequest) -> Result<DonorRequest, StoreError>;
    fn fetch_request(&self, id: &RequestId) -> Result<Option<DonorRequest>, StoreError>;
    fn update_request(&self, request: DonorRequest) -> Result<DonorRequest, StoreError>;
    fn delete_request(&self, id: &RequestId) -> Result<(), StoreError>;
    /// Returns one page of matching requests plus the total match count.
    fn list_requests(
        &self,
        query: &RequestQuery,
        page_size: usize,
    ) -> Result<(Vec<DonorRequest>, usize), StoreError>;

    fn insert_donor(&self, donor: Donor) -> Result<Donor, StoreError>;
    fn fetch_donor(&self, id: &DonorId) -> Result<Option<Donor>, StoreError>;
    fn delete_donor(&self, id: &DonorId) -> Result<(), StoreError>;
    /// Donors accepted by the filter, newest registration first, capped at
    /// `limit`.
    fn search_donors(&self, filter: &DonorFilter, limit: usize) -> Result<Vec<Donor>, StoreError>;

    fn update_pair(
        &self,
        request: DonorRequest,
        donor: Donor,
    ) -> Result<(DonorRequest, Donor), StoreError>;
}

/// Filters accepted by the request listing endpoint.
#[derive(Debug, Clone)]
pub struct RequestQuery {
    pub search: Option<String>,
    pub created_by: Option<UserId>,
    pub allotted_to: Option<DonorId>,
    /// Restricts to accepted requests raised for this doctor.
    pub allotted_doctor: Option<UserId>,
    pub page: usize,
}

impl Default for RequestQuery {
    fn default() -> Self {
        Self {
            search: None,
            created_by: None,
            allotted_to: None,
            allotted_doctor: None,
            page: 1,
        }
    }
}

impl RequestQuery {
    pub fn matches(&self, request: &DonorRequest) -> bool {
        if let Some(creator) = &self.created_by {
            if &request.created_by != creator {
                return false;
            }
        }
        if let Some(donor) = &self.allotted_to {
            if request.allotted_to.as_ref() != Some(donor) {
                return false;
            }
        }
        if let Some(doctor) = &self.allotted_doctor {
            if request.status != RequestStatus::Accepted || &request.doctor_id != doctor {
                return false;
            }
        }
        if let Some(term) = &self.search {
            return Self::search_matches(request, term);
        }
        true
    }

    // Free-text search covers blood group notation plus the cast and
    // nationality criteria.
    fn search_matches(request: &DonorRequest, term: &str) -> bool {
        let term = term.trim();
        if term.is_empty() {
            return true;
        }
        let blood = request
            .criteria
            .blood_group
            .map(|group| group.label().eq_ignore_ascii_case(term))
            .unwrap_or(false);
        let cast = request
            .criteria
            .cast
            .as_deref()
            .map(|cast| contains_ci(cast, term))
            .unwrap_or(false);
        let nationality = request
            .criteria
            .nationality
            .as_deref()
            .map(|nationality| contains_ci(nationality, term))
            .unwrap_or(false);
        blood || cast || nationality
    }
}

/// Error enumeration for notification delivery and feed access.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification not found")]
    Missing,
    #[error("notification addressed to a different recipient")]
    WrongRecipient,
    #[error("notification channel unavailable: {0}")]
    Unavailable(String),
}

/// Outbound notification hook plus the read side backing the feed endpoints.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, notification: Notification) -> Result<(), NotificationError>;
    fn feed(&self, recipient: &UserId) -> Result<Vec<Notification>, NotificationError>;
    fn mark_read(
        &self,
        id: &NotificationId,
        recipient: &UserId,
    ) -> Result<Notification, NotificationError>;
}

/// Read-only lookups into the account directory, backing admin fan-out and
/// the summaries joined onto request views.
pub trait Directory: Send + Sync {
    fn admin_recipients(&self) -> Vec<UserId>;
    fn user_summary(&self, id: &UserId) -> Option<PartySummary>;
    fn centre_summary(&self, id: &CentreId) -> Option<PartySummary>;
}

/// Minimal projection of a directory account or centre.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartySummary {
    pub id: String,
    pub name: String,
}

impl PartySummary {
    /// Placeholder summary for ids the directory no longer resolves.
    pub fn unresolved(id: String) -> Self {
        Self {
            name: id.clone(),
            id,
        }
    }
}

/// Donor projection safe to expose to matching clients: no contact details,
/// no medical notes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorSummary {
    pub id: DonorId,
    #[serde(rename = "donorId")]
    pub donor_code: String,
    pub name: String,
    pub gender: Gender,
    pub age: u32,
    pub marital_status: MaritalStatus,
    pub blood_group: BloodGroup,
    pub cast: String,
    pub nationality: String,
    pub height: f32,
    pub weight: f32,
    pub status: DonorStatus,
    pub registered_at: DateTime<Utc>,
}

impl DonorSummary {
    pub fn from_donor(donor: &Donor) -> Self {
        Self {
            id: donor.id.clone(),
            donor_code: donor.donor_code.clone(),
            name: donor.name.clone(),
            gender: donor.gender,
            age: donor.age,
            marital_status: donor.marital_status,
            blood_group: donor.blood_group,
            cast: donor.cast.clone(),
            nationality: donor.nationality.clone(),
            height: donor.height,
            weight: donor.weight,
            status: donor.status,
            registered_at: donor.registered_at,
        }
    }
}

/// Request record joined with the summaries clients render alongside it.
#[derive(Debug, Clone, Serialize)]
pub struct RequestView {
    #[serde(flatten)]
    pub request: DonorRequest,
    pub donor: Option<DonorSummary>,
    pub doctor: PartySummary,
    pub hospital: PartySummary,
}
