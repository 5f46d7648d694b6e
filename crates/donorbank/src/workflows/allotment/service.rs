//! Orchestration for the allotment workflow: request intake, candidate
//! matching, the allot/accept/reject/cancel state machine, and notification
//! fan-out.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use crate::config::WorkflowConfig;
use crate::identity::{CallerIdentity, IdentityError, Role, UserId};

use super::domain::{
    Donor, DonorId, DonorRegistration, DonorRequest, DonorStatus, MatchCriteria, MatchPass,
    Notification, NotificationId, NotificationKind, RequestId, RequestStatus, RequestSubmission,
};
use super::matching::{MatchingConfig, MatchingEngine};
use super::repository::{
    AllotmentStore, Directory, DonorSummary, NotificationError, NotificationSink, PartySummary,
    RequestQuery, RequestView, StoreError,
};

static REQUEST_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static DONOR_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static NOTIFICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> RequestId {
    let id = REQUEST_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    RequestId(format!("req-{id:06}"))
}

fn next_donor_identity() -> (DonorId, String) {
    let id = DONOR_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    (DonorId(format!("dnr-{id:06}")), format!("DNR-{id:04}"))
}

fn next_notification_id() -> NotificationId {
    let id = NOTIFICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    NotificationId(format!("ntf-{id:06}"))
}

/// Errors surfaced by workflow operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("{0}")]
    Forbidden(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{0}")]
    BadState(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for WorkflowError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Duplicate => WorkflowError::Conflict("record already exists".to_string()),
            StoreError::Missing => {
                WorkflowError::Conflict("record was removed by a concurrent operation".to_string())
            }
            StoreError::VersionConflict => {
                WorkflowError::Conflict("record changed concurrently, retry".to_string())
            }
            StoreError::Unavailable(detail) => WorkflowError::Unavailable(detail),
        }
    }
}

/// Candidate listing produced by the matching endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct MatchingOutcome {
    pub donors: Vec<DonorSummary>,
    pub total: usize,
    pub criteria: MatchCriteria,
    pub pass: MatchPass,
}

/// One page of request views plus paging bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct RequestListing {
    pub requests: Vec<RequestView>,
    pub total: usize,
    pub page: usize,
    pub pages: usize,
}

/// A recipient's notifications, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationFeed {
    pub notifications: Vec<Notification>,
    pub unread: usize,
}

/// Workflow façade wired over the storage, directory, and notification seams.
pub struct AllotmentService<S, D, N> {
    store: Arc<S>,
    directory: Arc<D>,
    notifications: Arc<N>,
    engine: MatchingEngine,
    page_size: usize,
}

impl<S, D, N> AllotmentService<S, D, N>
where
    S: AllotmentStore,
    D: Directory,
    N: NotificationSink,
{
    pub fn new(
        store: Arc<S>,
        directory: Arc<D>,
        notifications: Arc<N>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            store,
            directory,
            notifications,
            engine: MatchingEngine::new(MatchingConfig {
                candidate_limit: config.candidate_limit,
            }),
            page_size: config.page_size,
        }
    }

    /// Registers a new donor request and fans a notification out to every
    /// admin. The hospital is taken from the caller's centre association.
    pub fn create_request(
        &self,
        caller: &CallerIdentity,
        submission: RequestSubmission,
    ) -> Result<RequestView, WorkflowError> {
        if !matches!(caller.role, Role::Doctor | Role::Admin) {
            return Err(WorkflowError::Forbidden(
                "only doctors or admins may submit donor requests".to_string(),
            ));
        }
        let hospital_id = caller.centre_id.clone().ok_or_else(|| {
            WorkflowError::Validation(
                "caller has no hospital association to submit requests for".to_string(),
            )
        })?;
        submission.validate().map_err(WorkflowError::Validation)?;

        let criteria = submission.criteria();
        let request = DonorRequest {
            id: next_request_id(),
            criteria,
            doctor_id: submission.doctor_id,
            hospital_id,
            required_by_date: submission.required_by_date,
            status: RequestStatus::Pending,
            is_allotted: false,
            allotted_to: None,
            allotted_donors: BTreeSet::new(),
            allotted_at: None,
            accepted_at: None,
            created_by: caller.user_id.clone(),
            created_at: Utc::now(),
            version: 0,
        };
        let request = self.store.insert_request(request)?;

        let admins = self.directory.admin_recipients();
        self.notify(
            NotificationKind::DonorRequestCreated,
            "New donor request",
            format!("Donor request {} is awaiting donor matching", request.id.0),
            &admins,
            &caller.user_id,
            Some(request.id.0.clone()),
        );

        Ok(self.view(request))
    }

    pub fn get_request(&self, request_id: &RequestId) -> Result<RequestView, WorkflowError> {
        let request = self.fetch_request(request_id)?;
        Ok(self.view(request))
    }

    pub fn list_requests(&self, query: RequestQuery) -> Result<RequestListing, WorkflowError> {
        let (records, total) = self.store.list_requests(&query, self.page_size)?;
        let pages = total.div_ceil(self.page_size);
        let requests = records.into_iter().map(|record| self.view(record)).collect();
        Ok(RequestListing {
            requests,
            total,
            page: query.page,
            pages,
        })
    }

    /// Runs the primary matching pass and, when it comes back empty, the
    /// relaxed fallback pass.
    pub fn matching_donors(&self, request_id: &RequestId) -> Result<MatchingOutcome, WorkflowError> {
        let request = self.fetch_request(request_id)?;
        let limit = self.engine.candidate_limit();

        let primary = self.engine.primary_filter(&request.criteria);
        let mut donors = self.store.search_donors(&primary, limit)?;
        let mut pass = MatchPass::Primary;
        if donors.is_empty() {
            let fallback = self.engine.fallback_filter(&request.criteria);
            donors = self.store.search_donors(&fallback, limit)?;
            pass = MatchPass::Fallback;
        }

        let donors: Vec<DonorSummary> = donors.iter().map(DonorSummary::from_donor).collect();
        let total = donors.len();
        Ok(MatchingOutcome {
            donors,
            total,
            criteria: request.criteria,
            pass,
        })
    }

    /// Attaches a donor to a pending request. Both records move together or
    /// not at all; a concurrent transition surfaces as a conflict.
    pub fn allot(
        &self,
        caller: &CallerIdentity,
        request_id: &RequestId,
        donor_id: &DonorId,
    ) -> Result<RequestView, WorkflowError> {
        let mut request = self.fetch_request(request_id)?;
        let mut donor = self.fetch_donor(donor_id)?;

        if request.is_allotted || request.status != RequestStatus::Pending {
            return Err(WorkflowError::Conflict(format!(
                "donor request {} already has an allotment in progress",
                request.id.0
            )));
        }
        if donor.is_allotted {
            return Err(WorkflowError::Conflict(format!(
                "donor {} is already allotted to another request",
                donor.id.0
            )));
        }
        if !donor.status.is_available() {
            return Err(WorkflowError::Conflict(format!(
                "donor {} is not available for allotment (status {})",
                donor.id.0,
                donor.status.label()
            )));
        }

        request.is_allotted = true;
        request.allotted_to = Some(donor.id.clone());
        request.allotted_donors.insert(donor.id.clone());
        request.allotted_at = Some(Utc::now());
        request.status = RequestStatus::Approved;

        donor.is_allotted = true;
        donor.status = DonorStatus::Allotted;
        donor.allotted_to_request = Some(request.id.clone());
        donor.allotted_by_request = Some(request.id.clone());

        let (request, donor) = self.store.update_pair(request, donor)?;

        self.notify(
            NotificationKind::DonorAllotted,
            "Donor allotted",
            format!(
                "Donor {} was allotted to request {}",
                donor.donor_code, request.id.0
            ),
            std::slice::from_ref(&request.created_by),
            &caller.user_id,
            Some(request.id.0.clone()),
        );

        Ok(self.view(request))
    }

    /// Confirms the allotted donor. Only the request creator may accept, and
    /// only while an allotment is awaiting a decision.
    pub fn accept_donor(
        &self,
        caller: &CallerIdentity,
        request_id: &RequestId,
    ) -> Result<RequestView, WorkflowError> {
        let mut request = self.fetch_request(request_id)?;
        if request.created_by != caller.user_id {
            return Err(WorkflowError::Forbidden(
                "only the request creator may accept the allotted donor".to_string(),
            ));
        }
        if !request.is_allotted || request.status != RequestStatus::Approved {
            return Err(WorkflowError::BadState(
                "donor request has no allotment awaiting a decision".to_string(),
            ));
        }
        let donor_id = request.allotted_to.clone().ok_or_else(|| {
            WorkflowError::BadState("donor request has no allotted donor".to_string())
        })?;
        let mut donor = self.fetch_donor(&donor_id)?;

        request.status = RequestStatus::Accepted;
        request.accepted_at = Some(Utc::now());

        // The donor stays attached; only the status settles and the doctor
        // the donor was accepted for is recorded.
        donor.status = DonorStatus::Active;
        donor.allotted_by_doctor = Some(request.doctor_id.clone());

        let (request, donor) = self.store.update_pair(request, donor)?;

        self.notify(
            NotificationKind::AllotmentAccepted,
            "Allotted donor accepted",
            format!(
                "Request {} accepted donor {}",
                request.id.0, donor.donor_code
            ),
            &self.directory.admin_recipients(),
            &caller.user_id,
            Some(request.id.0.clone()),
        );

        Ok(self.view(request))
    }

    /// Declines the allotted donor and returns it to the pool. The request
    /// keeps the donor in its allotment history and goes back to pending.
    pub fn reject_donor(
        &self,
        caller: &CallerIdentity,
        request_id: &RequestId,
    ) -> Result<RequestView, WorkflowError> {
        let mut request = self.fetch_request(request_id)?;
        if request.created_by != caller.user_id {
            return Err(WorkflowError::Forbidden(
                "only the request creator may reject the allotted donor".to_string(),
            ));
        }
        if !request.is_allotted || request.status != RequestStatus::Approved {
            return Err(WorkflowError::BadState(
                "donor request has no allotment awaiting a decision".to_string(),
            ));
        }
        let donor_id = request.allotted_to.clone().ok_or_else(|| {
            WorkflowError::BadState("donor request has no allotted donor".to_string())
        })?;
        let mut donor = self.fetch_donor(&donor_id)?;

        Self::reset_request(&mut request);
        Self::free_donor(&mut donor);

        let (request, donor) = self.store.update_pair(request, donor)?;

        self.notify(
            NotificationKind::AllotmentRejected,
            "Allotted donor rejected",
            format!(
                "Request {} rejected donor {}; the donor returned to the pool",
                request.id.0, donor.donor_code
            ),
            &self.directory.admin_recipients(),
            &caller.user_id,
            Some(request.id.0.clone()),
        );

        Ok(self.view(request))
    }

    /// Unconditionally resets the request to pending, freeing the attached
    /// donor if there is one and clearing the allotment history. Any
    /// authenticated caller may cancel.
    pub fn cancel_allotment(
        &self,
        caller: &CallerIdentity,
        request_id: &RequestId,
    ) -> Result<RequestView, WorkflowError> {
        let mut request = self.fetch_request(request_id)?;
        let attached = request.allotted_to.clone();

        Self::reset_request(&mut request);
        request.allotted_donors.clear();

        let request = match attached {
            Some(donor_id) => match self.store.fetch_donor(&donor_id)? {
                Some(mut donor) => {
                    Self::free_donor(&mut donor);
                    let (request, _donor) = self.store.update_pair(request, donor)?;
                    request
                }
                None => self.store.update_request(request)?,
            },
            None => self.store.update_request(request)?,
        };

        self.notify(
            NotificationKind::AllotmentCancelled,
            "Allotment cancelled",
            format!("Allotment on request {} was cancelled", request.id.0),
            std::slice::from_ref(&request.created_by),
            &caller.user_id,
            Some(request.id.0.clone()),
        );

        Ok(self.view(request))
    }

    pub fn delete_request(
        &self,
        caller: &CallerIdentity,
        request_id: &RequestId,
    ) -> Result<(), WorkflowError> {
        if caller.role != Role::Admin {
            return Err(WorkflowError::Forbidden(
                "only admins may delete donor requests".to_string(),
            ));
        }
        let request = self.fetch_request(request_id)?;
        if let Some(donor_id) = request.allotted_to.clone() {
            if let Some(mut donor) = self.store.fetch_donor(&donor_id)? {
                let mut request = request;
                Self::reset_request(&mut request);
                Self::free_donor(&mut donor);
                self.store.update_pair(request, donor)?;
            }
        }
        self.store.delete_request(request_id)?;
        Ok(())
    }

    /// Registers a donor into the pool with a fresh registration code.
    pub fn register_donor(
        &self,
        caller: &CallerIdentity,
        registration: DonorRegistration,
    ) -> Result<Donor, WorkflowError> {
        if !matches!(caller.role, Role::Staff | Role::Admin) {
            return Err(WorkflowError::Forbidden(
                "only staff or admins may register donors".to_string(),
            ));
        }
        registration.validate().map_err(WorkflowError::Validation)?;

        let (id, donor_code) = next_donor_identity();
        let donor = Donor {
            id,
            donor_code,
            name: registration.name,
            phone: registration.phone,
            gender: registration.gender,
            age: registration.age,
            marital_status: registration.marital_status,
            blood_group: registration.blood_group,
            cast: registration.cast,
            nationality: registration.nationality,
            height: registration.height,
            weight: registration.weight,
            skin_color: registration.skin_color,
            hair_color: registration.hair_color,
            eye_color: registration.eye_color,
            donor_education: registration.donor_education,
            medical_notes: registration.medical_notes,
            status: DonorStatus::Active,
            is_allotted: false,
            allotted_to_request: None,
            allotted_by_request: None,
            allotted_by_doctor: None,
            registered_by: caller.user_id.clone(),
            registered_at: Utc::now(),
            version: 0,
        };
        Ok(self.store.insert_donor(donor)?)
    }

    /// Full donor record, contact details included, for back-office roles.
    pub fn get_donor(
        &self,
        caller: &CallerIdentity,
        donor_id: &DonorId,
    ) -> Result<Donor, WorkflowError> {
        if !matches!(caller.role, Role::Staff | Role::Admin) {
            return Err(WorkflowError::Forbidden(
                "only staff or admins may view donor records".to_string(),
            ));
        }
        self.fetch_donor(donor_id)
    }

    pub fn delete_donor(
        &self,
        caller: &CallerIdentity,
        donor_id: &DonorId,
    ) -> Result<(), WorkflowError> {
        if caller.role != Role::Admin {
            return Err(WorkflowError::Forbidden(
                "only admins may delete donors".to_string(),
            ));
        }
        let donor = self.fetch_donor(donor_id)?;
        if let Some(request_id) = donor.allotted_to_request.clone() {
            if let Some(mut request) = self.store.fetch_request(&request_id)? {
                let mut donor = donor;
                Self::reset_request(&mut request);
                Self::free_donor(&mut donor);
                self.store.update_pair(request, donor)?;
            }
        }
        self.store.delete_donor(donor_id)?;
        Ok(())
    }

    pub fn notifications_feed(
        &self,
        caller: &CallerIdentity,
    ) -> Result<NotificationFeed, WorkflowError> {
        let mut notifications = self
            .notifications
            .feed(&caller.user_id)
            .map_err(Self::sink_error)?;
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let unread = notifications.iter().filter(|n| !n.is_read).count();
        Ok(NotificationFeed {
            notifications,
            unread,
        })
    }

    pub fn mark_notification_read(
        &self,
        caller: &CallerIdentity,
        notification_id: &NotificationId,
    ) -> Result<Notification, WorkflowError> {
        match self.notifications.mark_read(notification_id, &caller.user_id) {
            Ok(notification) => Ok(notification),
            Err(NotificationError::Missing) => Err(WorkflowError::NotFound {
                entity: "notification",
                id: notification_id.0.clone(),
            }),
            Err(NotificationError::WrongRecipient) => Err(WorkflowError::Forbidden(
                "notification belongs to another recipient".to_string(),
            )),
            Err(other) => Err(Self::sink_error(other)),
        }
    }

    fn fetch_request(&self, id: &RequestId) -> Result<DonorRequest, WorkflowError> {
        self.store
            .fetch_request(id)?
            .ok_or_else(|| WorkflowError::NotFound {
                entity: "donor request",
                id: id.0.clone(),
            })
    }

    fn fetch_donor(&self, id: &DonorId) -> Result<Donor, WorkflowError> {
        self.store
            .fetch_donor(id)?
            .ok_or_else(|| WorkflowError::NotFound {
                entity: "donor",
                id: id.0.clone(),
            })
    }

    fn free_donor(donor: &mut Donor) {
        donor.is_allotted = false;
        donor.status = DonorStatus::Active;
        donor.allotted_to_request = None;
        donor.allotted_by_request = None;
        donor.allotted_by_doctor = None;
    }

    fn reset_request(request: &mut DonorRequest) {
        request.is_allotted = false;
        request.allotted_to = None;
        request.allotted_at = None;
        request.accepted_at = None;
        request.status = RequestStatus::Pending;
    }

    // Fan-out is best effort: a failed delivery is logged and never fails
    // the operation that triggered it.
    fn notify(
        &self,
        kind: NotificationKind,
        title: &str,
        message: String,
        recipients: &[UserId],
        sender: &UserId,
        related: Option<String>,
    ) {
        for recipient in recipients {
            let notification = Notification {
                id: next_notification_id(),
                kind,
                title: title.to_string(),
                message: message.clone(),
                recipient: recipient.clone(),
                sender: sender.clone(),
                related: related.clone(),
                is_read: false,
                created_at: Utc::now(),
            };
            if let Err(error) = self.notifications.publish(notification) {
                warn!(%error, recipient = %recipient.0, "notification fan-out failed");
            }
        }
    }

    fn sink_error(error: NotificationError) -> WorkflowError {
        WorkflowError::Unavailable(format!("notification channel: {error}"))
    }

    fn view(&self, request: DonorRequest) -> RequestView {
        let donor = request.allotted_to.as_ref().and_then(|id| {
            self.store
                .fetch_donor(id)
                .ok()
                .flatten()
                .map(|donor| DonorSummary::from_donor(&donor))
        });
        let doctor = self
            .directory
            .user_summary(&request.doctor_id)
            .unwrap_or_else(|| PartySummary::unresolved(request.doctor_id.0.clone()));
        let hospital = self
            .directory
            .centre_summary(&request.hospital_id)
            .unwrap_or_else(|| PartySummary::unresolved(request.hospital_id.0.clone()));
        RequestView {
            request,
            donor,
            doctor,
            hospital,
        }
    }
}
