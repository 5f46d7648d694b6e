//! Shared fixtures for the allotment workflow tests: in-memory seam
//! implementations and record builders.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use axum::Router;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::config::WorkflowConfig;
use crate::identity::{CallerIdentity, CentreId, CredentialVerifier, Role, UserId};
use crate::workflows::allotment::domain::{
    BloodGroup, CriteriaRange, Donor, DonorId, DonorRegistration, DonorRequest, DonorStatus,
    Gender, MaritalStatus, MatchCriteria, Notification, NotificationId, RequestId, RequestStatus,
    RequestSubmission,
};
use crate::workflows::allotment::matching::DonorFilter;
use crate::workflows::allotment::repository::{
    AllotmentStore, Directory, NotificationError, NotificationSink, PartySummary, RequestQuery,
    StoreError,
};
use crate::workflows::allotment::router::allotment_router;
use crate::workflows::allotment::service::AllotmentService;

#[derive(Default)]
struct MemoryStoreInner {
    requests: HashMap<RequestId, DonorRequest>,
    donors: HashMap<DonorId, Donor>,
}

/// Hash-map store with the same version-checked write semantics the service
/// expects from production storage.
#[derive(Default, Clone)]
pub(super) struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

impl AllotmentStore for MemoryStore {
    fn insert_request(&self, request: DonorRequest) -> Result<DonorRequest, StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        if inner.requests.contains_key(&request.id) {
            return Err(StoreError::Duplicate);
        }
        inner.requests.insert(request.id.clone(), request.clone());
        Ok(request)
    }

    fn fetch_request(&self, id: &RequestId) -> Result<Option<DonorRequest>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner.requests.get(id).cloned())
    }

    fn update_request(&self, mut request: DonorRequest) -> Result<DonorRequest, StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let stored = inner.requests.get(&request.id).ok_or(StoreError::Missing)?;
        if stored.version != request.version {
            return Err(StoreError::VersionConflict);
        }
        request.version += 1;
        inner.requests.insert(request.id.clone(), request.clone());
        Ok(request)
    }

    fn delete_request(&self, id: &RequestId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.requests.remove(id).map(|_| ()).ok_or(StoreError::Missing)
    }

    fn list_requests(
        &self,
        query: &RequestQuery,
        page_size: usize,
    ) -> Result<(Vec<DonorRequest>, usize), StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let mut matches: Vec<DonorRequest> = inner
            .requests
            .values()
            .filter(|request| query.matches(request))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matches.len();
        let skip = query.page.saturating_sub(1).saturating_mul(page_size);
        let page = matches.into_iter().skip(skip).take(page_size).collect();
        Ok((page, total))
    }

    fn insert_donor(&self, donor: Donor) -> Result<Donor, StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        if inner.donors.contains_key(&donor.id) {
            return Err(StoreError::Duplicate);
        }
        inner.donors.insert(donor.id.clone(), donor.clone());
        Ok(donor)
    }

    fn fetch_donor(&self, id: &DonorId) -> Result<Option<Donor>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner.donors.get(id).cloned())
    }

    fn delete_donor(&self, id: &DonorId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.donors.remove(id).map(|_| ()).ok_or(StoreError::Missing)
    }

    fn search_donors(&self, filter: &DonorFilter, limit: usize) -> Result<Vec<Donor>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let mut matches: Vec<Donor> = inner
            .donors
            .values()
            .filter(|donor| filter.accepts(donor))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.registered_at.cmp(&a.registered_at));
        matches.truncate(limit);
        Ok(matches)
    }

    fn update_pair(
        &self,
        mut request: DonorRequest,
        mut donor: Donor,
    ) -> Result<(DonorRequest, Donor), StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let stored_request = inner.requests.get(&request.id).ok_or(StoreError::Missing)?;
        if stored_request.version != request.version {
            return Err(StoreError::VersionConflict);
        }
        let stored_donor = inner.donors.get(&donor.id).ok_or(StoreError::Missing)?;
        if stored_donor.version != donor.version {
            return Err(StoreError::VersionConflict);
        }
        request.version += 1;
        donor.version += 1;
        inner.requests.insert(request.id.clone(), request.clone());
        inner.donors.insert(donor.id.clone(), donor.clone());
        Ok((request, donor))
    }
}

/// Records every published notification and serves feeds from them.
#[derive(Default, Clone)]
pub(super) struct MemorySink {
    events: Arc<Mutex<Vec<Notification>>>,
}

impl MemorySink {
    pub(super) fn events(&self) -> Vec<Notification> {
        self.events.lock().expect("sink mutex poisoned").clone()
    }
}

impl NotificationSink for MemorySink {
    fn publish(&self, notification: Notification) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("sink mutex poisoned")
            .push(notification);
        Ok(())
    }

    fn feed(&self, recipient: &UserId) -> Result<Vec<Notification>, NotificationError> {
        let events = self.events.lock().expect("sink mutex poisoned");
        Ok(events
            .iter()
            .filter(|notification| &notification.recipient == recipient)
            .cloned()
            .collect())
    }

    fn mark_read(
        &self,
        id: &NotificationId,
        recipient: &UserId,
    ) -> Result<Notification, NotificationError> {
        let mut events = self.events.lock().expect("sink mutex poisoned");
        let notification = events
            .iter_mut()
            .find(|notification| &notification.id == id)
            .ok_or(NotificationError::Missing)?;
        if &notification.recipient != recipient {
            return Err(NotificationError::WrongRecipient);
        }
        notification.is_read = true;
        Ok(notification.clone())
    }
}

/// Sink whose publish always fails, for exercising best-effort fan-out.
pub(super) struct FailingSink;

impl NotificationSink for FailingSink {
    fn publish(&self, _notification: Notification) -> Result<(), NotificationError> {
        Err(NotificationError::Unavailable("sink offline".to_string()))
    }

    fn feed(&self, _recipient: &UserId) -> Result<Vec<Notification>, NotificationError> {
        Err(NotificationError::Unavailable("sink offline".to_string()))
    }

    fn mark_read(
        &self,
        _id: &NotificationId,
        _recipient: &UserId,
    ) -> Result<Notification, NotificationError> {
        Err(NotificationError::Unavailable("sink offline".to_string()))
    }
}

/// Two admins for fan-out assertions; resolves the fixture doctor and centre.
#[derive(Clone)]
pub(super) struct MemoryDirectory {
    admins: Vec<UserId>,
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self {
            admins: vec![
                UserId("usr-admin".to_string()),
                UserId("usr-admin-2".to_string()),
            ],
        }
    }
}

impl Directory for MemoryDirectory {
    fn admin_recipients(&self) -> Vec<UserId> {
        self.admins.clone()
    }

    fn user_summary(&self, id: &UserId) -> Option<PartySummary> {
        (id.0 == "usr-doctor").then(|| PartySummary {
            id: id.0.clone(),
            name: "Dr. Kavita Sharma".to_string(),
        })
    }

    fn centre_summary(&self, id: &CentreId) -> Option<PartySummary> {
        (id.0 == "ctr-100").then(|| PartySummary {
            id: id.0.clone(),
            name: "City General Hospital".to_string(),
        })
    }
}

/// Token table for router tests.
pub(super) struct StaticVerifier {
    tokens: HashMap<String, CallerIdentity>,
}

impl Default for StaticVerifier {
    fn default() -> Self {
        let mut tokens = HashMap::new();
        tokens.insert("admin-token".to_string(), admin_caller());
        tokens.insert("doctor-token".to_string(), doctor_caller());
        tokens.insert("doctor-2-token".to_string(), second_doctor_caller());
        tokens.insert("staff-token".to_string(), staff_caller());
        Self { tokens }
    }
}

impl CredentialVerifier for StaticVerifier {
    fn verify(&self, token: &str) -> Option<CallerIdentity> {
        self.tokens.get(token).cloned()
    }
}

pub(super) fn centre() -> CentreId {
    CentreId("ctr-100".to_string())
}

pub(super) fn admin_caller() -> CallerIdentity {
    CallerIdentity {
        user_id: UserId("usr-admin".to_string()),
        role: Role::Admin,
        centre_id: Some(centre()),
    }
}

pub(super) fn doctor_caller() -> CallerIdentity {
    CallerIdentity {
        user_id: UserId("usr-doctor".to_string()),
        role: Role::Doctor,
        centre_id: Some(centre()),
    }
}

pub(super) fn second_doctor_caller() -> CallerIdentity {
    CallerIdentity {
        user_id: UserId("usr-doctor-2".to_string()),
        role: Role::Doctor,
        centre_id: Some(centre()),
    }
}

pub(super) fn staff_caller() -> CallerIdentity {
    CallerIdentity {
        user_id: UserId("usr-staff".to_string()),
        role: Role::Staff,
        centre_id: Some(centre()),
    }
}

pub(super) fn workflow_config() -> WorkflowConfig {
    WorkflowConfig {
        candidate_limit: 50,
        page_size: 10,
    }
}

/// Deterministic registration timestamps so ordering assertions are stable.
pub(super) fn registered_at(offset: usize) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 1, 8, 0, 0)
        .single()
        .expect("valid timestamp")
        + Duration::minutes(offset as i64)
}

/// Donor fixture matching the criteria of [`submission`]. Later indices
/// register later.
pub(super) fn donor(index: usize) -> Donor {
    Donor {
        id: DonorId(format!("dnr-fixture-{index:03}")),
        donor_code: format!("DNR-9{index:03}"),
        name: format!("Donor {index}"),
        phone: "98200-00000".to_string(),
        gender: Gender::Female,
        age: 28,
        marital_status: MaritalStatus::Married,
        blood_group: BloodGroup::OPositive,
        cast: "Sharma".to_string(),
        nationality: "Indian".to_string(),
        height: 162.0,
        weight: 58.0,
        skin_color: "Wheatish".to_string(),
        hair_color: "Black".to_string(),
        eye_color: "Brown".to_string(),
        donor_education: "Graduate".to_string(),
        medical_notes: None,
        status: DonorStatus::Active,
        is_allotted: false,
        allotted_to_request: None,
        allotted_by_request: None,
        allotted_by_doctor: None,
        registered_by: UserId("usr-staff".to_string()),
        registered_at: registered_at(index),
        version: 0,
    }
}

/// Submission whose criteria the default [`donor`] fixture satisfies.
pub(super) fn submission() -> RequestSubmission {
    RequestSubmission {
        gender: Gender::Female,
        age_range: CriteriaRange { min: 25, max: 32 },
        marital_status: MaritalStatus::Married,
        cast: "Sharma".to_string(),
        blood_group: BloodGroup::OPositive,
        nationality: "Indian".to_string(),
        height_range: CriteriaRange {
            min: 150.0,
            max: 170.0,
        },
        weight_range: CriteriaRange {
            min: 45.0,
            max: 70.0,
        },
        skin_color: "Wheatish".to_string(),
        hair_color: "Black".to_string(),
        eye_color: "Brown".to_string(),
        donor_education: "Graduate".to_string(),
        doctor_id: UserId("usr-doctor".to_string()),
        required_by_date: NaiveDate::from_ymd_opt(2025, 12, 1).expect("valid date"),
    }
}

pub(super) fn registration() -> DonorRegistration {
    DonorRegistration {
        name: "Aisha Verma".to_string(),
        phone: "98200-11111".to_string(),
        gender: Gender::Female,
        age: 27,
        marital_status: MaritalStatus::Married,
        blood_group: BloodGroup::OPositive,
        cast: "Sharma".to_string(),
        nationality: "Indian".to_string(),
        height: 160.0,
        weight: 54.0,
        skin_color: "Wheatish".to_string(),
        hair_color: "Black".to_string(),
        eye_color: "Brown".to_string(),
        donor_education: "Graduate".to_string(),
        medical_notes: None,
    }
}

/// A pending request stored directly, bypassing the service, so tests can
/// control the criteria precisely.
pub(super) fn stored_request(id: &str, criteria: MatchCriteria) -> DonorRequest {
    DonorRequest {
        id: RequestId(id.to_string()),
        criteria,
        doctor_id: UserId("usr-doctor".to_string()),
        hospital_id: centre(),
        required_by_date: NaiveDate::from_ymd_opt(2025, 12, 1).expect("valid date"),
        status: RequestStatus::Pending,
        is_allotted: false,
        allotted_to: None,
        allotted_donors: Default::default(),
        allotted_at: None,
        accepted_at: None,
        created_by: UserId("usr-doctor".to_string()),
        created_at: Utc::now(),
        version: 0,
    }
}

pub(super) type TestService = AllotmentService<MemoryStore, MemoryDirectory, MemorySink>;

pub(super) fn build_service() -> (TestService, Arc<MemoryStore>, Arc<MemorySink>) {
    build_service_with_config(workflow_config())
}

pub(super) fn build_service_with_config(
    config: WorkflowConfig,
) -> (TestService, Arc<MemoryStore>, Arc<MemorySink>) {
    let store = Arc::new(MemoryStore::default());
    let notifications = Arc::new(MemorySink::default());
    let service = AllotmentService::new(
        store.clone(),
        Arc::new(MemoryDirectory::default()),
        notifications.clone(),
        config,
    );
    (service, store, notifications)
}

pub(super) fn seed_donor(store: &MemoryStore, donor: Donor) -> Donor {
    store.insert_donor(donor).expect("donor seeded")
}

/// Creates a request through the service as the fixture doctor and returns
/// its id.
pub(super) fn create_request(service: &TestService) -> RequestId {
    let view = service
        .create_request(&doctor_caller(), submission())
        .expect("request created");
    view.request.id.clone()
}

pub(super) fn build_app() -> (Router, Arc<MemoryStore>, Arc<MemorySink>) {
    let store = Arc::new(MemoryStore::default());
    let notifications = Arc::new(MemorySink::default());
    let service = Arc::new(AllotmentService::new(
        store.clone(),
        Arc::new(MemoryDirectory::default()),
        notifications.clone(),
        workflow_config(),
    ));
    let router = allotment_router(service, Arc::new(StaticVerifier::default()));
    (router, store, notifications)
}

pub(super) fn authorized_request(
    method: &str,
    uri: &str,
    token: &str,
    body: Option<Value>,
) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"));
    match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .expect("request built"),
        None => builder.body(Body::empty()).expect("request built"),
    }
}

pub(super) fn anonymous_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request built")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body read");
    serde_json::from_slice(&bytes).expect("json body")
}
