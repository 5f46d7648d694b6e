use donorbank::config::WorkflowConfig;
use donorbank::identity::{CallerIdentity, CentreId, CredentialVerifier, Role, UserId};
use donorbank::workflows::allotment::domain::{
    Donor, DonorId, DonorRequest, Notification, NotificationId, RequestId,
};
use donorbank::workflows::allotment::matching::DonorFilter;
use donorbank::workflows::allotment::repository::{
    AllotmentStore, Directory, NotificationError, NotificationSink, PartySummary, RequestQuery,
    StoreError,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default)]
struct StoreInner {
    requests: HashMap<RequestId, DonorRequest>,
    donors: HashMap<DonorId, Donor>,
}

/// Process-local store backing the service until persistent storage lands.
/// Writes are conditional on the record version seen by the caller.
#[derive(Default, Clone)]
pub(crate) struct InMemoryAllotmentStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl AllotmentStore for InMemoryAllotmentStore {
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

/// Notification fan-out kept in process memory; the feed endpoints read the
/// same queue the service writes.
#[derive(Default, Clone)]
pub(crate) struct InMemoryNotificationSink {
    events: Arc<Mutex<Vec<Notification>>>,
}

impl NotificationSink for InMemoryNotificationSink {
    fn publish(&self, notification: Notification) -> Result<(), NotificationError> {
        let mut events = self.events.lock().expect("sink mutex poisoned");
        events.push(notification);
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

struct DirectoryAccount {
    user_id: UserId,
    name: String,
    role: Role,
    centre_id: Option<CentreId>,
    token: String,
}

/// Fixed account directory standing in for the hospital's identity provider.
/// Doubles as the credential verifier: each account carries one bearer token.
pub(crate) struct StaticDirectory {
    accounts: Vec<DirectoryAccount>,
    centres: Vec<(CentreId, String)>,
}

impl StaticDirectory {
    /// Accounts and centres the serve and demo commands start with.
    pub(crate) fn demo() -> Arc<Self> {
        let centre = CentreId("ctr-001".to_string());
        let accounts = vec![
            DirectoryAccount {
                user_id: UserId("usr-admin-1".to_string()),
                name: "Meera Pillai".to_string(),
                role: Role::Admin,
                centre_id: Some(centre.clone()),
                token: "admin-token".to_string(),
            },
            DirectoryAccount {
                user_id: UserId("usr-admin-2".to_string()),
                name: "Arjun Rao".to_string(),
                role: Role::Admin,
                centre_id: Some(centre.clone()),
                token: "admin-token-2".to_string(),
            },
            DirectoryAccount {
                user_id: UserId("usr-doctor-1".to_string()),
                name: "Dr. Kavita Sharma".to_string(),
                role: Role::Doctor,
                centre_id: Some(centre.clone()),
                token: "doctor-token".to_string(),
            },
            DirectoryAccount {
                user_id: UserId("usr-staff-1".to_string()),
                name: "Rohan Gupta".to_string(),
                role: Role::Staff,
                centre_id: Some(centre.clone()),
                token: "staff-token".to_string(),
            },
        ];
        Arc::new(Self {
            accounts,
            centres: vec![(centre, "City General Hospital".to_string())],
        })
    }
}

impl Directory for StaticDirectory {
    fn admin_recipients(&self) -> Vec<UserId> {
        self.accounts
            .iter()
            .filter(|account| account.role == Role::Admin)
            .map(|account| account.user_id.clone())
            .collect()
    }

    fn user_summary(&self, id: &UserId) -> Option<PartySummary> {
        self.accounts
            .iter()
            .find(|account| &account.user_id == id)
            .map(|account| PartySummary {
                id: account.user_id.0.clone(),
                name: account.name.clone(),
            })
    }

    fn centre_summary(&self, id: &CentreId) -> Option<PartySummary> {
        self.centres
            .iter()
            .find(|(centre_id, _)| centre_id == id)
            .map(|(centre_id, name)| PartySummary {
                id: centre_id.0.clone(),
                name: name.clone(),
            })
    }
}

impl CredentialVerifier for StaticDirectory {
    fn verify(&self, token: &str) -> Option<CallerIdentity> {
        self.accounts
            .iter()
            .find(|account| account.token == token)
            .map(|account| CallerIdentity {
                user_id: account.user_id.clone(),
                role: account.role,
                centre_id: account.centre_id.clone(),
            })
    }
}

pub(crate) fn demo_workflow_config() -> WorkflowConfig {
    WorkflowConfig {
        candidate_limit: 25,
        page_size: 10,
    }
}
