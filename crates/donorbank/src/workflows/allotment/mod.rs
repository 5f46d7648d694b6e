//! Donor-request allotment workflow: donor registration, candidate matching,
//! the allot/accept/reject/cancel state machine, and notification fan-out.

pub mod domain;
pub mod matching;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    BloodGroup, CriteriaRange, Donor, DonorId, DonorRegistration, DonorRequest, DonorStatus,
    Gender, MaritalStatus, MatchCriteria, MatchPass, Notification, NotificationId,
    NotificationKind, RequestId, RequestStatus, RequestSubmission,
};
pub use matching::{DonorFilter, MatchingConfig, MatchingEngine};
pub use repository::{
    AllotmentStore, Directory, DonorSummary, NotificationError, NotificationSink, PartySummary,
    RequestQuery, RequestView, StoreError,
};
pub use router::{allotment_router, AllotmentState};
pub use service::{
    AllotmentService, MatchingOutcome, NotificationFeed, RequestListing, WorkflowError,
};
