//! Workflow modules grouped by hospital-administration domain.

pub mod allotment;
