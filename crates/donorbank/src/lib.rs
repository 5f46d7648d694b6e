//! Hospital donor-bank service library: configuration, telemetry, caller
//! identity, and the donor-request allotment workflow.

pub mod config;
pub mod error;
pub mod identity;
pub mod telemetry;
pub mod workflows;
