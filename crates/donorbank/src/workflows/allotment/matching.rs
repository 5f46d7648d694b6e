//! Candidate matching for donor requests.
//!
//! Matching runs in two passes. The primary pass enforces every criterion
//! present on the request; when it returns nothing, a fallback pass retries
//! with only gender and blood group so staff still get a starting point.

use super::domain::{Donor, MatchCriteria};

/// Dials for the candidate search.
#[derive(Debug, Clone, Copy)]
pub struct MatchingConfig {
    pub candidate_limit: usize,
}

/// Builds the filters the store executes against the donor pool.
#[derive(Debug, Clone)]
pub struct MatchingEngine {
    config: MatchingConfig,
}

impl MatchingEngine {
    pub fn new(config: MatchingConfig) -> Self {
        Self { config }
    }

    pub fn candidate_limit(&self) -> usize {
        self.config.candidate_limit
    }

    /// Filter enforcing every criterion present on the request.
    pub fn primary_filter(&self, criteria: &MatchCriteria) -> DonorFilter {
        DonorFilter {
            criteria: criteria.clone(),
        }
    }

    /// Relaxed filter keeping only gender and blood group.
    pub fn fallback_filter(&self, criteria: &MatchCriteria) -> DonorFilter {
        DonorFilter {
            criteria: criteria.relaxed(),
        }
    }
}

/// Predicate deciding whether a donor satisfies a request's criteria. Base
/// eligibility always applies: the donor must be unattached and in an
/// available status.
#[derive(Debug, Clone)]
pub struct DonorFilter {
    criteria: MatchCriteria,
}

impl DonorFilter {
    pub fn accepts(&self, donor: &Donor) -> bool {
        if donor.is_allotted || !donor.status.is_available() {
            return false;
        }

        let criteria = &self.criteria;
        if let Some(gender) = criteria.gender {
            if donor.gender != gender {
                return false;
            }
        }
        if let Some(range) = criteria.age_range {
            if !range.contains(donor.age) {
                return false;
            }
        }
        if let Some(status) = criteria.marital_status {
            if donor.marital_status != status {
                return false;
            }
        }
        if let Some(group) = criteria.blood_group {
            if donor.blood_group != group {
                return false;
            }
        }
        if let Some(range) = criteria.height_range {
            if !range.contains(donor.height) {
                return false;
            }
        }
        if let Some(range) = criteria.weight_range {
            if !range.contains(donor.weight) {
                return false;
            }
        }

        let text_criteria = [
            (&criteria.cast, &donor.cast),
            (&criteria.nationality, &donor.nationality),
            (&criteria.skin_color, &donor.skin_color),
            (&criteria.hair_color, &donor.hair_color),
            (&criteria.eye_color, &donor.eye_color),
            (&criteria.donor_education, &donor.donor_education),
        ];
        for (wanted, actual) in text_criteria {
            if let Some(wanted) = wanted {
                if !contains_ci(actual, wanted) {
                    return false;
                }
            }
        }

        true
    }
}

/// Case-insensitive substring containment used for the free-text criteria.
pub(crate) fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
