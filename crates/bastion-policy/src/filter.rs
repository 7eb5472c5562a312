//! Two-stage violation filtering.
//!
//! The profile stage runs first and keeps only allowed ids; the blacklist
//! stage then drops suppressed ids. A rule listed in both is suppressed.

use tracing::{debug, warn};

use bastion_rules::{RuleSet, Violation};

use crate::{Blacklist, FilterError, Profile};

// ---------------------------------------------------------------------------
// Pure stages
// ---------------------------------------------------------------------------

/// Keeps violations whose id the profile allows. `None` keeps everything.
#[must_use]
pub fn apply_profile(violations: Vec<Violation>, profile: Option<&Profile>) -> Vec<Violation> {
    match profile {
        Some(profile) => violations
            .into_iter()
            .filter(|v| profile.allows(v.id()))
            .collect(),
        None => violations,
    }
}

/// Drops violations whose id the blacklist suppresses. `None` drops nothing.
#[must_use]
pub fn apply_blacklist(violations: Vec<Violation>, blacklist: Option<&Blacklist>) -> Vec<Violation> {
    match blacklist {
        Some(blacklist) => violations
            .into_iter()
            .filter(|v| !blacklist.suppresses(v.id()))
            .collect(),
        None => violations,
    }
}

/// Runs the profile stage and then the blacklist stage. Order is preserved.
#[must_use]
pub fn filter_violations(
    violations: Vec<Violation>,
    profile: Option<&Profile>,
    blacklist: Option<&Blacklist>,
) -> Vec<Violation> {
    apply_blacklist(apply_profile(violations, profile), blacklist)
}

// ---------------------------------------------------------------------------
// ViolationFilter
// ---------------------------------------------------------------------------

/// Holds the profile and blacklist an engine applies to every file.
///
/// Definitions are parsed once, at construction. A definition that fails to
/// parse is kept as its error; [`apply`](Self::apply) then reports it as a
/// FATAL violation on every file instead of filtering.
#[derive(Debug, Clone, Default)]
pub struct ViolationFilter {
    profile: Option<Result<Profile, FilterError>>,
    blacklist: Option<Result<Blacklist, FilterError>>,
}

impl ViolationFilter {
    /// A filter that passes every violation through.
    #[must_use]
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Builds a filter from already-parsed definitions.
    #[must_use]
    pub fn new(profile: Option<Profile>, blacklist: Option<Blacklist>) -> Self {
        Self {
            profile: profile.map(Ok),
            blacklist: blacklist.map(Ok),
        }
    }

    /// Parses profile and blacklist text against the loaded rules.
    ///
    /// Never fails; see [`configuration_error`](Self::configuration_error).
    #[must_use]
    pub fn from_definitions(
        profile_text: Option<&str>,
        blacklist_text: Option<&str>,
        rules: &RuleSet,
    ) -> Self {
        let filter = Self {
            profile: profile_text.map(|text| Profile::parse(text, rules)),
            blacklist: blacklist_text.map(|text| Blacklist::parse(text, rules)),
        };
        if let Some(err) = filter.configuration_error() {
            warn!(error = %err, "violation filter is misconfigured; results will be unfiltered");
        }
        filter
    }

    /// The first definition error, profile before blacklist.
    #[must_use]
    pub fn configuration_error(&self) -> Option<&FilterError> {
        self.stages().err()
    }

    /// Filters `violations`.
    ///
    /// On a misconfigured filter the input is returned unchanged with one
    /// FATAL violation appended.
    #[must_use]
    pub fn apply(&self, violations: Vec<Violation>) -> Vec<Violation> {
        match self.stages() {
            Ok((profile, blacklist)) => {
                let before = violations.len();
                let kept = filter_violations(violations, profile, blacklist);
                debug!(before, after = kept.len(), "violations filtered");
                kept
            }
            Err(err) => {
                let mut unfiltered = violations;
                unfiltered.push(Violation::fatal(err.to_string()));
                unfiltered
            }
        }
    }

    fn stages(&self) -> Result<(Option<&Profile>, Option<&Blacklist>), &FilterError> {
        let profile = match &self.profile {
            Some(Ok(profile)) => Some(profile),
            Some(Err(err)) => return Err(err),
            None => None,
        };
        let blacklist = match &self.blacklist {
            Some(Ok(blacklist)) => Some(blacklist),
            Some(Err(err)) => return Err(err),
            None => None,
        };
        Ok((profile, blacklist))
    }
}
