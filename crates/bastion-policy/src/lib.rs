//! Bastion Policy -- allow-profile and deny-blacklist filtering.
//!
//! Raw rule findings pass through two independent override layers:
//!
//! 1. a [`Profile`] (allow-list): only violations from listed rules survive;
//! 2. a [`Blacklist`] (deny-list): violations from listed rules are dropped,
//!    even when the profile allows them.
//!
//! [`ViolationFilter`] holds both definitions, parsed once, and never fails:
//! a broken definition turns into a FATAL violation appended to the
//! unfiltered list.

pub mod blacklist;
pub mod filter;
pub mod profile;

pub use blacklist::{Blacklist, Suppression};
pub use filter::{apply_blacklist, apply_profile, filter_violations, ViolationFilter};
pub use profile::Profile;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Which override layer a definition belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    Profile,
    Blacklist,
}

impl std::fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Profile => "profile",
            Self::Blacklist => "blacklist",
        })
    }
}

/// Errors raised while parsing or validating a profile or blacklist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    /// The definition names a rule that is not loaded.
    #[error("{definition}: {rule_id} is not a legal rule identifier from: {legal}")]
    UnknownRule {
        definition: DefinitionKind,
        rule_id: String,
        /// Comma-separated list of loaded rule ids.
        legal: String,
    },

    /// The definition text could not be parsed.
    #[error("{definition} parse error: {message}")]
    Syntax {
        definition: DefinitionKind,
        message: String,
    },
}
