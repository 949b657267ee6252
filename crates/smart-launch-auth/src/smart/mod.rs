//! SMART on FHIR implementation.
//!
//! - [`scopes`] - SMART scope grammar, matching and filtering
//! - [`launch`] - EHR launch tokens and launch context
//! - [`discovery`] - `/.well-known/smart-configuration` document

pub mod discovery;
pub mod launch;
pub mod scopes;

pub use discovery::SmartConfiguration;
pub use launch::{
    DEFAULT_LAUNCH_TOKEN_TTL, FhirContextItem, IssuedLaunchToken, LAUNCH_NAMESPACE,
    LaunchContext, LaunchContextManager, LaunchRecord, is_valid_fhir_id,
};
pub use scopes::{
    DropReason, DroppedScope, ResourceScope, Scope, ScopeError, ScopeFilterOutcome, ScopeSet,
    SpecialScope, filter_scopes_by_permissions, is_valid_scope, parse_scope, scope_covers,
};
