//! SMART on FHIR scope parsing, matching and filtering.
//!
//! # Scope Format
//!
//! Resource scopes follow `context/ResourceType.action`:
//!
//! - **Context**: `patient`, `user`, or `system`
//! - **ResourceType**: a FHIR resource type name (e.g. `Observation`) or `*`
//! - **Action**: `read`, `write`, or `*`
//!
//! The special scopes `openid`, `profile`, `fhirUser`, `launch`,
//! `launch/patient`, `launch/encounter` and `offline_access` are matched by
//! exact name only.
//!
//! # Examples
//!
//! ```
//! use smart_launch_auth::smart::scopes::{filter_scopes_by_permissions, scope_covers, ScopeSet};
//!
//! assert!(scope_covers("patient/*.read", "patient/Observation.read"));
//! assert!(!scope_covers("patient/Observation.read", "patient/*.read"));
//!
//! let allowed = ScopeSet::parse("patient/*.read launch/patient").unwrap();
//! let outcome = filter_scopes_by_permissions("patient/Observation.read bogus user/Patient.write", &allowed);
//! assert_eq!(outcome.granted.to_string(), "patient/Observation.read");
//! assert_eq!(outcome.dropped.len(), 2);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during scope parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// The scope string is empty.
    #[error("Empty scope string")]
    Empty,

    /// The scope does not follow `context/ResourceType.action`.
    #[error("Invalid scope format: {0}")]
    InvalidFormat(String),

    /// The context is not `patient`, `user` or `system`.
    #[error("Invalid context: {0}")]
    InvalidContext(String),

    /// The resource type is not a FHIR resource type name or `*`.
    #[error("Invalid resource type: {0}")]
    InvalidResourceType(String),

    /// The action is not `read`, `write` or `*`.
    #[error("Invalid action: {0}")]
    InvalidAction(String),
}

// ============================================================================
// Scope Context
// ============================================================================

/// The context in which a resource scope applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeContext {
    /// Access limited to the launch patient's compartment.
    Patient,
    /// Access based on the authenticated user's permissions.
    User,
    /// Backend service access without a user.
    System,
}

impl ScopeContext {
    /// Returns the string representation of the context.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::User => "user",
            Self::System => "system",
        }
    }
}

impl fmt::Display for ScopeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeContext {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" => Ok(Self::Patient),
            "user" => Ok(Self::User),
            "system" => Ok(Self::System),
            other => Err(ScopeError::InvalidContext(other.to_string())),
        }
    }
}

// ============================================================================
// Resource Type
// ============================================================================

/// The FHIR resource type targeted by a scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceType {
    /// A specific FHIR resource type (e.g. "Patient", "Observation").
    Specific(String),
    /// Wildcard (`*`) matching all resource types.
    Wildcard,
}

impl ResourceType {
    /// Returns `true` if this resource type includes `other`.
    #[must_use]
    pub fn covers(&self, other: &ResourceType) -> bool {
        match (self, other) {
            (Self::Wildcard, _) => true,
            (Self::Specific(a), Self::Specific(b)) => a == b,
            (Self::Specific(_), Self::Wildcard) => false,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Specific(s) => f.write_str(s),
            Self::Wildcard => f.write_str("*"),
        }
    }
}

impl FromStr for ResourceType {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            return Ok(Self::Wildcard);
        }

        // FHIR resource type names: an uppercase letter followed by letters.
        let mut chars = s.chars();
        let valid = matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
            && chars.all(|c| c.is_ascii_alphabetic())
            && s.len() <= 64;

        if valid {
            Ok(Self::Specific(s.to_string()))
        } else {
            Err(ScopeError::InvalidResourceType(s.to_string()))
        }
    }
}

// ============================================================================
// Scope Action
// ============================================================================

/// The action granted by a resource scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeAction {
    /// Read access.
    Read,
    /// Write access.
    Write,
    /// Any action (`*`).
    Any,
}

impl ScopeAction {
    /// Returns the string representation of the action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Any => "*",
        }
    }

    /// Returns `true` if this action includes `other`.
    #[must_use]
    pub fn covers(&self, other: ScopeAction) -> bool {
        *self == Self::Any || *self == other
    }
}

impl fmt::Display for ScopeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeAction {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "*" => Ok(Self::Any),
            other => Err(ScopeError::InvalidAction(other.to_string())),
        }
    }
}

// ============================================================================
// Special Scopes
// ============================================================================

/// Scopes outside the resource grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialScope {
    /// `openid`
    OpenId,
    /// `profile`
    Profile,
    /// `fhirUser`
    FhirUser,
    /// `launch` (EHR launch)
    Launch,
    /// `launch/patient` (standalone patient selection)
    LaunchPatient,
    /// `launch/encounter` (standalone encounter selection)
    LaunchEncounter,
    /// `offline_access` (refresh token)
    OfflineAccess,
}

impl SpecialScope {
    /// All special scopes.
    pub const ALL: [SpecialScope; 7] = [
        Self::OpenId,
        Self::Profile,
        Self::FhirUser,
        Self::Launch,
        Self::LaunchPatient,
        Self::LaunchEncounter,
        Self::OfflineAccess,
    ];

    /// Returns the scope string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenId => "openid",
            Self::Profile => "profile",
            Self::FhirUser => "fhirUser",
            Self::Launch => "launch",
            Self::LaunchPatient => "launch/patient",
            Self::LaunchEncounter => "launch/encounter",
            Self::OfflineAccess => "offline_access",
        }
    }

    fn from_name(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|special| special.as_str() == s)
    }
}

impl fmt::Display for SpecialScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Resource Scope
// ============================================================================

/// A parsed `context/ResourceType.action` scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceScope {
    /// The scope context.
    pub context: ScopeContext,
    /// The target resource type or wildcard.
    pub resource_type: ResourceType,
    /// The granted action.
    pub action: ScopeAction,
}

impl ResourceScope {
    /// Returns `true` if this scope grants everything `requested` asks for.
    #[must_use]
    pub fn covers(&self, requested: &ResourceScope) -> bool {
        self.context == requested.context
            && self.resource_type.covers(&requested.resource_type)
            && self.action.covers(requested.action)
    }

    /// Returns `true` if this scope permits `action` on `resource_type` in `context`.
    #[must_use]
    pub fn permits(&self, context: ScopeContext, resource_type: &str, action: ScopeAction) -> bool {
        self.context == context
            && match &self.resource_type {
                ResourceType::Wildcard => true,
                ResourceType::Specific(t) => t == resource_type,
            }
            && self.action.covers(action)
    }
}

impl fmt::Display for ResourceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}.{}", self.context, self.resource_type, self.action)
    }
}

// ============================================================================
// Scope
// ============================================================================

/// A single parsed scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// One of the fixed special scopes.
    Special(SpecialScope),
    /// A resource access scope.
    Resource(ResourceScope),
}

impl Scope {
    /// Returns `true` if this granted scope covers `requested`.
    ///
    /// Special scopes cover only themselves.
    #[must_use]
    pub fn covers(&self, requested: &Scope) -> bool {
        match (self, requested) {
            (Self::Special(a), Self::Special(b)) => a == b,
            (Self::Resource(a), Self::Resource(b)) => a.covers(b),
            _ => false,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Special(s) => s.fmt(f),
            Self::Resource(r) => r.fmt(f),
        }
    }
}

impl FromStr for Scope {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_scope(s)
    }
}

/// Parses a single scope string.
///
/// # Errors
///
/// Returns `ScopeError` if the string is neither a special scope nor a
/// well-formed `context/ResourceType.action` scope.
pub fn parse_scope(s: &str) -> Result<Scope, ScopeError> {
    if s.is_empty() {
        return Err(ScopeError::Empty);
    }

    if let Some(special) = SpecialScope::from_name(s) {
        return Ok(Scope::Special(special));
    }

    let (context, rest) = s
        .split_once('/')
        .ok_or_else(|| ScopeError::InvalidFormat(s.to_string()))?;
    let context = ScopeContext::from_str(context)?;

    let (resource_type, action) = rest
        .split_once('.')
        .ok_or_else(|| ScopeError::InvalidFormat(s.to_string()))?;

    Ok(Scope::Resource(ResourceScope {
        context,
        resource_type: ResourceType::from_str(resource_type)?,
        action: ScopeAction::from_str(action)?,
    }))
}

/// Returns `true` if `s` is a valid scope.
#[must_use]
pub fn is_valid_scope(s: &str) -> bool {
    parse_scope(s).is_ok()
}

/// Returns `true` if the `granted` scope covers the `requested` scope.
///
/// Unparseable input on either side never matches.
#[must_use]
pub fn scope_covers(granted: &str, requested: &str) -> bool {
    match (parse_scope(granted), parse_scope(requested)) {
        (Ok(granted), Ok(requested)) => granted.covers(&requested),
        _ => false,
    }
}

// ============================================================================
// Scope Set
// ============================================================================

/// An ordered set of distinct scopes.
///
/// Serialized as a space-separated string, the form used in the `scope`
/// parameter and claim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSet {
    scopes: Vec<Scope>,
}

impl ScopeSet {
    /// Creates an empty scope set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a space-separated scope string, failing on the first invalid scope.
    ///
    /// # Errors
    ///
    /// Returns `ScopeError` for the first invalid scope.
    pub fn parse(scope_string: &str) -> Result<Self, ScopeError> {
        let mut set = Self::new();
        for token in scope_string.split_whitespace() {
            set.insert(parse_scope(token)?);
        }
        Ok(set)
    }

    /// Parses a space-separated scope string, skipping invalid scopes.
    #[must_use]
    pub fn parse_lenient(scope_string: &str) -> Self {
        scope_string
            .split_whitespace()
            .filter_map(|token| parse_scope(token).ok())
            .collect()
    }

    /// Adds a scope, keeping the first occurrence's position.
    ///
    /// Returns `false` if the scope was already present.
    pub fn insert(&mut self, scope: Scope) -> bool {
        if self.scopes.contains(&scope) {
            return false;
        }
        self.scopes.push(scope);
        true
    }

    /// Returns `true` if the exact scope is present.
    #[must_use]
    pub fn contains(&self, scope: &Scope) -> bool {
        self.scopes.contains(scope)
    }

    /// Returns `true` if the special scope is present.
    #[must_use]
    pub fn has(&self, special: SpecialScope) -> bool {
        self.contains(&Scope::Special(special))
    }

    /// Returns `true` if some scope in this set covers `requested`.
    #[must_use]
    pub fn covers(&self, requested: &Scope) -> bool {
        self.scopes.iter().any(|granted| granted.covers(requested))
    }

    /// Returns `true` if every scope in this set is present in `other`.
    #[must_use]
    pub fn is_subset_of(&self, other: &ScopeSet) -> bool {
        self.scopes.iter().all(|scope| other.contains(scope))
    }

    /// Returns `true` if every scope in this set is covered by some scope in
    /// `other`, wildcards included.
    #[must_use]
    pub fn is_covered_by(&self, other: &ScopeSet) -> bool {
        self.scopes.iter().all(|scope| other.covers(scope))
    }

    /// Returns `true` if some resource scope permits the operation.
    #[must_use]
    pub fn permits(&self, context: ScopeContext, resource_type: &str, action: ScopeAction) -> bool {
        self.resource_scopes()
            .any(|scope| scope.permits(context, resource_type, action))
    }

    /// Iterates over the resource scopes.
    pub fn resource_scopes(&self) -> impl Iterator<Item = &ResourceScope> {
        self.scopes.iter().filter_map(|scope| match scope {
            Scope::Resource(r) => Some(r),
            Scope::Special(_) => None,
        })
    }

    /// Iterates over the scopes in order.
    pub fn iter(&self) -> impl Iterator<Item = &Scope> {
        self.scopes.iter()
    }

    /// Returns the number of scopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    /// Returns `true` if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

impl FromIterator<Scope> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = Scope>>(iter: I) -> Self {
        let mut set = Self::new();
        for scope in iter {
            set.insert(scope);
        }
        set
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for scope in &self.scopes {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            scope.fmt(f)?;
        }
        Ok(())
    }
}

impl Serialize for ScopeSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ScopeSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Filtering
// ============================================================================

/// Why a requested scope was left out of a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The scope string does not parse.
    Unrecognized,
    /// No allowed scope covers it.
    NotPermitted,
}

impl DropReason {
    /// Returns a short label for logs and headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unrecognized => "unrecognized",
            Self::NotPermitted => "not_permitted",
        }
    }
}

/// A requested scope that was not granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedScope {
    /// The scope string as requested.
    pub scope: String,
    /// Why it was dropped.
    pub reason: DropReason,
}

impl fmt::Display for DroppedScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.scope, self.reason.as_str())
    }
}

/// Result of filtering requested scopes against allowed scopes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeFilterOutcome {
    /// Requested scopes covered by at least one allowed scope, in request order.
    pub granted: ScopeSet,
    /// Requested scopes that were left out.
    pub dropped: Vec<DroppedScope>,
}

/// Keeps the requested scopes covered by at least one allowed scope.
///
/// Never fails: unparseable and uncovered scopes are reported in
/// [`ScopeFilterOutcome::dropped`] and the rest of the request proceeds.
#[must_use]
pub fn filter_scopes_by_permissions(requested: &str, allowed: &ScopeSet) -> ScopeFilterOutcome {
    let mut outcome = ScopeFilterOutcome::default();

    for token in requested.split_whitespace() {
        let reason = match parse_scope(token) {
            Ok(scope) if allowed.covers(&scope) => {
                outcome.granted.insert(scope);
                continue;
            }
            Ok(_) => DropReason::NotPermitted,
            Err(_) => DropReason::Unrecognized,
        };

        if !outcome.dropped.iter().any(|d| d.scope == token) {
            outcome.dropped.push(DroppedScope {
                scope: token.to_string(),
                reason,
            });
        }
    }

    outcome
}

// ============================================================================
// Tests
// ============================================================================
