//! Decides which policy, if any, admits a request.
//!
//! A policy matches when the requester, the requested span, the requested
//! role and every requested rule are all admitted by it. Resolution is
//! first-match over an already ordered policy list.

use jitgate_domain::{
    AccessRequest, PolicyRule, RULE_WILDCARD, RoleRef, SubjectMatcherKind, SubjectPolicy,
    parse_access_span,
};

use crate::policy_store::PolicyEntry;

/// Returns the first policy that admits the request.
#[must_use]
pub fn resolve<'a>(
    request: &AccessRequest,
    policies: impl IntoIterator<Item = &'a PolicyEntry>,
) -> Option<&'a PolicyEntry> {
    policies
        .into_iter()
        .find(|entry| admits(&entry.policy, request))
}

/// Returns true when the policy admits the request.
#[must_use]
pub fn admits(policy: &SubjectPolicy, request: &AccessRequest) -> bool {
    matches_subject(policy, request)
        && matches_duration(policy, request.spec.duration.as_str())
        && request
            .spec
            .role
            .as_ref()
            .is_none_or(|role| matches_role(role, policy.allowed_roles.as_slice()))
        && matches_permissions(
            request.spec.permissions.as_slice(),
            policy.allowed_permissions.as_slice(),
        )
}

/// Empty requesters match anyone; otherwise the subject or one group must be listed.
#[must_use]
pub fn matches_subject(policy: &SubjectPolicy, request: &AccessRequest) -> bool {
    if policy.requesters.is_empty() {
        return true;
    }

    policy.requesters.iter().any(|requester| match requester.kind {
        SubjectMatcherKind::User => requester.name == request.spec.subject,
        SubjectMatcherKind::Group => request.spec.groups.contains(&requester.name),
    })
}

/// Both spans must parse and the requested one must be strictly shorter.
#[must_use]
pub fn matches_duration(policy: &SubjectPolicy, requested: &str) -> bool {
    match (
        parse_access_span(requested),
        parse_access_span(policy.max_duration.as_str()),
    ) {
        (Ok(requested), Ok(maximum)) => requested < maximum,
        _ => false,
    }
}

/// The requested role must equal one allowed role after API group normalization.
#[must_use]
pub fn matches_role(requested: &RoleRef, allowed: &[RoleRef]) -> bool {
    allowed
        .iter()
        .any(|candidate| candidate.is_equivalent_to(requested))
}

/// Every requested rule must be covered by one single allowed rule.
#[must_use]
pub fn matches_permissions(requested: &[PolicyRule], allowed: &[PolicyRule]) -> bool {
    requested
        .iter()
        .all(|rule| rule.is_empty() || allowed.iter().any(|candidate| rule_covers(candidate, rule)))
}

/// Field-wise subset check of one requested rule against one allowed rule.
#[must_use]
pub fn rule_covers(allowed: &PolicyRule, requested: &PolicyRule) -> bool {
    allowed
        .fields()
        .iter()
        .zip(requested.fields().iter())
        .all(|(allowed_values, requested_values)| field_covers(allowed_values, requested_values))
}

fn field_covers(allowed: &[String], requested: &[String]) -> bool {
    allowed.iter().any(|value| value == RULE_WILDCARD)
        || requested.iter().all(|value| allowed.contains(value))
}
