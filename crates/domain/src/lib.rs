//! Domain objects and invariants for temporary RBAC access.

#![forbid(unsafe_code)]

mod audit;
mod grant;
mod meta;
mod policy;
mod rbac;
mod request;
mod response;
mod span;

pub use audit::AccessAction;
pub use grant::{AccessGrant, GrantScope, GrantStatus, adhoc_role_name, role_binding_name};
pub use meta::{
    CLEANUP_FINALIZER, ClusterObject, ObjectKey, ObjectKind, ObjectMeta, OwnerReference,
    ResourceScope, StatusObject,
};
pub use policy::{
    AccessPolicy, DEFAULT_REQUIRED_APPROVALS, SubjectMatcher, SubjectMatcherKind, SubjectPolicy,
};
pub use rbac::{
    PolicyRule, RBAC_API_GROUP, RULE_WILDCARD, RbacBinding, RbacRole, RbacSubject,
    RbacSubjectKind, RoleKind, RoleRef,
};
pub use request::{AccessRequest, AccessRequestSpec, AccessRequestStatus, RequestState};
pub use response::{AccessResponse, AccessResponseSpec, Decision};
pub use span::parse_access_span;
