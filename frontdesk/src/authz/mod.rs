pub mod gate;
pub mod guard;
pub mod permissions;
pub mod policy;
pub mod roles;

pub use gate::PermissionGate;
pub use guard::{AUTH_ENTRY, GuardDecision, RouteGuard, UNAUTHORIZED};
pub use permissions::{PERMISSION_GROUPS, Permission, PermissionGroup, PermissionSet};
pub use policy::{Access, AuthorizationPolicy, OwnerBypassPolicy};
pub use roles::StaffRole;
