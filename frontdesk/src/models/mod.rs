pub mod logbook;
pub mod profile;
pub mod staff;
pub mod user;

pub use logbook::{CheckInForm, EntryKind, EntryStatus, LogbookEntry, NewLogbookEntry, PersonType};
pub use profile::{Identity, PermissionGrant, Profile, UserId};
pub use staff::NewStaffForm;
pub use user::StaffContext;
