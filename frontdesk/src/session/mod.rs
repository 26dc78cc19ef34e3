pub mod model;
pub mod registry;
pub mod store;

pub use model::{Session, SessionStatus};
pub use registry::{Backend, BackendFactory, ClientHandle, SessionRegistry};
pub use store::{ResolutionOutcome, SessionStore};
