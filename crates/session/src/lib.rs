//! Scoped database privilege context switching.
//!
//! Lets a unit of work run its queries as a less-privileged role and
//! reliably puts the session's original privileges back afterward, on
//! normal return, early return, error propagation and cancellation alike. A
//! failed restore never leaks: the affected connection is discarded instead
//! of being returned to its pool.

pub mod error;
pub mod stack;

mod session;

pub use error::{is_err_privilege_denied, is_err_unknown_role, Result, SessionError};
pub use session::PrivilegedSession;
pub use stack::{ContextStack, RestoreTarget};
