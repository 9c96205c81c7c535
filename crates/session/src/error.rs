pub type Result<T> = core::result::Result<T, SessionError>;

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    /// No database role with that name exists; session state unchanged.
    #[error("role '{0}' does not exist")]
    UnknownRole(String),

    /// The current session may not assume that role; session state unchanged.
    #[error("not permitted to assume role '{0}'")]
    PrivilegeDenied(String),

    /// A non-stackable switch was attempted while a context is active.
    #[error("already in a privilege context")]
    AlreadyInContext,

    /// `exit` called without a matching `enter`.
    #[error("not in a privilege context")]
    NotInContext,

    /// The restore directive itself failed. The session's privilege state is
    /// unknown; its connection must be discarded, never returned to a pool.
    #[error("failed to restore privilege context: {0}")]
    RestoreFailed(String),

    /// The session was poisoned by an earlier failed restore.
    #[error("session poisoned by a failed privilege restore")]
    Poisoned,

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub fn is_err_unknown_role(err: &SessionError) -> bool {
    matches!(err, SessionError::UnknownRole(_))
}

pub fn is_err_privilege_denied(err: &SessionError) -> bool {
    matches!(err, SessionError::PrivilegeDenied(_))
}
