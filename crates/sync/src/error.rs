pub type Result<T> = core::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The derived role name collides with a reserved pattern, an unmanaged
    /// role, or a differently-sourced managed role. The identity is left
    /// unsynchronized; operator attention required.
    #[error("naming conflict: {0}")]
    NamingConflict(String),

    #[error("role '{0}' does not exist")]
    NoSuchRole(String),

    /// The target role exists but is not managed by the synchronizer
    /// (administrator, other application, backup account). Never mutated.
    #[error("role '{0}' is not managed by the synchronizer")]
    Protected(String),

    #[error("{0}")]
    StringError(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(std::io::Error),
}

impl Error {
    pub fn other<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::Io(std::io::Error::other(error))
    }
}

impl From<rolegate_postgresqlx::PgxError> for Error {
    fn from(e: rolegate_postgresqlx::PgxError) -> Self {
        match e {
            rolegate_postgresqlx::PgxError::Sqlx(e) => Error::Sqlx(e),
            other => Error::other(other),
        }
    }
}

pub fn is_err_naming_conflict(err: &Error) -> bool {
    matches!(err, Error::NamingConflict(_))
}

pub fn is_err_no_such_role(err: &Error) -> bool {
    matches!(err, Error::NoSuchRole(_))
}

pub fn is_err_protected(err: &Error) -> bool {
    matches!(err, Error::Protected(_))
}
