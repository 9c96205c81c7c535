pub type Result<T> = core::result::Result<T, PgxError>;

#[derive(thiserror::Error, Debug)]
pub enum PgxError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("pool error: {0}")]
    Pool(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("config file not found: {0}")]
    NotFound(String),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub fn is_err_configuration(err: &PgxError) -> bool {
    matches!(err, PgxError::Configuration(_))
}
