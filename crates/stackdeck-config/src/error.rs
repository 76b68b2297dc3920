use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing {0} in environment (.env)")]
    MissingEnvVar(String),

    #[error("{name} is not a valid base64-encoded secret: {reason}")]
    InvalidSecret { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
