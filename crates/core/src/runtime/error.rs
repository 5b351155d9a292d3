use thiserror::Error;

/// Typed runtime-daemon errors, mirroring the teacher's `DockerError`
/// but narrowed to the four kinds the Runtime Adapter's contract names.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("container not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transient daemon error: {0}")]
    Transient(String),

    #[error("fatal daemon error: {0}")]
    Fatal(String),
}

impl From<bollard::errors::Error> for RuntimeError {
    fn from(err: bollard::errors::Error) -> Self {
        use bollard::errors::Error as BErr;
        match &err {
            BErr::DockerResponseServerError { status_code, message } if *status_code == 404 => {
                RuntimeError::NotFound(message.clone())
            }
            BErr::DockerResponseServerError { status_code, message } if *status_code == 409 => {
                RuntimeError::Conflict(message.clone())
            }
            BErr::DockerResponseServerError { status_code, message } if *status_code >= 500 => {
                RuntimeError::Transient(message.clone())
            }
            _ => RuntimeError::Fatal(err.to_string()),
        }
    }
}
