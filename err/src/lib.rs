#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("Inconsistent format: {0}")]
    Format(&'static str),
    #[error("File not found.")]
    NotFound,
    #[error("Entry already exists")]
    AlreadyExists,
    #[error("No free space left")]
    NoSpace,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = core::result::Result<T, Error>;
