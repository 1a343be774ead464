//! FILENAME: twbx-format/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("data embedding error: {0}")]
    Csv(#[from] csv::Error),

    #[error("generation cancelled")]
    Cancelled,
}
