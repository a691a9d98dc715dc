use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("connect timed out")]
    ConnectTimeout,
}

pub type Result<T> = std::result::Result<T, Error>;
