use std::fmt::{Display, Formatter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MinipanelErrorCode {
    InvalidArgument,
    MissingIdentity,
    InvalidAmount,
    Storage,
    Network,
    Rejected,
    Internal,
}

impl MinipanelErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MinipanelErrorCode::InvalidArgument => "minipanel/invalid-argument",
            MinipanelErrorCode::MissingIdentity => "minipanel/missing-identity",
            MinipanelErrorCode::InvalidAmount => "minipanel/invalid-amount",
            MinipanelErrorCode::Storage => "minipanel/storage",
            MinipanelErrorCode::Network => "minipanel/network",
            MinipanelErrorCode::Rejected => "minipanel/rejected",
            MinipanelErrorCode::Internal => "minipanel/internal",
        }
    }
}

#[derive(Clone, Debug)]
pub struct MinipanelError {
    pub code: MinipanelErrorCode,
    message: String,
}

impl MinipanelError {
    pub fn new(code: MinipanelErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }
}

impl Display for MinipanelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl std::error::Error for MinipanelError {}

pub type MinipanelResult<T> = Result<T, MinipanelError>;

pub fn invalid_argument(message: impl Into<String>) -> MinipanelError {
    MinipanelError::new(MinipanelErrorCode::InvalidArgument, message)
}

pub fn missing_identity(message: impl Into<String>) -> MinipanelError {
    MinipanelError::new(MinipanelErrorCode::MissingIdentity, message)
}

pub fn invalid_amount(message: impl Into<String>) -> MinipanelError {
    MinipanelError::new(MinipanelErrorCode::InvalidAmount, message)
}

pub fn storage_error(message: impl Into<String>) -> MinipanelError {
    MinipanelError::new(MinipanelErrorCode::Storage, message)
}

pub fn network_error(message: impl Into<String>) -> MinipanelError {
    MinipanelError::new(MinipanelErrorCode::Network, message)
}

pub fn rejected(message: impl Into<String>) -> MinipanelError {
    MinipanelError::new(MinipanelErrorCode::Rejected, message)
}

pub fn internal_error(message: impl Into<String>) -> MinipanelError {
    MinipanelError::new(MinipanelErrorCode::Internal, message)
}
