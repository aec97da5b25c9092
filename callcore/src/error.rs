//! Error taxonomy for the call orchestration core.
//!
//! Flow-control results (a slot is full, a preference is disabled, the
//! schedule cache says "not yet") are never errors — see
//! [`crate::concurrency::ReservationOutcome`] and friends. `CallCoreError`
//! is reserved for genuine failures: storage errors, validation failures
//! at a boundary, and permanent dependency failures.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CallCoreError>;

#[derive(Error, Debug)]
pub enum CallCoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("concurrency error: {0}")]
    Concurrency(String),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("schedule error: {0}")]
    Schedule(String),

    #[error("processor error: {0}")]
    Processor(String),

    #[error("voice provider error: {0}")]
    Provider(String),

    #[error("webhook error: {0}")]
    Webhook(String),

    #[error("llm extraction error: {0}")]
    Llm(String),

    #[error("notification error: {0}")]
    Notification(String),

    #[error("billing error: {0}")]
    Billing(String),

    #[error("trigger evaluation error: {0}")]
    Trigger(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CallCoreError {
    pub fn concurrency<S: Into<String>>(msg: S) -> Self {
        Self::Concurrency(msg.into())
    }

    pub fn queue<S: Into<String>>(msg: S) -> Self {
        Self::Queue(msg.into())
    }

    pub fn schedule<S: Into<String>>(msg: S) -> Self {
        Self::Schedule(msg.into())
    }

    pub fn processor<S: Into<String>>(msg: S) -> Self {
        Self::Processor(msg.into())
    }

    pub fn provider<S: Into<String>>(msg: S) -> Self {
        Self::Provider(msg.into())
    }

    pub fn webhook<S: Into<String>>(msg: S) -> Self {
        Self::Webhook(msg.into())
    }

    pub fn llm<S: Into<String>>(msg: S) -> Self {
        Self::Llm(msg.into())
    }

    pub fn notification<S: Into<String>>(msg: S) -> Self {
        Self::Notification(msg.into())
    }

    pub fn billing<S: Into<String>>(msg: S) -> Self {
        Self::Billing(msg.into())
    }

    pub fn trigger<S: Into<String>>(msg: S) -> Self {
        Self::Trigger(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn already_exists<S: Into<String>>(msg: S) -> Self {
        Self::AlreadyExists(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}
