pub mod catalog;
pub mod chat;
pub mod error;
pub mod history;
pub mod identity;
pub mod ports;
pub mod reconcile;
pub mod util;

pub type DomainResult<T> = Result<T, error::DomainError>;
