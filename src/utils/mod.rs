pub mod error;

pub use error::{AppError, DispatchError, FetchError, FetchErrorKind, SkipReason, StorageError};
