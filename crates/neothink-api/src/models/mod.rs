//! API response models.

pub mod common;
pub mod error;

pub use common::{ApiResponse, ok};
pub use error::{ApiResult, ErrorResponse};
