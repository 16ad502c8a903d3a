pub mod config;
pub mod error;
pub mod fms;
pub mod image;
pub mod replay;

pub use error::{AppError, Result};
