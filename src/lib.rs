//! Image format converter - pick an image, convert it to PNG, JPG or WebP, and
//! save the result
//!
//! The heart of the crate is [`session::ConversionSession`], a small state machine
//! driven by a front end. Conversion is delegated to a [`convert::ConversionService`]
//! and saving to a platform-specific [`persist::PersistenceAdapter`].

pub mod app;
pub mod convert;
pub mod error;
pub mod models;
pub mod persist;
pub mod session;
pub mod source;

pub use error::{Error, ErrorInfo, ErrorKind, Result};
