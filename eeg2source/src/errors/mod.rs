//! Failure taxonomy and persisted error records.
//!
//! Classification of processing errors into [`ErrorCategory`] drives the
//! robust wrapper's recovery policy; [`ErrorRecord`]s are what a batch
//! leaves behind in the error directory for every permanent failure.

mod category;
mod record;

pub use category::ErrorCategory;
pub use record::{ErrorRecord, ErrorSink};
