//! Review-window notification dispatch.
//!
//! Modules:
//! - `sender`: delivery contract consumed by the dispatcher.
//! - `dispatcher`: the scheduled batch run over due documents.

pub mod dispatcher;
pub mod sender;
