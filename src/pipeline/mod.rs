//! The sync pipeline: walk history, fetch, transform, register, report.

pub mod fetcher;
pub mod history;
pub mod registrar;
pub mod reporter;
pub mod runner;
pub mod transform;
