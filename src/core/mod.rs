//! Core building blocks shared by the sync pipeline.

pub mod audit;
pub mod error;
pub mod notify;
pub mod retry;
pub mod time;
pub mod types;
pub mod watermark;
