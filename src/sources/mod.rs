//! HTTP clients for the sandbox feed and the MISP instance.

pub mod anyrun;
pub mod misp;

pub(crate) fn user_agent() -> String {
    format!("anyrun-misp-sync/{}", env!("CARGO_PKG_VERSION"))
}
