//! Artifact exporters.

mod jtv;

pub use jtv::{JtvError, JtvOptions, export_jtv};
