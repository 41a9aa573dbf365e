//! Command handlers: translate parsed arguments into library calls.

mod build;
mod jtv;
mod validate;

pub use build::handle_build;
pub use jtv::handle_jtv;
pub use validate::handle_validate;
