//! Applications and their registry
//!
//! An application wraps one top-level operation plus a run record. The
//! scheduler only ever calls [`Application::invoke`].

mod application;
mod registry;

pub use application::{AppOutcome, Application};
pub use registry::{AppRegistry, ApplicationFactory};
