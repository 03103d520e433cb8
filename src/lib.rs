//! Runs API test scenarios step by step.
//!
//! Each request step is built from templates patched with the variables of
//! the current run, sent, asserted, and mined for new variables that later
//! steps can reference as `{{name}}`.

pub mod assertion;
pub mod config;
pub mod context;
pub mod error;
pub mod extractor;
pub mod jsonpath;
pub mod model;
pub mod report;
pub mod request;
pub mod runner;
pub mod step;
pub mod transport;
pub mod url_template;

pub use assertion::{AssertionController, DefaultAssertionController};
pub use config::*;
pub use context::VariableStore;
pub use error::{BuildError, ExtractionError, StepError, StepFailure, TransportError};
pub use model::*;
pub use request::RestRequest;
pub use runner::*;
pub use step::{DefaultStepRunner, StepRunner};
pub use transport::{RawResponse, ReqwestTransport, Transport};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
