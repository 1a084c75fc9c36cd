//! Unification based evaluation of template fragments

mod engine;
mod error;
mod instance;
mod value;

pub use engine::evaluate;
pub(crate) use error::display_path;
pub use error::EvalError;
pub use instance::Instance;
pub use value::{Alternative, Conflict, StructField, Value};
