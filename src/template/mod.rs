//! Workload and trait templates
//!
//! Definitions are named templates stored in a [`TemplateRegistry`]. Each
//! workload is rendered into its own [`ProcessContext`]: the workload
//! template first, then each attached trait template in order.
//!
//! ```text
//! // webservice
//! parameter: { image: string, port: *80 | int }
//! output: {
//!     metadata: name: context.name
//!     spec: { image: parameter.image, port: parameter.port }
//! }
//! ```

mod definition;
mod process;
mod registry;

pub use definition::{complete_trait, complete_workload, DefinitionError};
pub use process::{Assist, ProcessContext};
pub use registry::{DefinitionKind, TemplateDefinition, TemplateError, TemplateRegistry};
