//! Pipeline document handling
//!
//! Parsing document text into the validated intermediate form, writing a
//! graph back out as a document, and merging documents for edit workflows.

pub mod parser;
pub mod writer;
pub mod yml;

pub use parser::parse;
pub use writer::{merge, to_document};
pub use yml::{FlowYml, StepYml, SubflowYml, TriggerYml};
