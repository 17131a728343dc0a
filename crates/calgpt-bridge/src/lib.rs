//! Query execution bridge: runs the external answering process for one
//! question and classifies what it printed.

pub mod admission;
pub mod error;
pub mod invoker;
pub mod parser;

pub use admission::{Admission, Permit};
pub use error::BridgeError;
pub use invoker::{ProcessInvoker, ProcessResult};
pub use parser::{parse_output, preview, OutputParser};
