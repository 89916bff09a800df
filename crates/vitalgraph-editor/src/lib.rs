//! Editor-side state for the Vitalgraph console.
//!
//! Everything in this crate is single-threaded and synchronous: the graph,
//! its history, and the open tabs are owned exclusively by one interactive
//! session. The only async boundary lives in `vitalgraph-runner`.

pub mod graph;
pub mod history;
pub mod registry;
pub mod session;
pub mod vars;

pub use graph::{Edge, Node, Workflow};
pub use history::{EditCommand, EditHistory};
pub use registry::{Agent, AgentPatch, AgentRegistry};
pub use session::{SessionManager, TabState};
pub use vars::{Binding, BindingSource, ResolveContext, VariableMap};
