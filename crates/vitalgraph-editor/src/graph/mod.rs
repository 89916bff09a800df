//! Workflow graph model: nodes, edges, and invariant-checked mutation.
//!
//! A workflow is a directed acyclic graph of agent nodes. Invariants are
//! enforced on every mutation: no self-loops, no duplicate (source, target)
//! pairs, no dangling endpoints, no cycles. A rejected mutation leaves the
//! graph exactly as it was.

pub mod edge;
pub mod node;
pub mod workflow;

pub use edge::Edge;
pub use node::Node;
pub use workflow::Workflow;
