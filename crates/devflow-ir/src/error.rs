//! Error types for the devflow IR.

/// Errors that can occur when parsing IR pieces or validating a graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IrError {
    /// A handle index is out of bounds for its arena.
    #[error("{arena} handle index {index} out of bounds (arena size: {size})")]
    BadHandle {
        arena: &'static str,
        index: usize,
        size: usize,
    },

    /// A device string is not of the form `kind` or `kind:index`.
    #[error("invalid device '{0}'")]
    InvalidDevice(String),

    /// A conditional does not own exactly a true and a false block.
    #[error("{node}: expected 2 branch blocks, found {found}")]
    BranchCount { node: String, found: usize },

    /// A branch yields a different number of values than its conditional.
    #[error("{node}: block{block} yields {found} values but the node has {expected} outputs")]
    BranchArity {
        node: String,
        block: usize,
        expected: usize,
        found: usize,
    },

    /// A loop does not own exactly one body block.
    #[error("{node}: expected 1 body block, found {found}")]
    LoopBody { node: String, found: usize },

    /// A value records a producer that does not list it as an output.
    #[error("value {value} names {node} as producer, but is not one of its outputs")]
    ProducerMismatch { value: String, node: String },
}
