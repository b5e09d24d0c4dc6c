//! Parser for the devflow textual graph IR.
//!
//! Reads the format produced by [`devflow_ir::dump_graph`]:
//!
//! ```text
//! graph(%x : Tensor(device=cuda:0), %flag : bool):
//!   %1 : Tensor = aten::relu(%x)
//!   %2 : Tensor = prim::If(%flag)
//!     block0():
//!       -> (%1)
//!     block1():
//!       -> (%x)
//!   return (%2)
//! ```
//!
//! Value names share a single scope across all blocks, so a value may be
//! defined only once.

mod lexer;
mod syntax;

use devflow_ir::{Graph, IrError};

/// Parse textual IR into a [`Graph`].
pub fn parse(source: &str) -> Result<Graph, ParseError> {
    syntax::Parser::new(source)?.parse_graph()
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("line {line}: use of undefined value '%{name}'")]
    UndefinedValue { line: usize, name: String },
    #[error("line {line}: value '%{name}' is already defined")]
    Redefinition { line: usize, name: String },
    #[error("line {line}: {source}")]
    Ir {
        line: usize,
        #[source]
        source: IrError,
    },
    #[error("unexpected end of input")]
    UnexpectedEof,
}

impl ParseError {
    /// The 1-based source line the error refers to, if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Syntax { line, .. }
            | Self::UndefinedValue { line, .. }
            | Self::Redefinition { line, .. }
            | Self::Ir { line, .. } => Some(*line),
            Self::UnexpectedEof => None,
        }
    }
}
