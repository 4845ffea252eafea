use thiserror::Error;

use crate::{
    assembly::{metadata::TableKind, Opcode, OperandKind},
    disassembler::{BlockId, BlockTarget},
};

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! structural_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Structural {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Structural {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Structural invariant violations
/// Raised when a block graph breaks one of its invariants; these indicate a bug in whatever
/// produced or rewrote the graph.
/// - [`Error::Structural`] - Generic invariant violation with source location
/// - [`Error::DuplicateBlock`] - The same block id appears twice
/// - [`Error::DanglingLabel`] - A label does not resolve inside the graph
/// - [`Error::OperandMismatch`] - An operand variant does not fit its opcode
///
/// ## Lookup failures
/// - [`Error::SymbolNotFound`] - A symbolic operand is missing from its metadata table
/// - [`Error::SymbolIndex`] - A raw operand index is out of range for its table
/// - [`Error::UnboundCapture`] - A backreference names a capture that was never bound
/// - [`Error::UnknownOpcode`] / [`Error::UnknownMnemonic`] - Not in the instruction set
///
/// ## Layout
/// - [`Error::LayoutDiverged`] - Jump offsets did not settle within the pass budget
/// - [`Error::InvalidBranch`] - A branch cannot be encoded
///
/// ## Encoded input
/// - [`Error::Malformed`] - Corrupted unit stream or position table
/// - [`Error::OutOfBounds`] - Read past the end of the input
///
/// A failed pattern match is never an error; drivers report it as `Ok(None)`.
///
/// # Examples
///
/// ```rust
/// use opscope::Error;
///
/// fn report(err: &Error) -> &'static str {
///     if err.is_structural() {
///         "graph is broken"
///     } else if err.is_lookup() {
///         "missing symbol"
///     } else {
///         "other"
///     }
/// }
///
/// assert_eq!(report(&Error::DuplicateBlock(3)), "graph is broken");
/// assert_eq!(report(&Error::UnboundCapture("argc".into())), "missing symbol");
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The encoded input is damaged and could not be decoded.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while decoding.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// A block graph invariant does not hold.
    ///
    /// Covers fallthrough cycles, fallthrough labels with a non-zero offset, jumps that do
    /// not carry a label and similar shape errors found while linearizing or assembling.
    #[error("Structural invariant violated - {file}:{line}: {message}")]
    Structural {
        /// Description of the violated invariant
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Two blocks in one graph share the same id, possibly at different nesting levels.
    #[error("Duplicate block id {0}")]
    DuplicateBlock(BlockId),

    /// A label points at a block id that is not part of the graph, or past its end.
    #[error("Label {0} does not resolve inside this graph")]
    DanglingLabel(BlockTarget),

    /// The operand variant of an instruction does not match the operand kind of its opcode.
    #[error("Operand of opcode {opcode:#04x} does not match its kind {expected}")]
    OperandMismatch {
        /// The offending opcode
        opcode: Opcode,
        /// The operand kind the instruction set declares for it
        expected: OperandKind,
    },

    /// A symbolic operand is not present in the metadata table it refers to.
    #[error("'{symbol}' is not present in the {table} table")]
    SymbolNotFound {
        /// The table that was searched
        table: TableKind,
        /// Rendering of the missing symbol
        symbol: String,
    },

    /// A raw operand index is outside of its metadata table.
    #[error("Index {index} is out of range for the {table} table")]
    SymbolIndex {
        /// The table that was indexed
        table: TableKind,
        /// The offending index
        index: u32,
    },

    /// A backreference or predicate read a capture that is not bound in any scope.
    #[error("Capture '{0}' is not bound")]
    UnboundCapture(String),

    /// A capture scope was exited out of LIFO order, or an unknown scope token was used.
    #[error("Capture scope exited out of order")]
    ScopeMismatch,

    /// The opcode is not defined by the instruction set.
    #[error("Unknown opcode {0:#04x}")]
    UnknownOpcode(Opcode),

    /// The mnemonic is not defined by the instruction set.
    #[error("Unknown mnemonic '{0}'")]
    UnknownMnemonic(String),

    /// An opcode was defined twice while building an instruction set.
    #[error("Opcode {0:#04x} is already defined")]
    DuplicateOpcode(Opcode),

    /// A branch can not be encoded, e.g. a relative jump to an earlier offset.
    #[error("Invalid branch - {0}")]
    InvalidBranch(String),

    /// Jump operand widths did not converge within the configured number of layout passes.
    #[error("Instruction layout did not converge after {0} passes")]
    LayoutDiverged(usize),
}

impl Error {
    /// Returns `true` for errors that signal a broken block graph.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::Structural { .. }
                | Error::DuplicateBlock(_)
                | Error::DanglingLabel(_)
                | Error::OperandMismatch { .. }
        )
    }

    /// Returns `true` for errors caused by a failed symbol, capture or opcode lookup.
    #[must_use]
    pub fn is_lookup(&self) -> bool {
        matches!(
            self,
            Error::SymbolNotFound { .. }
                | Error::SymbolIndex { .. }
                | Error::UnboundCapture(_)
                | Error::UnknownOpcode(_)
                | Error::UnknownMnemonic(_)
        )
    }
}
