//! Assembly and disassembly configuration
//!
//! Both directions of the pipeline have a small set of knobs. The defaults reproduce encoded
//! input byte for byte after an unmodified round trip; the presets trade that for stricter
//! checking or more lenient input handling.

/// Configuration for turning a unit stream into a block graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisassemblerConfig {
    /// Start a new block at every marked branch target (default: true)
    /// When disabled, branches into the middle of a block keep a non-zero label offset
    pub split_at_branch_targets: bool,
}

impl Default for DisassemblerConfig {
    fn default() -> Self {
        Self {
            split_at_branch_targets: true,
        }
    }
}

impl DisassemblerConfig {
    /// Only split blocks at position changes and after branches
    ///
    /// Produces fewer, larger blocks; branch targets become mid-block labels.
    #[must_use]
    pub fn coarse() -> Self {
        Self {
            split_at_branch_targets: false,
        }
    }
}

/// Configuration for turning a block graph back into a unit stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblerConfig {
    /// Upper bound on layout passes before giving up with
    /// [`crate::Error::LayoutDiverged`] (default: 32)
    pub max_layout_passes: usize,

    /// Reject operands whose variant does not match the opcode's operand kind (default: true)
    /// When disabled, raw `Immediate` operands are accepted for symbolic opcodes
    pub verify_operands: bool,

    /// Recompute the maximum stack depth and raise the declared stack bound when the
    /// rewritten code needs more (default: false)
    pub update_stack_size: bool,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            max_layout_passes: 32,
            verify_operands: true,
            update_stack_size: false,
        }
    }
}

impl AssemblerConfig {
    /// Full checking plus stack bound maintenance, for rewritten code
    #[must_use]
    pub fn strict() -> Self {
        Self {
            max_layout_passes: 32,
            verify_operands: true,
            update_stack_size: true,
        }
    }

    /// Accepts raw table indices in place of symbolic operands
    #[must_use]
    pub fn lenient() -> Self {
        Self {
            max_layout_passes: 32,
            verify_operands: false,
            update_stack_size: false,
        }
    }

    /// Overrides the layout pass budget
    #[must_use]
    pub fn with_max_layout_passes(mut self, passes: usize) -> Self {
        self.max_layout_passes = passes;
        self
    }
}
