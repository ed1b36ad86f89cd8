//! VM configuration
//!
//! Runtime limits for a [`Vm`](crate::vm::Vm). Configuration specifies
//! constraints only; enforcement is handled by the VM.

use serde::{Deserialize, Serialize};

/// Default operand stack capacity
pub const STACK_SIZE: usize = 2048;

/// Default frame stack capacity
pub const MAX_FRAMES: usize = 1024;

/// Default depth of compiled calls made from native code
pub const MAX_NESTED_CALLS: usize = 64;

/// Default global table size
pub const GLOBALS_SIZE: usize = 1024;

/// Maximum byte length of a String value
pub const MAX_STRING_LEN: usize = 2_147_483_647;

/// Maximum byte length of a Bytes value
pub const MAX_BYTES_LEN: usize = 2_147_483_647;

/// Maximum element count of an array built by one native call
pub const MAX_ARRAY_LEN: usize = 1 << 24;

/// VM configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Operand stack capacity
    pub stack_size: usize,

    /// Maximum call depth, counting the frames of every enclosing VM
    pub max_frames: usize,

    /// Maximum number of child VMs stacked on one run (host callbacks,
    /// property accessors, constructors)
    pub max_nested_calls: usize,

    /// Number of global slots
    pub globals_size: usize,

    /// Allocation budget per run; negative means unlimited
    pub max_allocs: i64,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            stack_size: STACK_SIZE,
            max_frames: MAX_FRAMES,
            max_nested_calls: MAX_NESTED_CALLS,
            globals_size: GLOBALS_SIZE,
            max_allocs: -1,
        }
    }
}

impl VmConfig {
    /// Create a new configuration with default limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Load limits from JSON; missing keys keep their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_max_allocs(mut self, max_allocs: i64) -> Self {
        self.max_allocs = max_allocs;
        self
    }

    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames = max_frames;
        self
    }

    pub fn with_max_nested_calls(mut self, max_nested_calls: usize) -> Self {
        self.max_nested_calls = max_nested_calls;
        self
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }
}
