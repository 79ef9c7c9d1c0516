/// Limits applied to one [`Vm`](crate::vm::Vm).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    /// Nested invocations allowed before `CallDepthExceeded` is raised.
    pub max_call_depth: usize,
}

impl VmConfig {
    pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;

    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_call_depth: Self::DEFAULT_MAX_CALL_DEPTH,
        }
    }
}
