/// Router-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterConfig {
    /// Reject targets whose concrete type has no registry entry.
    pub strict_type_check: bool,
}

impl RouterConfig {
    /// Configuration with strict type checking enabled.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            strict_type_check: true,
        }
    }
}
