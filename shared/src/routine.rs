use std::fmt;

/// What the address resolver knows about a compiled routine.
///
/// The engine never introspects code itself; the shape travels alongside the
/// address and decides whether the routine may be patched or used as a
/// replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutineShape {
    /// Free or static routine with a fixed entry point.
    Plain,
    /// Instance-bound routine. A replacement for it takes the receiver as an
    /// explicit leading parameter.
    Method,
    /// One instantiation of a generic routine.
    Generic,
    /// Code emitted at runtime.
    Generated,
}

impl RoutineShape {
    /// Whether an inline patch at this routine's entry is supported.
    pub const fn is_patchable(self) -> bool {
        matches!(self, Self::Plain | Self::Method)
    }

    /// Whether a routine of this shape can be a jump target for a hook.
    pub const fn is_valid_replacement(self) -> bool {
        matches!(self, Self::Plain)
    }
}

impl fmt::Display for RoutineShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Plain => "plain",
            Self::Method => "method",
            Self::Generic => "generic",
            Self::Generated => "generated",
        };
        f.write_str(name)
    }
}
