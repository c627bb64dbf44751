//! Location permission state machine

use std::fmt;

/// Location permission
///
/// `Unknown -> Prompt -> {Granted | Denied}`; `Unknown` may also resolve
/// directly when the platform already knows the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Permission {
    #[default]
    Unknown,
    /// The partner has to be asked
    Prompt,
    Granted,
    Denied,
}

impl Permission {
    /// Whether this state is final
    pub fn is_resolved(self) -> bool {
        matches!(self, Permission::Granted | Permission::Denied)
    }

    pub fn is_granted(self) -> bool {
        self == Permission::Granted
    }

    /// Whether `next` is a legal successor
    pub fn can_become(self, next: Permission) -> bool {
        use Permission::*;
        match (self, next) {
            (Unknown, Prompt | Granted | Denied) => true,
            (Prompt, Granted | Denied) => true,
            _ => false,
        }
    }

    /// Move to `next` if legal, otherwise stay
    pub fn advance(self, next: Permission) -> Permission {
        if self.can_become(next) {
            next
        } else {
            tracing::warn!(from = %self, to = %next, "Ignoring illegal permission transition");
            self
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Permission::Unknown => "unknown",
            Permission::Prompt => "prompt",
            Permission::Granted => "granted",
            Permission::Denied => "denied",
        };
        f.write_str(s)
    }
}
