#![forbid(unsafe_code)]

//! Error type shared by every node and binding.

use txbind_events::ListenerError;

/// Errors from reading, writing, or relaying through a bindable node.
///
/// Every failure is synchronous and surfaces to the call that triggered it;
/// nothing in this crate retries or rolls back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    /// Read attempted on a backing with no getter.
    Unreadable,
    /// Write attempted on a backing with no setter.
    Unwritable,
    /// Sequence index outside the backing's bounds.
    OutOfBounds { index: usize, len: usize },
    /// A listener rejected the change.
    Listener(String),
}

impl std::fmt::Display for BindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unreadable => write!(f, "unreadable bindable (no getter)"),
            Self::Unwritable => write!(f, "can't set bindable (no setter)"),
            Self::OutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for sequence of length {len}")
            }
            Self::Listener(msg) => write!(f, "listener rejected change: {msg}"),
        }
    }
}

impl std::error::Error for BindError {}

impl From<ListenerError> for BindError {
    fn from(err: ListenerError) -> Self {
        Self::Listener(err.message().to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(BindError::Unreadable.to_string(), "unreadable bindable (no getter)");
        assert_eq!(BindError::Unwritable.to_string(), "can't set bindable (no setter)");
        assert_eq!(
            BindError::OutOfBounds { index: 4, len: 2 }.to_string(),
            "index 4 out of bounds for sequence of length 2"
        );
    }

    #[test]
    fn listener_error_converts() {
        let err: BindError = ListenerError::new("nope").into();
        assert_eq!(err, BindError::Listener("nope".into()));
    }
}
