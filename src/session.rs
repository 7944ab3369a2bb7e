//! Resolution sessions: the chain of bindings and injections being resolved.
//!
//! A session is an immutable stack. Entering a binding or an injection
//! returns a new session with one more frame, so a frame is "popped" simply
//! by dropping the session that holds it, including when resolution fails
//! halfway. Concurrent branches of the same resolution each carry their own
//! copy and cannot corrupt each other's path.

use std::fmt;
use std::sync::Arc;

use crate::binding::Binding;
use crate::error::{Error, Result};
use crate::inject::Injection;

/// One frame of a resolution path.
#[derive(Clone)]
pub enum ResolutionElement {
    Binding(Binding),
    Injection(Arc<Injection>),
}

/// Tracks the resolution path for cycle detection and diagnostics.
#[derive(Clone, Default)]
pub struct ResolutionSession {
    stack: Vec<ResolutionElement>,
}

impl ResolutionSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the session for a resolution that happens later.
    ///
    /// Used by getters: the frames active when the getter was created stay
    /// on the path, so a getter called back into a binding that is still
    /// being resolved reports the cycle instead of recursing.
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// Pushes a binding, failing if it is already being resolved.
    pub fn enter_binding(&self, binding: &Binding) -> Result<Self> {
        if self.bindings().any(|b| b.same_as(binding)) {
            let mut path: Vec<String> = self.bindings().map(|b| b.key().to_string()).collect();
            path.push(binding.key().to_string());
            tracing::debug!(path = %path.join(" -> "), "circular dependency");
            return Err(Error::CircularDependency { path });
        }
        let mut next = self.clone();
        next.stack.push(ResolutionElement::Binding(binding.clone()));
        Ok(next)
    }

    /// Pushes an injection.
    pub fn enter_injection(&self, injection: Arc<Injection>) -> Self {
        let mut next = self.clone();
        next.stack.push(ResolutionElement::Injection(injection));
        next
    }

    /// The innermost binding being resolved.
    pub fn current_binding(&self) -> Option<&Binding> {
        self.bindings().last()
    }

    /// The innermost injection being resolved.
    pub fn current_injection(&self) -> Option<&Injection> {
        self.stack.iter().rev().find_map(|e| match e {
            ResolutionElement::Injection(injection) => Some(injection.as_ref()),
            ResolutionElement::Binding(_) => None,
        })
    }

    pub fn bindings(&self) -> impl DoubleEndedIterator<Item = &Binding> {
        self.stack.iter().filter_map(|e| match e {
            ResolutionElement::Binding(binding) => Some(binding),
            ResolutionElement::Injection(_) => None,
        })
    }

    /// Keys of the bindings on the path, outermost first: `a -> b`.
    pub fn binding_path(&self) -> String {
        self.bindings().map(Binding::key).collect::<Vec<_>>().join(" -> ")
    }

    /// Bindings and injections on the path: `a -> Service.constructor[0] -> b`.
    pub fn resolution_path(&self) -> String {
        self.stack
            .iter()
            .map(|e| match e {
                ResolutionElement::Binding(binding) => binding.key().to_string(),
                ResolutionElement::Injection(injection) => injection.describe(),
            })
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

impl fmt::Debug for ResolutionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResolutionSession({})", self.resolution_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(key: &str) -> Binding {
        Binding::new(key).unwrap()
    }

    #[test]
    fn test_enter_is_copy_on_push() {
        let root = ResolutionSession::new();
        let a = binding("a");
        let inner = root.enter_binding(&a).unwrap();
        assert_eq!(root.depth(), 0);
        assert_eq!(inner.depth(), 1);
        assert_eq!(inner.current_binding().map(Binding::key), Some("a"));
    }

    #[test]
    fn test_cycle_reports_full_chain() {
        let a = binding("a");
        let b = binding("b");
        let session = ResolutionSession::new()
            .enter_binding(&a)
            .and_then(|s| s.enter_binding(&b))
            .unwrap();
        let err = session.enter_binding(&a).unwrap_err();
        match err {
            Error::CircularDependency { path } => assert_eq!(path, vec!["a", "b", "a"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_same_key_different_binding_is_not_a_cycle() {
        let parent_a = binding("a");
        let child_a = binding("a");
        let session = ResolutionSession::new().enter_binding(&child_a).unwrap();
        assert!(session.enter_binding(&parent_a).is_ok());
    }

    #[test]
    fn test_fork_keeps_path() {
        let a = binding("a");
        let session = ResolutionSession::new().enter_binding(&a).unwrap();
        let forked = session.fork();
        assert_eq!(forked.binding_path(), "a");
        assert!(matches!(
            forked.enter_binding(&a),
            Err(Error::CircularDependency { .. })
        ));
        // Frames pushed on the fork do not show up in the original
        let deeper = forked.enter_binding(&binding("b")).unwrap();
        assert_eq!(deeper.depth(), 2);
        assert_eq!(session.depth(), 1);
    }
}
