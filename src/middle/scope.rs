use std::rc::Rc;

/// A persistent chain of bindings, innermost first. Extending a scope never
/// changes the scope it was extended from, so a pass can hand each subtree
/// its own view without undoing anything on the way back up.
#[derive(Debug)]
pub struct Scope<T>(Option<Rc<Frame<T>>>);

#[derive(Debug)]
struct Frame<T> {
    binding: T,
    parent: Scope<T>,
}

impl<T> Clone for Scope<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Default for Scope<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Scope<T> {
    pub fn empty() -> Self {
        Self(None)
    }

    #[must_use]
    pub fn extend(&self, binding: T) -> Self {
        Self(Some(Rc::new(Frame {
            binding,
            parent: self.clone(),
        })))
    }

    #[must_use]
    pub fn extend_all(&self, bindings: impl IntoIterator<Item = T>) -> Self {
        bindings
            .into_iter()
            .fold(self.clone(), |scope, binding| scope.extend(binding))
    }

    /// Bindings from the innermost outwards
    pub fn iter(&self) -> ScopeIter<'_, T> {
        ScopeIter {
            next: self.0.as_deref(),
        }
    }

    /// The innermost binding matching `predicate` and its 0-based depth
    pub fn find(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<(usize, &T)> {
        self.iter().enumerate().find(|(_, binding)| predicate(binding))
    }
}

pub struct ScopeIter<'a, T> {
    next: Option<&'a Frame<T>>,
}

impl<'a, T> Iterator for ScopeIter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let frame = self.next?;
        self.next = frame.parent.0.as_deref();
        Some(&frame.binding)
    }
}
