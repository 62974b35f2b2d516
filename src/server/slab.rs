use mio::Token;

/// Fixed-capacity connection table indexed by token.
///
/// Token 0 is reserved for the listener, so slot `i` maps to `Token(i + 1)`.
pub struct Slab<T> {
    slots: Vec<Option<T>>,
    free: Vec<usize>,
    len: usize,
}

impl<T> Slab<T> {
    pub fn new(cap: usize) -> Self {
        let mut slots = Vec::with_capacity(cap);
        slots.resize_with(cap, || None);
        Self {
            slots,
            free: (0..cap).rev().collect(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Claims a free token without filling the slot yet.
    pub fn vacant(&mut self) -> Option<Token> {
        self.free.last().map(|&idx| Token(idx + 1))
    }

    /// Stores `value` under the token returned by [`vacant`](Self::vacant).
    pub fn insert(&mut self, tok: Token, value: T) {
        let idx = tok.0 - 1;
        if let Some(pos) = self.free.iter().rposition(|&free| free == idx) {
            self.free.swap_remove(pos);
            self.len += 1;
        }
        self.slots[idx] = Some(value);
    }

    #[inline]
    pub fn get(&self, tok: Token) -> Option<&T> {
        tok.0.checked_sub(1).and_then(|idx| self.slots.get(idx)?.as_ref())
    }

    #[inline]
    pub fn get_mut(&mut self, tok: Token) -> Option<&mut T> {
        tok.0.checked_sub(1).and_then(|idx| self.slots.get_mut(idx)?.as_mut())
    }

    pub fn remove(&mut self, tok: Token) -> Option<T> {
        let idx = tok.0.checked_sub(1)?;
        let value = self.slots.get_mut(idx)?.take()?;
        self.free.push(idx);
        self.len -= 1;
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut slab = Slab::new(2);
        let a = slab.vacant().unwrap();
        slab.insert(a, "a");
        let b = slab.vacant().unwrap();
        slab.insert(b, "b");
        assert_ne!(a, b);
        assert_ne!(a, Token(0));
        assert!(slab.vacant().is_none());
        assert_eq!(slab.len(), 2);

        assert_eq!(slab.remove(a), Some("a"));
        assert_eq!(slab.get(a), None);
        assert_eq!(slab.get(b), Some(&"b"));
        assert_eq!(slab.vacant(), Some(a));
        assert_eq!(slab.get(Token(0)), None);
    }
}
