//! Name interner.
//!
//! A [`Name`] is an opaque, totally-ordered identity with an optional
//! display hint. Two source-level occurrences of the same spelling resolve
//! to the same `Name` via [`Interner::sourced`]; [`Interner::fresh`] and
//! [`Interner::freshen`] mint identities that never collide with any other
//! `Name` from the same interner, even when they share a hint.

use std::collections::HashMap;
use std::fmt;

/// An opaque identifier. Equality and ordering are by `id` alone — the
/// `hint` is display-only and two distinct `Name`s may share one.
#[derive(Debug, Clone, Eq)]
pub struct Name {
    id: u32,
    hint: Option<String>,
}

impl Name {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl std::hash::Hash for Name {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.hint {
            Some(hint) => write!(f, "{hint}${}", self.id),
            None => write!(f, "${}", self.id),
        }
    }
}

/// Owns the monotonic counter and the source-spelling table for one
/// compilation. Never shared across invocations.
#[derive(Debug, Default)]
pub struct Interner {
    next_id: u32,
    sourced: HashMap<String, Name>,
}

impl Interner {
    pub fn new() -> Self {
        Interner::default()
    }

    fn mint(&mut self, hint: Option<String>) -> Name {
        let id = self.next_id;
        self.next_id += 1;
        Name { id, hint }
    }

    /// Intern a source-level spelling. Calling this twice with the same
    /// spelling on the same interner returns the same `Name`.
    pub fn sourced(&mut self, spelling: impl Into<String>) -> Name {
        let spelling = spelling.into();
        if let Some(existing) = self.sourced.get(&spelling) {
            return existing.clone();
        }
        let name = self.mint(Some(spelling.clone()));
        self.sourced.insert(spelling, name.clone());
        name
    }

    /// Mint a fresh, hintless identity. Never equal to any other `Name`
    /// from this interner.
    pub fn fresh(&mut self) -> Name {
        self.mint(None)
    }

    /// Mint a fresh identity carrying a display hint. The hint is cosmetic
    /// only — it does not participate in equality or lookup.
    pub fn fresh_with(&mut self, hint: impl Into<String>) -> Name {
        self.mint(Some(hint.into()))
    }

    /// Freshen an existing name: same hint (if any), new identity. Used by
    /// the type checker to make shadowing sound.
    pub fn freshen(&mut self, name: &Name) -> Name {
        self.mint(name.hint.clone())
    }

    pub fn spelling(&self, name: &Name) -> Option<&str> {
        name.hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sourced_is_idempotent() {
        let mut i = Interner::new();
        let a = i.sourced("x");
        let b = i.sourced("x");
        assert_eq!(a, b);
    }

    #[test]
    fn fresh_never_collides() {
        let mut i = Interner::new();
        let names: Vec<Name> = (0..100).map(|_| i.fresh()).collect();
        for (idx, n) in names.iter().enumerate() {
            for (other_idx, other) in names.iter().enumerate() {
                if idx != other_idx {
                    assert_ne!(n, other);
                }
            }
        }
    }

    #[test]
    fn freshen_changes_identity_keeps_hint() {
        let mut i = Interner::new();
        let x = i.sourced("y");
        let x2 = i.freshen(&x);
        assert_ne!(x, x2);
        assert_eq!(x.hint(), x2.hint());
    }

    #[test]
    fn fresh_can_share_a_hint_with_a_sourced_name() {
        let mut i = Interner::new();
        let a = i.sourced("z");
        let b = i.fresh_with("z");
        assert_ne!(a, b);
        assert_eq!(a.hint(), b.hint());
    }

    #[test]
    fn display_renders_hint_dollar_id() {
        let mut i = Interner::new();
        let a = i.sourced("x");
        assert_eq!(format!("{a}"), format!("x${}", a.id()));
        let f = i.fresh();
        assert_eq!(format!("{f}"), format!("${}", f.id()));
    }
}
