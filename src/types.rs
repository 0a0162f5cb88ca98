//! The type system.
//!
//! Ground types (`Bool`, `I64`), function types, and unification variables
//! participating in a union-find forest. Unification variables are
//! interior-mutable (`RefCell`-backed) so that `find` can path-compress and
//! `union`/`set` can record without the caller threading a substitution
//! through every call site; this system uses an explicit union-find
//! structure instead, which is mutable by construction.

use crate::span::Span;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A unification variable: a mutable union-find node.
///
/// `parent` is `None` while the variable is its own representative.
/// `rank` supports union-by-rank. Once `set` binds this variable to a
/// ground type, `parent` holds that type and `find` resolves through it.
struct UvCell {
    id: u32,
    parent: RefCell<Option<Type>>,
    rank: RefCell<u32>,
}

/// A type. `Uv` variants are reference-counted so that `union`/`set`
/// mutations through one handle are visible through every other handle
/// that shares the same variable — the union-find property.
#[derive(Clone)]
pub enum Type {
    Bool,
    I64,
    Fn {
        domain: Vec<Type>,
        codomain: Box<Type>,
    },
    Uv(Rc<UvCell>),
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::I64 => write!(f, "i64"),
            Type::Fn { domain, codomain } => {
                write!(f, "(")?;
                for (i, d) in domain.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{d}")?;
                }
                write!(f, ") -> {codomain}")
            }
            Type::Uv(cell) => write!(f, "?{}", cell.id),
        }
    }
}

impl PartialEq for Type {
    /// Structural equality of canonical representatives. Two unresolved
    /// unification variables are equal only if they are the *same*
    /// variable (post-`find`); this is not a substitute for `unify`.
    fn eq(&self, other: &Self) -> bool {
        match (find(self), find(other)) {
            (Type::Bool, Type::Bool) => true,
            (Type::I64, Type::I64) => true,
            (
                Type::Fn {
                    domain: d1,
                    codomain: c1,
                },
                Type::Fn {
                    domain: d2,
                    codomain: c2,
                },
            ) => d1 == d2 && c1 == c2,
            (Type::Uv(a), Type::Uv(b)) => Rc::ptr_eq(&a, &b),
            _ => false,
        }
    }
}

/// Per-compilation registry handing out canonical ground types and fresh
/// unification variables.
#[derive(Default)]
pub struct Types {
    next_uv_id: u32,
}

impl Types {
    pub fn new() -> Self {
        Types::default()
    }

    pub fn bool_ty(&self) -> Type {
        Type::Bool
    }

    pub fn i64_ty(&self) -> Type {
        Type::I64
    }

    pub fn fn_ty(&self, domain: Vec<Type>, codomain: Type) -> Type {
        Type::Fn {
            domain,
            codomain: Box::new(codomain),
        }
    }

    /// A fresh unification variable, its own representative, unranked.
    pub fn uv(&mut self) -> Type {
        let id = self.next_uv_id;
        self.next_uv_id += 1;
        Type::Uv(Rc::new(UvCell {
            id,
            parent: RefCell::new(None),
            rank: RefCell::new(0),
        }))
    }

    /// Equality constraint between `a` and `b`. Fails with `TypeError`
    /// carrying `span` on a ground-type clash, an arity mismatch, or an
    /// occurs-check violation.
    pub fn unify(
        &mut self,
        a: &Type,
        b: &Type,
        span: &Span,
    ) -> Result<(), crate::error::CompileError> {
        unify(a, b, span)
    }
}

/// Canonical representative of `t`. Path-compresses through resolved
/// unification variables — the *only* place a `Uv`'s `parent` is mutated
/// after `union`/`set` have run.
pub fn find(t: &Type) -> Type {
    match t {
        Type::Uv(cell) => {
            let parent = cell.parent.borrow().clone();
            match parent {
                None => t.clone(),
                Some(p) => {
                    let root = find(&p);
                    *cell.parent.borrow_mut() = Some(root.clone());
                    root
                }
            }
        }
        other => other.clone(),
    }
}

fn uv_id(t: &Type) -> Option<u32> {
    match t {
        Type::Uv(cell) => Some(cell.id),
        _ => None,
    }
}

/// Walks `t`'s structure through `find`, looking for a `Uv` whose id is
/// `needle`. Run before every `set` so a unification variable is never
/// bound to a type containing itself.
fn occurs(needle: u32, t: &Type) -> bool {
    match find(t) {
        Type::Bool | Type::I64 => false,
        Type::Uv(cell) => cell.id == needle,
        Type::Fn { domain, codomain } => {
            domain.iter().any(|d| occurs(needle, d)) || occurs(needle, &codomain)
        }
    }
}

fn set(uv: &Type, ground: &Type) {
    if let Type::Uv(cell) = uv {
        *cell.parent.borrow_mut() = Some(ground.clone());
    } else {
        unreachable!("set called on a non-Uv type");
    }
}

fn union(a: &Type, b: &Type) {
    let (ac, bc) = match (a, b) {
        (Type::Uv(ac), Type::Uv(bc)) => (ac, bc),
        _ => unreachable!("union called on non-Uv types"),
    };
    let ra = *ac.rank.borrow();
    let rb = *bc.rank.borrow();
    if ra < rb {
        *ac.parent.borrow_mut() = Some(b.clone());
    } else if ra > rb {
        *bc.parent.borrow_mut() = Some(a.clone());
    } else {
        *bc.parent.borrow_mut() = Some(a.clone());
        *ac.rank.borrow_mut() += 1;
    }
}

/// Unifies two types under the standard ground/ground, ground/variable,
/// variable/variable dispatch.
pub fn unify(a: &Type, b: &Type, span: &Span) -> Result<(), crate::error::CompileError> {
    let a = find(a);
    let b = find(b);
    if a == b {
        return Ok(());
    }
    match (&a, &b) {
        (Type::Uv(_), Type::Uv(_)) => {
            union(&a, &b);
            Ok(())
        }
        (Type::Uv(_), ground) => bind(&a, ground, span),
        (ground, Type::Uv(_)) => bind(&b, ground, span),
        (
            Type::Fn {
                domain: d1,
                codomain: c1,
            },
            Type::Fn {
                domain: d2,
                codomain: c2,
            },
        ) => {
            if d1.len() != d2.len() {
                return Err(crate::error::CompileError::ty(
                    span.clone(),
                    format!(
                        "function arity mismatch: expected {} argument(s), found {}",
                        d1.len(),
                        d2.len()
                    ),
                ));
            }
            for (x, y) in d1.iter().zip(d2.iter()) {
                unify(x, y, span)?;
            }
            unify(c1, c2, span)
        }
        (Type::Bool, Type::Bool) | (Type::I64, Type::I64) => Ok(()),
        _ => Err(crate::error::CompileError::ty(
            span.clone(),
            format!("type mismatch: expected {a}, found {b}"),
        )),
    }
}

fn bind(uv: &Type, ground: &Type, span: &Span) -> Result<(), crate::error::CompileError> {
    let id = uv_id(uv).expect("bind called with a non-Uv left-hand side");
    if occurs(id, ground) {
        return Err(crate::error::CompileError::ty(
            span.clone(),
            format!("occurs check failed: {uv} occurs in {ground}"),
        ));
    }
    set(uv, ground);
    Ok(())
}
