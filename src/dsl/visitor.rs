//! Visitor over a parsed [`Filter`].
//!
//! Traversal is post-order and shallow. Hooks fire for
//! sequences, factors, terms, restrictions, functions and members only:
//!
//! - filters and expressions are walked but never reported;
//! - a restriction's argument is not walked;
//! - a composite's inner expression is not walked;
//! - a function's names and arguments and a member's fields are handed to
//!   the hook whole, not walked.
//!
//! Visitors that need the skipped subtrees walk them themselves, e.g. by
//! calling [`Accept::accept`] on the expression inside a composite.
//!
//! The first hook to return an error stops the traversal, and that error is
//! returned unchanged from [`visit`].

use super::ast::*;

/// Callbacks invoked during [`visit`]. Every hook defaults to a no-op, so an
/// implementation only overrides the ones it needs.
pub trait Visitor {
    type Error;

    /// A sequence of factors. With exact match semantics this is a
    /// conjunction.
    fn visit_sequence(&mut self, _sequence: &Sequence) -> Result<(), Self::Error> {
        Ok(())
    }

    /// A disjunction of terms.
    fn visit_factor(&mut self, _factor: &Factor) -> Result<(), Self::Error> {
        Ok(())
    }

    /// A possibly negated simple expression.
    fn visit_term(&mut self, _term: &Term) -> Result<(), Self::Error> {
        Ok(())
    }

    /// A comparison, or a global restriction without comparator.
    fn visit_restriction(&mut self, _restriction: &Restriction) -> Result<(), Self::Error> {
        Ok(())
    }

    /// A function call with its arguments.
    fn visit_function(&mut self, _function: &Function) -> Result<(), Self::Error> {
        Ok(())
    }

    /// A dot-qualified field reference.
    fn visit_member(&mut self, _member: &Member) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Visitor that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopVisitor;

impl Visitor for NoopVisitor {
    type Error = std::convert::Infallible;
}

/// Walk `filter`, invoking the hooks of `visitor`.
pub fn visit<V: Visitor + ?Sized>(filter: &Filter, visitor: &mut V) -> Result<(), V::Error> {
    filter.accept(visitor)
}

/// A node that can be traversed with a [`Visitor`].
pub trait Accept {
    fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) -> Result<(), V::Error>;
}

impl Accept for Filter {
    fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) -> Result<(), V::Error> {
        for expression in &self.expressions {
            expression.accept(visitor)?;
        }
        Ok(())
    }
}

impl Accept for Expression {
    fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) -> Result<(), V::Error> {
        for sequence in &self.sequences {
            sequence.accept(visitor)?;
        }
        Ok(())
    }
}

impl Accept for Sequence {
    fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) -> Result<(), V::Error> {
        for factor in &self.factors {
            factor.accept(visitor)?;
        }
        visitor.visit_sequence(self)
    }
}

impl Accept for Factor {
    fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) -> Result<(), V::Error> {
        for term in &self.terms {
            term.accept(visitor)?;
        }
        visitor.visit_factor(self)
    }
}

impl Accept for Term {
    fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) -> Result<(), V::Error> {
        self.simple.accept(visitor)?;
        visitor.visit_term(self)
    }
}

impl Accept for Simple {
    fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) -> Result<(), V::Error> {
        match self {
            Simple::Restriction(restriction) => restriction.accept(visitor),
            // Composites are opaque.
            Simple::Composite(_) => Ok(()),
        }
    }
}

impl Accept for Restriction {
    fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) -> Result<(), V::Error> {
        self.comparable.accept(visitor)?;
        visitor.visit_restriction(self)
    }
}

impl Accept for Comparable {
    fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) -> Result<(), V::Error> {
        match self {
            Comparable::Function(function) => visitor.visit_function(function),
            Comparable::Member(member) => visitor.visit_member(member),
        }
    }
}
