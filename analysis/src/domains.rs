use core::cmp::Ordering;
use core::fmt::Debug;
use core::ops::{Deref, DerefMut};

use fixedbitset::FixedBitSet;

/////////////////////////
// Traits for domains. //
/////////////////////////

/// A join semi-lattice is a partially ordered set where the least upper
/// bound exists for every finite subset. The ordering relation reads as
/// "safe approximation": the interval \[4, 7\] safely approximates \[5, 6\],
/// the sign Top safely approximates Positive. Top is the biggest element
/// (no information), Bottom is the smallest one (unreachable or not yet
/// computed).
pub trait JoinSemiLattice: Eq + PartialOrd + Clone + Debug {
    /// Information about the lattice kept on the side, e.g., the universe
    /// of a set lattice. Set this to unit when no such value is needed.
    type LatticeContext;

    /// The unit element of the join operation.
    ///
    /// Required to be the smallest element according to the ordering.
    fn bottom(ctx: &Self::LatticeContext) -> Self;

    /// The least upper bound of the arguments. Used to compute the state at
    /// merge points, where the state has to over approximate all the incoming
    /// states.
    ///
    /// Requirements:
    /// * Reflexive: a.join(a, ctx) == a
    /// * Commutative: a.join(b, ctx) == b.join(a, ctx)
    /// * Bottom is unit: bottom.join(b, ctx) == b
    /// * Upper bound: a.join(b, ctx) >= a and a.join(b, ctx) >= b
    /// * Ordering is respected: a <= b => a.join(b, ctx) == b
    fn join(&self, other: &Self, ctx: &Self::LatticeContext) -> Self;

    /// Lattices with infinite (or very long) ascending chains override this
    /// to guarantee convergence by dropping the constraints that did not
    /// stabilize since the previous iteration. The iteration number is an
    /// approximation of the number of passes over the whole graph.
    ///
    /// Requirements:
    /// * Reflexive: a.widen(a, ctx, i) == a
    /// * b.widen(a, ctx, i) >= b
    fn widen(&self, _previous: &Self, _ctx: &Self::LatticeContext, _iteration: usize) -> Self {
        self.clone()
    }
}

pub trait JoinSemiLatticeNoContext: JoinSemiLattice {
    /// See [JoinSemiLattice::bottom] for details. This version does not
    /// require a context.
    fn bottom_() -> Self;

    /// See [JoinSemiLattice::join] for details. This version does not
    /// require a context.
    fn join_(&self, other: &Self) -> Self;

    /// See [JoinSemiLattice::widen] for details. This version does not
    /// require a context.
    fn widen_(&self, previous: &Self, iteration: usize) -> Self;
}

impl<L: JoinSemiLattice<LatticeContext = ()>> JoinSemiLatticeNoContext for L {
    fn bottom_() -> Self {
        <L as JoinSemiLattice>::bottom(&())
    }

    fn join_(&self, other: &Self) -> Self {
        self.join(other, &())
    }

    fn widen_(&self, previous: &Self, iteration: usize) -> Self {
        self.widen(previous, &(), iteration)
    }
}

/// A join semi-lattice that also has greatest lower bounds. Must analyses
/// combine states with meet instead of join.
pub trait Lattice: JoinSemiLattice {
    /// The unit element of the meet operation, the largest element of the
    /// lattice.
    fn top(ctx: &Self::LatticeContext) -> Self;

    /// The greatest lower bound of the arguments. Also useful to exclude
    /// infeasible states when evaluating conditions.
    ///
    /// * Reflexive: a.meet(a, ctx) == a
    /// * Commutative: a.meet(b, ctx) == b.meet(a, ctx)
    /// * Top is unit: top.meet(b, ctx) == b
    /// * Lower bound: a.meet(b, ctx) <= a and a.meet(b, ctx) <= b
    fn meet(&self, other: &Self, ctx: &Self::LatticeContext) -> Self;
}

pub trait LatticeNoContext: Lattice {
    /// See [Lattice::top] for details. This version does not
    /// require a context.
    fn top_() -> Self;

    /// See [Lattice::meet] for details. This version does not
    /// require a context.
    fn meet_(&self, other: &Self) -> Self;
}

impl<L: Lattice<LatticeContext = ()>> LatticeNoContext for L {
    fn top_() -> Self {
        <L as Lattice>::top(&())
    }

    fn meet_(&self, other: &Self) -> Self {
        self.meet(other, &())
    }
}

/////////////////////////////////////
// Concrete domain implementations //
/////////////////////////////////////

/// Power set lattice over `[0, n)` backed by a fixed size bit vector. Two
/// bit sets are only compared or combined when they were created with the
/// same context, i.e., over the same universe.
#[derive(PartialEq, Eq, Clone)]
pub struct BitSet(pub FixedBitSet);

impl Deref for BitSet {
    type Target = FixedBitSet;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for BitSet {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// The size of the universe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitSetTop(pub usize);

impl BitSet {
    pub fn from(ctx: &BitSetTop, values: &[usize]) -> Self {
        let mut inner = FixedBitSet::with_capacity(ctx.0);
        for &v in values {
            inner.insert(v);
        }
        Self(inner)
    }

    /// Transfer of gen/kill problems: `(self - kill) | gens`. Generated
    /// elements survive even when the same operation kills them.
    pub fn kill_gen(&self, kill: &BitSet, gens: &BitSet) -> Self {
        let mut result = self.clone();
        result.difference_with(kill);
        result.union_with(gens);
        result
    }
}

impl PartialOrd for BitSet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.is_superset(other), other.is_superset(self)) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Greater),
            (false, true) => Some(Ordering::Less),
            (_, _) => None,
        }
    }
}

impl Debug for BitSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let elements: Vec<String> = self.ones().map(|x| x.to_string()).collect();
        write!(f, "{{{}}}", elements.join(", "))
    }
}

impl JoinSemiLattice for BitSet {
    type LatticeContext = BitSetTop;

    fn bottom(ctx: &Self::LatticeContext) -> Self {
        Self(FixedBitSet::with_capacity(ctx.0))
    }

    fn join(&self, other: &Self, _ctx: &Self::LatticeContext) -> Self {
        let mut result = self.clone();
        result.union_with(other);
        result
    }
}

impl Lattice for BitSet {
    fn top(ctx: &Self::LatticeContext) -> Self {
        let mut result = FixedBitSet::with_capacity(ctx.0);
        result.insert_range(..);
        Self(result)
    }

    fn meet(&self, other: &Self, _ctx: &Self::LatticeContext) -> Self {
        let mut result = self.clone();
        result.intersect_with(other);
        result
    }
}

mod numerical;
pub use numerical::*;

mod transformers;
pub use transformers::*;
