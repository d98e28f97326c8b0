use core::cmp::Ordering;
use core::fmt::Debug;
use core::hash::Hash;
use core::ops::{Deref, DerefMut};
use std::collections::{HashMap, HashSet};

use crate::domains::*;

/////////////////////////
// Domain transformers //
/////////////////////////

/// Maps keys to lattice values, ordered pointwise. A missing key stands
/// for bottom, so the empty map is the bottom of the lattice. The
/// context holds the universe of keys, only needed to build top.
#[derive(PartialEq, Eq, Clone)]
pub struct Map<K: Eq + Hash, V: JoinSemiLattice>(pub HashMap<K, V>);

pub struct MapCtx<K: Eq + Hash, V: JoinSemiLattice>(pub HashSet<K>, pub V::LatticeContext);

impl<K: Eq + Hash, V: JoinSemiLattice<LatticeContext = ()>> MapCtx<K, V> {
    /// Join semi-lattices never need the universe of keys.
    pub fn for_join_semi_lattice() -> Self {
        Self(HashSet::new(), ())
    }
}

impl<K: Eq + Hash, V: JoinSemiLattice> Default for Map<K, V> {
    fn default() -> Self {
        Self(HashMap::new())
    }
}

impl<K: Eq + Hash, V: JoinSemiLattice> Deref for Map<K, V> {
    type Target = HashMap<K, V>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<K: Eq + Hash, V: JoinSemiLattice> DerefMut for Map<K, V> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<K: Eq + Hash + Debug, V: JoinSemiLattice> Debug for Map<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut elements: Vec<String> = self
            .iter()
            .map(|(k, v)| format!("({k:?}, {v:?})"))
            .collect();
        elements.sort_unstable();
        write!(f, "Map({})", elements.join(", "))
    }
}

impl<K: Eq + Hash, V: JoinSemiLattice> Map<K, V> {
    pub fn get_or_bottom(&self, key: &K, ctx: &MapCtx<K, V>) -> V {
        self.get(key).cloned().unwrap_or_else(|| V::bottom(&ctx.1))
    }

    /// Entries of `self` that are different in `other`.
    pub fn changed_values(&self, other: &Self) -> HashMap<K, V>
    where
        K: Clone,
    {
        self.iter()
            .filter(|&(k, v)| other.get(k) != Some(v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl<K: Eq + Hash, V: Lattice> Map<K, V> {
    pub fn get_or_top(&self, key: &K, ctx: &MapCtx<K, V>) -> V {
        self.get(key).cloned().unwrap_or_else(|| V::top(&ctx.1))
    }
}

impl<K: Eq + Hash, V: JoinSemiLattice> PartialOrd for Map<K, V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        // Missing keys are bottom, anything compares greater or equal.
        let covers = |lhs: &Self, rhs: &Self| {
            rhs.iter()
                .all(|(k, v)| lhs.get(k).is_some_and(|lhs_v| lhs_v >= v))
        };
        match (covers(self, other), covers(other, self)) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Greater),
            (false, true) => Some(Ordering::Less),
            (false, false) => None,
        }
    }
}

impl<K: Eq + Hash + Clone + Debug, V: JoinSemiLattice> JoinSemiLattice for Map<K, V> {
    type LatticeContext = MapCtx<K, V>;

    fn bottom(_: &Self::LatticeContext) -> Self {
        Self(HashMap::new())
    }

    fn join(&self, other: &Self, ctx: &Self::LatticeContext) -> Self {
        let mut result = self.clone();
        for (k, v) in other.iter() {
            result
                .entry(k.clone())
                .and_modify(|current| *current = current.join(v, &ctx.1))
                .or_insert_with(|| v.clone());
        }
        result
    }

    fn widen(&self, previous: &Self, ctx: &Self::LatticeContext, iteration: usize) -> Self {
        let mut result = self.clone();
        for (k, v) in result.iter_mut() {
            if let Some(prev) = previous.get(k) {
                *v = v.widen(prev, &ctx.1, iteration);
            }
        }
        result
    }
}

impl<K: Eq + Hash + Clone + Debug, V: Lattice> Lattice for Map<K, V> {
    fn top(ctx: &Self::LatticeContext) -> Self {
        Self(
            ctx.0
                .iter()
                .map(|k| (k.clone(), V::top(&ctx.1)))
                .collect(),
        )
    }

    fn meet(&self, other: &Self, ctx: &Self::LatticeContext) -> Self {
        Self(
            self.iter()
                .filter_map(|(k, v)| other.get(k).map(|o| (k.clone(), v.meet(o, &ctx.1))))
                .collect(),
        )
    }
}
