use core::cmp::Ordering;
use core::fmt::Display;
use core::ops::{Add, Neg, Sub};

use crate::domains::*;

///     Top
///   /  |  \
///   N  Z  P
///   \  |  /
///    Bottom
#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum Sign {
    Top,
    Bottom,
    Negative,
    Zero,
    Positive,
}

impl From<i64> for Sign {
    fn from(val: i64) -> Self {
        match val.cmp(&0) {
            Ordering::Less => Sign::Negative,
            Ordering::Equal => Sign::Zero,
            Ordering::Greater => Sign::Positive,
        }
    }
}

impl Display for Sign {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl PartialOrd for Sign {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            return Some(Ordering::Equal);
        }
        match other {
            Sign::Bottom => return Some(Ordering::Greater),
            Sign::Top => return Some(Ordering::Less),
            _ => {}
        }
        match self {
            Sign::Bottom => Some(Ordering::Less),
            Sign::Top => Some(Ordering::Greater),
            _ => None,
        }
    }
}

impl JoinSemiLattice for Sign {
    type LatticeContext = ();

    fn bottom(_: &Self::LatticeContext) -> Self {
        Sign::Bottom
    }

    fn join(&self, other: &Self, _: &Self::LatticeContext) -> Self {
        if self == other || *other == Sign::Bottom {
            return *self;
        }

        if *self == Sign::Bottom {
            return *other;
        }

        Sign::Top
    }
}

impl Lattice for Sign {
    fn top(_: &Self::LatticeContext) -> Self {
        Sign::Top
    }

    fn meet(&self, other: &Self, _: &Self::LatticeContext) -> Self {
        if self == other || *other == Sign::Top {
            return *self;
        }

        if *self == Sign::Top {
            return *other;
        }

        Sign::Bottom
    }
}

impl Sign {
    /// Compares the concrete values described by the two signs. Returns
    /// `None` when the result depends on the concrete values.
    pub fn strict_cmp(self, other: Self) -> Option<Ordering> {
        use Sign::*;
        match (self, other) {
            (Zero, Zero) => Some(Ordering::Equal),
            (Negative, Zero | Positive) | (Zero, Positive) => Some(Ordering::Less),
            (Positive, Zero | Negative) | (Zero, Negative) => Some(Ordering::Greater),
            _ => None,
        }
    }
}

impl Add for Sign {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        use Sign::*;
        match (self, rhs) {
            (Top, _) | (_, Top) => Top,
            (Bottom, _) | (_, Bottom) => Bottom,
            (Zero, s) | (s, Zero) => s,
            (s1, s2) if s1 == s2 => s1,
            _ => Top,
        }
    }
}

impl Neg for Sign {
    type Output = Self;

    fn neg(self) -> Self::Output {
        match self {
            Sign::Negative => Sign::Positive,
            Sign::Positive => Sign::Negative,
            _ => self,
        }
    }
}

impl Sub for Sign {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        self + -rhs
    }
}

pub const INF: i64 = i64::MAX;
pub const NEG_INF: i64 = i64::MIN;

/// Closed range of integers. `INF` and `NEG_INF` stand for unbounded ends,
/// any range with `min > max` is empty (bottom).
#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub struct Interval {
    pub min: i64,
    pub max: i64,
}

pub const FALSE_RANGE: Interval = Interval { min: 0, max: 0 };
pub const TRUE_RANGE: Interval = Interval { min: 1, max: 1 };
pub const BOOL_RANGE: Interval = Interval { min: 0, max: 1 };

impl From<i64> for Interval {
    fn from(val: i64) -> Self {
        Self { min: val, max: val }
    }
}

impl Display for Interval {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_bottom() {
            return write!(f, "Bottom");
        }
        let to_str = |x: i64| match x {
            INF => "inf".to_owned(),
            NEG_INF => "-inf".to_owned(),
            _ => x.to_string(),
        };
        write!(f, "[{}, {}]", to_str(self.min), to_str(self.max))
    }
}

impl PartialOrd for Interval {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.is_bottom(), other.is_bottom()) {
            (true, true) => return Some(Ordering::Equal),
            (true, false) => return Some(Ordering::Less),
            (false, true) => return Some(Ordering::Greater),
            (false, false) => {}
        }
        if self == other {
            return Some(Ordering::Equal);
        }
        if self.min <= other.min && self.max >= other.max {
            return Some(Ordering::Greater);
        }
        if self.min >= other.min && self.max <= other.max {
            return Some(Ordering::Less);
        }

        None
    }
}

impl JoinSemiLattice for Interval {
    type LatticeContext = ();

    fn bottom(_: &Self::LatticeContext) -> Self {
        Self {
            min: INF,
            max: NEG_INF,
        }
    }

    fn join(&self, other: &Self, _: &Self::LatticeContext) -> Self {
        if self.is_bottom() {
            return other.canonical();
        }
        if other.is_bottom() {
            return *self;
        }
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// A lower bound that decreased since the previous iteration is dropped
    /// to `NEG_INF`, an upper bound that increased is raised to `INF`.
    fn widen(&self, prev: &Self, _: &Self::LatticeContext, _: usize) -> Self {
        if prev.is_bottom() || self.is_bottom() {
            return self.canonical();
        }
        Self {
            min: if prev.min > self.min {
                NEG_INF
            } else {
                self.min
            },
            max: if prev.max < self.max { INF } else { self.max },
        }
    }
}

impl Lattice for Interval {
    fn top(_: &Self::LatticeContext) -> Self {
        Self {
            min: NEG_INF,
            max: INF,
        }
    }

    fn meet(&self, other: &Self, _: &Self::LatticeContext) -> Self {
        Self {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        }
        .canonical()
    }
}

impl Interval {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }.canonical()
    }

    pub fn is_bottom(&self) -> bool {
        self.min > self.max
    }

    /// Only one representation for bottom, so derived equality works.
    fn canonical(self) -> Self {
        if self.is_bottom() {
            Self::bottom(&())
        } else {
            self
        }
    }

    /// Values of `self` that can be less than some value of `other`.
    pub fn refine_lt(self, other: Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return Self::bottom(&());
        }
        let bound = if other.max == INF {
            INF
        } else {
            other.max.saturating_sub(1)
        };
        Self::new(self.min, self.max.min(bound))
    }

    /// Values of `self` that can be less than or equal to some value of `other`.
    pub fn refine_le(self, other: Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return Self::bottom(&());
        }
        Self::new(self.min, self.max.min(other.max))
    }

    /// Values of `self` that can be greater than some value of `other`.
    pub fn refine_gt(self, other: Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return Self::bottom(&());
        }
        let bound = if other.min == NEG_INF {
            NEG_INF
        } else {
            other.min.saturating_add(1)
        };
        Self::new(self.min.max(bound), self.max)
    }

    /// Values of `self` that can be greater than or equal to some value of `other`.
    pub fn refine_ge(self, other: Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return Self::bottom(&());
        }
        Self::new(self.min.max(other.min), self.max)
    }

    /// Values of `self` that can be equal to some value of `other`.
    pub fn refine_eq(self, other: Self) -> Self {
        self.meet_(&other)
    }

    /// Values of `self` that can differ from some value of `other`. Only a
    /// singleton `other` at one of the ends of `self` can shrink the range.
    pub fn refine_ne(self, other: Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return Self::bottom(&());
        }
        if other.min != other.max {
            return self;
        }
        let val = other.min;
        if self.min == val && self.max == val {
            Self::bottom(&())
        } else if self.min == val {
            Self::new(val + 1, self.max)
        } else if self.max == val {
            Self::new(self.min, val - 1)
        } else {
            self
        }
    }
}

fn saturating_bound(lhs: i64, rhs: i64, unbounded: i64) -> i64 {
    if lhs == unbounded || rhs == unbounded {
        unbounded
    } else {
        lhs.saturating_add(rhs)
    }
}

impl Add for Interval {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        if self.is_bottom() || rhs.is_bottom() {
            return Self::bottom(&());
        }
        Self {
            min: saturating_bound(self.min, rhs.min, NEG_INF),
            max: saturating_bound(self.max, rhs.max, INF),
        }
    }
}

impl Neg for Interval {
    type Output = Self;

    fn neg(self) -> Self {
        if self.is_bottom() {
            return self;
        }
        Self {
            min: if self.max == INF {
                NEG_INF
            } else {
                self.max.saturating_neg()
            },
            max: self.min.saturating_neg(),
        }
    }
}

impl Sub for Interval {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self + -rhs
    }
}
