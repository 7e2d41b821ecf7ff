//! The filter expression and its evaluation.

use std::{borrow::Cow, ops};

use ecb_ecs::{Component, ComponentMetadata};
use smallvec::SmallVec;

/// Sorted, deduplicated component names.
pub type Names = SmallVec<[Cow<'static, str>; 4]>;

fn normalize<I, S>(names: I) -> Names
where
    I: IntoIterator<Item = S>,
    S: Into<Cow<'static, str>>,
{
    let mut names: Names = names.into_iter().map(Into::into).collect();
    names.sort_unstable();
    names.dedup();
    names
}

/// A predicate over an archetype's component names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentFilter {
    /// Matches every archetype.
    All,
    /// Matches when every inner filter matches.
    And(Vec<ComponentFilter>),
    /// Matches when any inner filter matches.
    Or(Vec<ComponentFilter>),
    /// Inverts the inner filter.
    Not(Box<ComponentFilter>),
    /// Matches archetypes with exactly these components.
    Exact(Names),
    /// Matches archetypes that have at least these components.
    Contains(Names),
}

impl ComponentFilter {
    /// Filter matching everything.
    #[must_use]
    pub const fn all() -> Self {
        Self::All
    }

    /// Filter matching exactly the given component names.
    pub fn exact<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Cow<'static, str>>,
    {
        Self::Exact(normalize(names))
    }

    /// Filter matching archetypes that include the given component names.
    pub fn contains<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Cow<'static, str>>,
    {
        Self::Contains(normalize(names))
    }

    /// [`exact`](Self::exact) over a tuple of component types.
    #[must_use]
    pub fn exact_types<T: ComponentTuple>() -> Self {
        Self::exact(T::names())
    }

    /// [`contains`](Self::contains) over a tuple of component types.
    #[must_use]
    pub fn contains_types<T: ComponentTuple>() -> Self {
        Self::contains(T::names())
    }

    /// Both filters must match.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match self {
            Self::And(mut filters) => {
                filters.push(other);
                Self::And(filters)
            }
            first => Self::And(vec![first, other]),
        }
    }

    /// Either filter may match.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match self {
            Self::Or(mut filters) => {
                filters.push(other);
                Self::Or(filters)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    /// Evaluate against a set of component names.
    ///
    /// `components` is expected to be duplicate-free, as archetype sets are.
    #[must_use]
    pub fn matches<S: AsRef<str>>(&self, components: &[S]) -> bool {
        let has = |name: &str| components.iter().any(|c| c.as_ref() == name);

        match self {
            Self::All => true,
            Self::And(filters) => filters.iter().all(|f| f.matches(components)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(components)),
            Self::Not(inner) => !inner.matches(components),
            Self::Exact(names) => {
                names.len() == components.len() && names.iter().all(|n| has(n))
            }
            Self::Contains(names) => names.iter().all(|n| has(n)),
        }
    }

    /// Evaluate against component descriptors.
    #[must_use]
    pub fn matches_components(&self, components: &[&ComponentMetadata]) -> bool {
        let names: SmallVec<[&str; 8]> = components.iter().map(|c| c.name()).collect();
        self.matches(&names)
    }
}

impl ops::Not for ComponentFilter {
    type Output = Self;

    fn not(self) -> Self {
        Self::Not(Box::new(self))
    }
}

/// A tuple of component types, used to build filters from types.
pub trait ComponentTuple {
    /// The component names in tuple order.
    fn names() -> SmallVec<[&'static str; 8]>;
}

macro_rules! impl_component_tuple {
    ($($t:ident),+) => {
        impl<$($t: Component),+> ComponentTuple for ($($t,)+) {
            fn names() -> SmallVec<[&'static str; 8]> {
                smallvec::smallvec![$($t::NAME),+]
            }
        }
    };
}

impl_component_tuple!(A);
impl_component_tuple!(A, B);
impl_component_tuple!(A, B, C);
impl_component_tuple!(A, B, C, D);
impl_component_tuple!(A, B, C, D, E);
impl_component_tuple!(A, B, C, D, E, F);
impl_component_tuple!(A, B, C, D, E, F, G);
impl_component_tuple!(A, B, C, D, E, F, G, H);
