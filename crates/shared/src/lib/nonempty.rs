use std::slice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("list must contain at least one element")]
pub struct EmptyList;

/// Ordered sequence with at least one element. Emptiness is handled once,
/// at construction; downstream consumers (anchor sets in particular) can
/// rely on `head()` existing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyList<T>(Vec<T>);

impl<T> NonEmptyList<T> {
    pub fn new(head: T, tail: Vec<T>) -> Self {
        let mut items = Vec::with_capacity(1 + tail.len());
        items.push(head);
        items.extend(tail);
        Self(items)
    }

    pub fn singleton(item: T) -> Self {
        Self(vec![item])
    }

    pub fn from_vec(items: Vec<T>) -> Result<Self, EmptyList> {
        if items.is_empty() {
            return Err(EmptyList);
        }
        Ok(Self(items))
    }

    pub fn head(&self) -> &T {
        // Invariant: the inner vec is never empty.
        &self.0[0]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.0
    }

    pub fn contains(&self, item: &T) -> bool
    where
        T: PartialEq,
    {
        self.0.contains(item)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> NonEmptyList<U> {
        NonEmptyList(self.0.into_iter().map(f).collect())
    }

    pub fn into_vec(self) -> Vec<T> {
        self.0
    }
}

impl<T> TryFrom<Vec<T>> for NonEmptyList<T> {
    type Error = EmptyList;

    fn try_from(items: Vec<T>) -> Result<Self, Self::Error> {
        Self::from_vec(items)
    }
}

impl<T> From<NonEmptyList<T>> for Vec<T> {
    fn from(list: NonEmptyList<T>) -> Self {
        list.0
    }
}

impl<T> IntoIterator for NonEmptyList<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a NonEmptyList<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
