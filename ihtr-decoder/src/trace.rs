/// An ordered branch sequence, oldest record first.
///
/// This is the single output convention of both decoders: index 0 is the
/// oldest retained branch, the last index the newest. Presentation layers
/// that print "most recent first" reverse explicitly via
/// [`newest_first`][Self::newest_first].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderedTrace<T> {
    records: Vec<T>,
}

impl<T> OrderedTrace<T> {
    pub(crate) fn from_records(records: Vec<T>) -> Self {
        Self { records }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.records
    }

    /// Oldest-to-newest iteration.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.records.iter()
    }

    /// Newest-to-oldest iteration, for display only.
    pub fn newest_first(&self) -> impl Iterator<Item = &T> {
        self.records.iter().rev()
    }

    #[must_use]
    pub fn into_records(self) -> Vec<T> {
        self.records
    }
}

impl<'a, T> IntoIterator for &'a OrderedTrace<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl<T> IntoIterator for OrderedTrace<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
