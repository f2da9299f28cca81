use crate::predicate::Predicate;

/// Something records can be selected from.
///
/// A real implementation runs the predicates it is given against its
/// backing store. Filters only ever call these two methods.
pub trait QuerySource {
    /// Keep only records matching `predicate`.
    fn include(&mut self, predicate: Predicate);
    /// Drop records matching `predicate`.
    fn exclude(&mut self, predicate: Predicate);
}

/// A [`QuerySource`] that records what it's asked to do.
///
/// Filters are run against a proxy standing in for `source`, so that
/// their effect can be captured as a [`Predicate`] and combined with
/// other predicates before anything reaches the real source. Included
/// predicates are AND-ed into the capture, excluded predicates are
/// negated and then AND-ed.
pub struct QueryCaptureProxy<'s, S: ?Sized> {
    source: &'s S,
    q: Predicate,
}

impl<'s, S: ?Sized> QueryCaptureProxy<'s, S> {
    pub fn new(source: &'s S) -> Self {
        Self {
            source,
            q: Predicate::True,
        }
    }

    /// The source this proxy stands in for.
    pub fn source(&self) -> &'s S {
        self.source
    }

    pub fn predicate(&self) -> &Predicate {
        &self.q
    }

    pub fn into_predicate(self) -> Predicate {
        self.q
    }
}

impl<'s, S: ?Sized> QuerySource for QueryCaptureProxy<'s, S> {
    fn include(&mut self, predicate: Predicate) {
        let q = std::mem::take(&mut self.q);
        self.q = q & predicate;
    }

    fn exclude(&mut self, predicate: Predicate) {
        let q = std::mem::take(&mut self.q);
        self.q = q & !predicate;
    }
}
