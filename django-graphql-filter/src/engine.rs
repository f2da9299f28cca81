//! Turning submitted filter trees into predicates.
//!
//! [`PredicateEngine::filter_queryset`] runs the whole pipeline for
//! one request: the tree is normalised, each node validated, and only
//! if nothing failed is the predicate composed and handed to the
//! source, once.
//!
//! Composition is recursive. For a node with fields `F`, `and`
//! children `A`, `or` children `O` and a `not` child `N` the result is
//!
//! ```text
//! F1 & F2 & ... & A1 & A2 & ... & (O1 | O2 | ...) & !N
//! ```
//!
//! where a missing part is left out. An `or` child that constrains
//! nothing is skipped rather than matching everything. Each field filter is run against
//! a [`QueryCaptureProxy`], so the clauses it would apply are captured
//! as a predicate rather than executed.

use log::{debug, trace};
use serde_json::Value;

use crate::annotated::AnnotatedLookupRegistry;
use crate::conf::Settings;
use crate::data::{FilterData, TreeDataNormalizer};
use crate::error::FilterError;
use crate::filterset::FilterSet;
use crate::form::TreeForm;
use crate::predicate::Predicate;
use crate::proxy::{QueryCaptureProxy, QuerySource};

pub struct PredicateEngine<'a> {
    filterset: &'a FilterSet,
    settings: &'a Settings,
    lookups: &'a AnnotatedLookupRegistry,
}

impl<'a> PredicateEngine<'a> {
    pub fn new(
        filterset: &'a FilterSet,
        settings: &'a Settings,
        lookups: &'a AnnotatedLookupRegistry,
    ) -> Self {
        Self {
            filterset,
            settings,
            lookups,
        }
    }

    pub fn filterset(&self) -> &'a FilterSet {
        self.filterset
    }

    pub fn settings(&self) -> &'a Settings {
        self.settings
    }

    pub fn normalize(&self, tree: &Value) -> Result<FilterData, FilterError> {
        TreeDataNormalizer::new(self.filterset, self.settings, self.lookups).normalize(tree)
    }

    pub fn form(&self, data: &FilterData) -> TreeForm<'a> {
        TreeForm::new(self.filterset, data)
    }

    /// Compose the predicate for a validated form.
    ///
    /// `source` is only handed to the capture proxies; it is never
    /// filtered.
    pub fn compose<S: ?Sized>(&self, source: &S, form: &TreeForm) -> Result<Predicate, FilterError> {
        let mut seq = 0;
        self.compose_node(source, form, &mut seq)
    }

    fn compose_node<S: ?Sized>(
        &self,
        source: &S,
        form: &TreeForm,
        seq: &mut usize,
    ) -> Result<Predicate, FilterError> {
        let mut proxy = QueryCaptureProxy::new(source);
        for (key, value) in form.cleaned_data() {
            let filter = self
                .filterset
                .find_filter(key)
                .map_err(|_| FilterError::NoFilter(key.clone()))?;
            filter.filter(&mut proxy, value, *seq)?;
            *seq += 1;
        }
        let mut q = proxy.into_predicate();
        for child in form.and_forms() {
            q = q & self.compose_node(source, child, seq)?;
        }
        let mut any: Option<Predicate> = None;
        for child in form.or_forms() {
            let p = self.compose_node(source, child, seq)?;
            // an alternative that constrains nothing is left out
            if p.is_true() {
                continue;
            }
            any = Some(match any {
                Some(a) => a | p,
                None => p,
            });
        }
        if let Some(any) = any {
            q = q & any;
        }
        if let Some(child) = form.not_form() {
            let p = self.compose_node(source, child, seq)?;
            if !p.is_true() {
                q = q & !p;
            }
        }
        Ok(q)
    }

    /// Filter `source` with a submitted tree.
    ///
    /// Returns the predicate that was applied. On a validation error
    /// the source is left untouched.
    pub fn filter_queryset<S: QuerySource>(
        &self,
        source: &mut S,
        tree: &Value,
    ) -> Result<Predicate, FilterError> {
        let data = self.normalize(tree)?;
        let form = self.form(&data);
        if !form.is_valid() {
            let errors = form.errors();
            debug!("{} rejected filter: {}", self.filterset.name(), errors);
            return Err(FilterError::Validation(errors));
        }
        let predicate = self.compose(&*source, &form)?;
        trace!("{} filtering with {}", self.filterset.name(), predicate);
        source.include(predicate.clone());
        Ok(predicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::Features;
    use crate::filters::Lookup;
    use crate::filterset::FilterSetBuilder;
    use crate::model::{FieldKind, ModelField, ModelMeta};
    use crate::predicate::{Comparison, Operand, Rhs};
    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        included: Vec<Predicate>,
    }

    impl QuerySource for Recorder {
        fn include(&mut self, predicate: Predicate) {
            self.included.push(predicate);
        }
        fn exclude(&mut self, _predicate: Predicate) {
            panic!("the engine only includes");
        }
    }

    fn filterset() -> FilterSet {
        let model = ModelMeta::new("Task")
            .with_field("name", ModelField::new(FieldKind::String))
            .with_field("priority", ModelField::new(FieldKind::Integer));
        FilterSetBuilder::new(model)
            .fields("name", &["exact", "contains"])
            .fields("priority", &["exact", "gt"])
            .build(&Features::none(), &AnnotatedLookupRegistry::default())
            .unwrap()
    }

    fn cmp(path: &str, lookup: Lookup, rhs: Value) -> Predicate {
        Predicate::Compare(Comparison {
            lhs: Operand::field(path),
            lookup,
            rhs: Rhs::Value(rhs),
        })
    }

    fn run(tree: Value) -> (Result<Predicate, FilterError>, Recorder) {
        let fs = filterset();
        let settings = Settings::default();
        let lookups = AnnotatedLookupRegistry::default();
        let engine = PredicateEngine::new(&fs, &settings, &lookups);
        let mut source = Recorder::default();
        let res = engine.filter_queryset(&mut source, &tree);
        (res, source)
    }

    #[test]
    fn composes() {
        let (res, source) = run(json!({
            "name": {"contains": "a"},
            "and": [{"priority": {"gt": 1}}],
            "or": [{"name": {"exact": "x"}}, {"name": {"exact": "y"}}],
            "not": {"priority": {"exact": 3}},
        }));
        let expected = cmp("name", Lookup::Contains, json!("a"))
            & cmp("priority", Lookup::Gt, json!(1))
            & (cmp("name", Lookup::Exact, json!("x")) | cmp("name", Lookup::Exact, json!("y")))
            & !cmp("priority", Lookup::Exact, json!(3));
        assert_eq!(res.unwrap(), expected);
        assert_eq!(source.included, vec![expected]);
    }

    #[test]
    fn empty_branches() {
        let (res, _) = run(json!({"name": {"exact": "a"}, "or": [], "and": [], "not": {}}));
        assert_eq!(res.unwrap(), cmp("name", Lookup::Exact, json!("a")));
        let (res, _) = run(json!({"name": {"exact": "a"}, "or": [{}, {}]}));
        assert_eq!(res.unwrap(), cmp("name", Lookup::Exact, json!("a")));
    }

    #[test]
    fn empty_or_child_is_skipped() {
        let (res, _) = run(json!({"name": {"exact": "a"}, "or": [{}, {"priority": {"exact": 3}}]}));
        assert_eq!(
            res.unwrap(),
            cmp("name", Lookup::Exact, json!("a")) & cmp("priority", Lookup::Exact, json!(3))
        );
        let (res, _) = run(json!({"or": [{"name": "x"}, {}, {"name": "y"}]}));
        assert_eq!(
            res.unwrap(),
            cmp("name", Lookup::Exact, json!("x")) | cmp("name", Lookup::Exact, json!("y"))
        );
    }

    #[test]
    fn explicit_default_lookup() {
        let (implicit, _) = run(json!({"name": "a"}));
        let (explicit, _) = run(json!({"name": {"exact": "a"}}));
        assert_eq!(implicit.unwrap(), explicit.unwrap());
    }

    #[test]
    fn invalid_leaves_source_alone() {
        let (res, source) = run(json!({
            "name": {"exact": "a"},
            "or": [{"name": {"exact": "b"}}, {"priority": {"gt": "many"}}],
        }));
        match res {
            Err(FilterError::Validation(errors)) => {
                let paths: Vec<_> = errors
                    .flatten(&Settings::default())
                    .into_iter()
                    .map(|(p, _)| p)
                    .collect();
                assert_eq!(paths, vec!["or.1.priority__gt"]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(source.included.is_empty());
    }
}
