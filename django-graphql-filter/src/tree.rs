//! Path trees.
//!
//! Filters are declared flat, as a field path plus a lookup
//! (`user__email__contains`). The schema is nested, so the
//! declarations are first grouped into a forest: one root per
//! top-level field, one node per path segment, and the lookups as
//! terminals at the bottom.
//!
//! A sequence is grafted onto an existing tree by walking down the
//! children that match its segments, and appending the unmatched
//! remainder as a new chain at the point where they diverge. Children
//! keep insertion order, so the forest is stable for a stable input.

use crate::conf::LOOKUP_SEP;
use crate::error::ConfigError;
use crate::filterset::FilterSet;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    /// The key of the filter terminating here, if any.
    pub filter_key: Option<String>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filter_key: None,
            children: Vec::new(),
        }
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Length of the longest path down to a leaf.
    pub fn height(&self) -> usize {
        self.children
            .iter()
            .map(|c| c.height() + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn is_terminal(&self) -> bool {
        self.filter_key.is_some()
    }

    /// Number of terminals in this subtree.
    pub fn terminals(&self) -> usize {
        usize::from(self.is_terminal()) + self.children.iter().map(Node::terminals).sum::<usize>()
    }
}

/// Build a linear chain from `values`, terminating in `filter_key`.
pub fn sequence_to_tree<S: AsRef<str>>(values: &[S], filter_key: &str) -> Node {
    match values.split_first() {
        Some((head, [])) => Node {
            filter_key: Some(filter_key.to_string()),
            ..Node::new(head.as_ref())
        },
        Some((head, rest)) => Node {
            children: vec![sequence_to_tree(rest, filter_key)],
            ..Node::new(head.as_ref())
        },
        None => Node {
            filter_key: Some(filter_key.to_string()),
            ..Node::new("")
        },
    }
}

/// Try to graft `values` onto the tree at `root`.
///
/// Returns whether the tree was changed, which is the case exactly
/// when the first value names `root`.
pub fn try_add_sequence<S: AsRef<str>>(
    root: &mut Node,
    values: &[S],
    filter_key: &str,
) -> Result<bool, ConfigError> {
    let (head, rest) = match values.split_first() {
        Some(split) => split,
        None => return Ok(false),
    };
    if root.name != head.as_ref() {
        return Ok(false);
    }
    if rest.is_empty() {
        return match &root.filter_key {
            Some(existing) if existing != filter_key => Err(ConfigError::DuplicateTerminal(
                existing.clone(),
                filter_key.to_string(),
            )),
            _ => {
                root.filter_key = Some(filter_key.to_string());
                Ok(true)
            }
        };
    }
    for child in root.children.iter_mut() {
        if try_add_sequence(child, rest, filter_key)? {
            return Ok(true);
        }
    }
    root.children.push(sequence_to_tree(rest, filter_key));
    Ok(true)
}

/// Group `(field path, lookup, filter key)` declarations into a forest.
pub fn build_forest<'a, I>(declarations: I) -> Result<Vec<Node>, ConfigError>
where
    I: IntoIterator<Item = (&'a str, &'a str, &'a str)>,
{
    let mut trees: Vec<Node> = Vec::new();
    for (field_path, lookup, filter_key) in declarations {
        let values: Vec<&str> = field_path
            .split(LOOKUP_SEP)
            .chain(std::iter::once(lookup))
            .collect();
        let mut added = false;
        for tree in trees.iter_mut() {
            if try_add_sequence(tree, &values, filter_key)? {
                added = true;
                break;
            }
        }
        if !added {
            trees.push(sequence_to_tree(&values, filter_key));
        }
    }
    Ok(trees)
}

/// The forest of every filter in `filterset`, in declaration order.
pub fn filterset_to_trees(filterset: &FilterSet) -> Result<Vec<Node>, ConfigError> {
    build_forest(
        filterset
            .filters()
            .map(|(key, f)| (f.field_name.as_str(), f.lookup.as_str(), key)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(nodes: &[Node]) -> Vec<&str> {
        nodes.iter().map(|n| n.name.as_str()).collect()
    }

    #[test]
    fn sequence() {
        let tree = sequence_to_tree(&["user", "email", "exact"], "user__email");
        assert_eq!(tree.name, "user");
        assert_eq!(tree.height(), 2);
        let leaf = tree.child("email").unwrap().child("exact").unwrap();
        assert_eq!(leaf.filter_key.as_deref(), Some("user__email"));
        assert_eq!(tree.terminals(), 1);
    }

    #[test]
    fn graft() {
        let mut tree = sequence_to_tree(&["user", "email", "exact"], "user__email");
        assert!(try_add_sequence(&mut tree, &["user", "email", "contains"], "user__email__contains").unwrap());
        assert!(try_add_sequence(&mut tree, &["user", "last_name", "exact"], "user__last_name").unwrap());
        assert!(!try_add_sequence(&mut tree, &["name", "exact"], "name").unwrap());
        assert_eq!(names(&tree.children), vec!["email", "last_name"]);
        assert_eq!(names(&tree.child("email").unwrap().children), vec!["exact", "contains"]);
        assert_eq!(tree.terminals(), 3);
    }

    #[test]
    fn forest() {
        let forest = build_forest([
            ("name", "exact", "name"),
            ("user__email", "exact", "user__email"),
            ("name", "contains", "name__contains"),
            ("user__email", "contains", "user__email__contains"),
        ])
        .unwrap();
        assert_eq!(names(&forest), vec!["name", "user"]);
        assert_eq!(forest.iter().map(Node::terminals).sum::<usize>(), 4);
    }

    #[test]
    fn prefix_is_terminal_and_branching() {
        let forest = build_forest([
            ("a", "b", "a__b_lookup"),
            ("a__b", "exact", "a__b"),
        ])
        .unwrap();
        assert_eq!(forest.len(), 1);
        let b = forest[0].child("b").unwrap();
        assert_eq!(b.filter_key.as_deref(), Some("a__b_lookup"));
        assert_eq!(names(&b.children), vec!["exact"]);
        assert_eq!(b.height(), 1);
    }

    #[test]
    fn order_independent() {
        fn shape(n: &Node) -> Vec<String> {
            let mut v = vec![format!("{}:{:?}", n.name, n.filter_key)];
            for c in &n.children {
                v.extend(shape(c).into_iter().map(|s| format!("{}/{}", n.name, s)));
            }
            v.sort();
            v
        }
        let decls = [
            ("a", "b", "k1"),
            ("a__b", "exact", "k2"),
            ("a__c", "gt", "k3"),
            ("d", "exact", "k4"),
        ];
        let forward = build_forest(decls).unwrap();
        let backward = build_forest(decls.iter().rev().copied()).unwrap();
        let mut f: Vec<_> = forward.iter().flat_map(shape).collect();
        let mut b: Vec<_> = backward.iter().flat_map(shape).collect();
        f.sort();
        b.sort();
        assert_eq!(f, b);
    }

    #[test]
    fn duplicate_terminal() {
        let res = build_forest([("name", "exact", "name"), ("name", "exact", "name_is")]);
        assert!(matches!(res, Err(ConfigError::DuplicateTerminal(a, b)) if a == "name" && b == "name_is"));
        assert!(build_forest([("name", "exact", "name"), ("name", "exact", "name")]).is_ok());
    }
}
