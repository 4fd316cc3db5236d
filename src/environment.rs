//! The table of named definitions that evaluation resolves free names against.

use crate::box_tree_impl::box_tree_ast::ExprNode;

/// An ordered chain of `name -> value` bindings. Newer bindings shadow older
/// ones with the same name; nothing is ever replaced in place.
#[derive(Debug, Default, Clone)]
pub struct Environment {
    // Oldest binding first; lookups walk from the back.
    bindings: Vec<(String, ExprNode)>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a binding in front of every existing one. The value is copied, so
    /// the caller keeps ownership of its own tree.
    pub fn add(&mut self, name: &str, value: &ExprNode) {
        self.bindings.push((String::from(name), value.clone()));
    }

    /// Returns the most recent value bound to `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<&ExprNode> {
        self.bindings
            .iter()
            .rev()
            .find(|(bound_name, _)| bound_name == name)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Every binding, most recent first, shadowed ones included.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExprNode)> {
        self.bindings
            .iter()
            .rev()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Drops every binding.
    pub fn clear(&mut self) {
        self.bindings.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_unbound() {
        let env = Environment::new();
        assert!(env.lookup("id").is_none());
        assert!(env.is_empty());
    }

    #[test]
    fn test_later_binding_shadows_earlier() {
        let mut env = Environment::new();
        env.add("x", &ExprNode::var("a"));
        env.add("y", &ExprNode::var("b"));
        env.add("x", &ExprNode::var("c"));

        assert_eq!(env.lookup("x"), Some(&ExprNode::var("c")));
        assert_eq!(env.lookup("y"), Some(&ExprNode::var("b")));
        assert_eq!(env.len(), 3);

        let names: Vec<&str> = env.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["x", "y", "x"]);
    }

    // Values are copied in, so dropping or changing the original tree does
    // not affect the stored binding.
    #[test]
    fn test_values_are_copied_on_insert() {
        let mut env = Environment::new();
        let mut value = ExprNode::abs("x", ExprNode::var("x"));
        env.add("id", &value);

        value = ExprNode::var("changed");

        assert_eq!(value, ExprNode::var("changed"));
        assert_eq!(env.lookup("id").map(|v| v.to_string()), Some(String::from("(λx.x)")));
    }

    #[test]
    fn test_clear() {
        let mut env = Environment::new();
        env.add("x", &ExprNode::var("a"));
        env.clear();

        assert!(!env.contains("x"));
    }
}
