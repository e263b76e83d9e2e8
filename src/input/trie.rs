//! A small sequence trie backing compose resolution and synthetic-key
//! recognition.
//!
//! Two queries matter to the pipeline state machines: "is this exact
//! sequence bound to a value" and "does any bound sequence start with this
//! prefix".

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
struct Node<K, V> {
    value: Option<V>,
    children: HashMap<K, Node<K, V>>,
}

impl<K, V> Default for Node<K, V> {
    fn default() -> Self {
        Self {
            value: None,
            children: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SequenceTrie<K, V> {
    root: Node<K, V>,
}

impl<K: Eq + Hash + Clone, V> Default for SequenceTrie<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone, V> SequenceTrie<K, V> {
    pub fn new() -> Self {
        Self {
            root: Node::default(),
        }
    }

    pub fn insert<I>(&mut self, sequence: I, value: V)
    where
        I: IntoIterator<Item = K>,
    {
        let mut node = &mut self.root;
        for key in sequence {
            node = node.children.entry(key).or_default();
        }
        node.value = Some(value);
    }

    fn node<Q>(&self, prefix: &[Q]) -> Option<&Node<K, V>>
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash,
    {
        let mut node = &self.root;
        for key in prefix {
            node = node.children.get(key)?;
        }
        Some(node)
    }

    /// The value bound to exactly this sequence, if any.
    pub fn get<Q>(&self, sequence: &[Q]) -> Option<&V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash,
    {
        self.node(sequence)?.value.as_ref()
    }

    /// True when some bound sequence has this prefix (including exact
    /// matches).
    pub fn has_node<Q>(&self, prefix: &[Q]) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash,
    {
        self.node(prefix).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty() && self.root.value.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SequenceTrie<char, char> {
        let mut t = SequenceTrie::new();
        t.insert(['<', '<'], '«');
        t.insert(['>', '>'], '»');
        t.insert(['-', '-', '-'], '—');
        t
    }

    #[test]
    fn exact_lookup() {
        let t = sample();
        assert_eq!(t.get(&['<', '<']), Some(&'«'));
        assert_eq!(t.get(&['<']), None);
        assert_eq!(t.get(&['<', '>']), None);
    }

    #[test]
    fn prefix_lookup() {
        let t = sample();
        assert!(t.has_node(&[]));
        assert!(t.has_node(&['-']));
        assert!(t.has_node(&['-', '-']));
        assert!(t.has_node(&['-', '-', '-']));
        assert!(!t.has_node(&['-', '<']));
    }

    #[test]
    fn empty_trie() {
        let t: SequenceTrie<char, char> = SequenceTrie::new();
        assert!(t.is_empty());
        assert!(t.has_node(&[]));
        assert_eq!(t.get(&[]), None);
    }
}
