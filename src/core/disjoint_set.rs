//! Union-find over arbitrary hashable identifiers.
//!
//! Elements are registered lazily the first time they are seen by `find` or
//! `union`, so callers never need a separate "add" step. Internally every
//! element gets an arena slot; parent and rank live in parallel vectors.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
pub struct DisjointSet<T> {
    index: HashMap<T, usize>,
    elements: Vec<T>,
    parent: Vec<usize>,
    rank: Vec<u32>,
}

impl<T: Eq + Hash + Clone> DisjointSet<T> {
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
            elements: Vec::new(),
            parent: Vec::new(),
            rank: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Elements in first-registration order.
    pub fn elements(&self) -> &[T] {
        &self.elements
    }

    fn slot(&mut self, x: &T) -> usize {
        if let Some(&i) = self.index.get(x) {
            return i;
        }
        let i = self.elements.len();
        self.index.insert(x.clone(), i);
        self.elements.push(x.clone());
        self.parent.push(i);
        self.rank.push(0);
        i
    }

    fn find_slot(&mut self, mut node: usize) -> usize {
        let mut root = node;
        while self.parent[root] != root {
            root = self.parent[root];
        }

        // Path compression: every node on the walk now points at the root.
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }

        root
    }

    /// Canonical root of `x`'s set, registering `x` if unseen.
    pub fn find(&mut self, x: &T) -> T {
        let i = self.slot(x);
        let root = self.find_slot(i);
        self.elements[root].clone()
    }

    /// Merge the sets of `a` and `b` using union-by-rank.
    ///
    /// On equal rank the root of `b` goes under the root of `a`, and `a`'s
    /// root gains one rank.
    pub fn union(&mut self, a: &T, b: &T) {
        let ia = self.slot(a);
        let ib = self.slot(b);
        let ra = self.find_slot(ia);
        let rb = self.find_slot(ib);
        if ra == rb {
            return;
        }

        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }

    pub fn connected(&mut self, a: &T, b: &T) -> bool {
        self.find(a) == self.find(b)
    }
}

impl<T: Eq + Hash + Clone> Default for DisjointSet<T> {
    fn default() -> Self {
        Self::new()
    }
}
