use std::collections::HashMap;

use typed_generational_arena::{StandardArena, StandardIndex};

use crate::ir::Value;

pub type ScopeIndex = StandardIndex<Scope>;

/// A lexical environment. Symbols map to the address of their storage.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub parent: Option<ScopeIndex>,
    pub symbols: HashMap<String, Value>,
}

/// All the scopes alive during a translation, linked by parent index.
#[derive(Debug, Clone)]
pub struct ScopeChain {
    scopes: StandardArena<Scope>,
}

impl Default for ScopeChain {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeChain {
    pub fn new() -> Self {
        Self {
            scopes: StandardArena::new(),
        }
    }

    /// Opens a new scope. A scope without parent is a root.
    pub fn push(&mut self, parent: Option<ScopeIndex>) -> ScopeIndex {
        self.scopes.insert(Scope {
            parent,
            symbols: HashMap::new(),
        })
    }

    pub fn pop(&mut self, idx: ScopeIndex) -> Option<Scope> {
        self.scopes.remove(idx)
    }

    pub fn get(&self, idx: ScopeIndex) -> Option<&Scope> {
        self.scopes.get(idx)
    }

    /// Binds `name` in `scope` only. Returns false if the scope already has it.
    pub fn define(&mut self, scope: ScopeIndex, name: &str, value: Value) -> bool {
        let Some(scope) = self.scopes.get_mut(scope) else {
            return false;
        };

        if scope.symbols.contains_key(name) {
            return false;
        }

        scope.symbols.insert(name.to_string(), value);
        true
    }

    /// Finds `name` starting at `scope` and walking up to the root.
    pub fn lookup(&self, scope: ScopeIndex, name: &str) -> Option<&Value> {
        let owner = self.owner(scope, name)?;
        self.scopes.get(owner)?.symbols.get(name)
    }

    /// The scope that holds the binding `name` is resolved to from `scope`.
    pub fn owner(&self, scope: ScopeIndex, name: &str) -> Option<ScopeIndex> {
        let mut current = Some(scope);

        while let Some(idx) = current {
            let scope = self.scopes.get(idx)?;
            if scope.symbols.contains_key(name) {
                return Some(idx);
            }
            current = scope.parent;
        }

        None
    }

    /// The number of scopes between `scope` and the root.
    pub fn depth(&self, scope: ScopeIndex) -> usize {
        let mut depth = 0;
        let mut current = self.scopes.get(scope).and_then(|x| x.parent);

        while let Some(idx) = current {
            depth += 1;
            current = self.scopes.get(idx).and_then(|x| x.parent);
        }

        depth
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Operand, Type};

    fn slot(idx: usize) -> Value {
        Value::new(Operand::Local(idx), Type::ptr_to(Type::Int32))
    }

    #[test]
    fn lookup_walks_to_the_root() {
        let mut chain = ScopeChain::new();
        let root = chain.push(None);
        let mid = chain.push(Some(root));
        let leaf = chain.push(Some(mid));

        assert!(chain.define(root, "x", slot(0)));
        assert_eq!(chain.lookup(leaf, "x"), Some(&slot(0)));
        assert_eq!(chain.owner(leaf, "x"), Some(root));
        assert_eq!(chain.lookup(leaf, "y"), None);
        assert_eq!(chain.depth(leaf), 2);
    }

    #[test]
    fn shadowing_and_duplicates() {
        let mut chain = ScopeChain::new();
        let root = chain.push(None);
        let inner = chain.push(Some(root));

        assert!(chain.define(root, "x", slot(0)));
        assert!(!chain.define(root, "x", slot(1)));
        assert!(chain.define(inner, "x", slot(1)));

        assert_eq!(chain.lookup(inner, "x"), Some(&slot(1)));
        assert_eq!(chain.lookup(root, "x"), Some(&slot(0)));

        chain.pop(inner);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.lookup(inner, "x"), None);
    }
}
