//! Name resolution for the compiler: maps identifiers to storage slots
//! (spec.md §6). Nested scopes chain to an `outer` table; `Local` symbols are
//! only ever resolved against the *innermost* function scope — see
//! `Compiler::compile` for the closure restriction this implies.

use ahash::AHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    Global,
    Local,
    Builtin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    outer: Option<Box<SymbolTable>>,
    store: AHashMap<String, Symbol>,
    num_definitions: usize,
}

impl SymbolTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn new_enclosed(outer: SymbolTable) -> Self {
        Self {
            outer: Some(Box::new(outer)),
            store: AHashMap::new(),
            num_definitions: 0,
        }
    }

    /// Pops this scope, returning the outer scope it was enclosing. Used by
    /// the compiler on function-literal scope exit.
    #[must_use]
    pub fn into_outer(self) -> Option<SymbolTable> {
        self.outer.map(|outer| *outer)
    }

    pub fn define(&mut self, name: impl Into<String>) -> Symbol {
        let name = name.into();
        let scope = if self.outer.is_some() {
            SymbolScope::Local
        } else {
            SymbolScope::Global
        };
        let symbol = Symbol {
            name: name.clone(),
            scope,
            index: self.num_definitions,
        };
        self.num_definitions += 1;
        self.store.insert(name, symbol.clone());
        symbol
    }

    pub fn define_builtin(&mut self, index: usize, name: impl Into<String>) -> Symbol {
        let name = name.into();
        let symbol = Symbol {
            name: name.clone(),
            scope: SymbolScope::Builtin,
            index,
        };
        self.store.insert(name, symbol.clone());
        symbol
    }

    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }
        self.outer.as_ref()?.resolve(name)
    }

    /// True when `name` resolves in an *enclosing* function scope as a
    /// `Local` — the reference implementation compiles a plain
    /// `OpGetLocal`/frame-relative index in this case, which is wrong once
    /// the inner function is called from a different call site than where it
    /// was defined (spec.md §9 Open Question). The compiler refuses to
    /// compile this rather than emit an incorrect frame index.
    #[must_use]
    pub fn resolves_local_in_outer_function(&self, name: &str) -> bool {
        match self.outer.as_ref() {
            Some(outer) => match outer.store.get(name) {
                Some(symbol) if symbol.scope == SymbolScope::Local => true,
                _ => outer.resolves_local_in_outer_function(name),
            },
            None => false,
        }
    }

    #[must_use]
    pub fn num_definitions(&self) -> usize {
        self.num_definitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_assigns_global_scope_at_top_level() {
        let mut table = SymbolTable::new();
        let a = table.define("a");
        assert_eq!(a.scope, SymbolScope::Global);
        assert_eq!(a.index, 0);
    }

    #[test]
    fn define_assigns_local_scope_when_enclosed() {
        let mut outer = SymbolTable::new();
        outer.define("a");
        let mut inner = SymbolTable::new_enclosed(outer);
        let b = inner.define("b");
        assert_eq!(b.scope, SymbolScope::Local);
        assert_eq!(b.index, 0);
    }

    #[test]
    fn resolve_walks_outward_through_enclosing_scopes() {
        let mut outer = SymbolTable::new();
        outer.define("a");
        let inner = SymbolTable::new_enclosed(outer);
        let resolved = inner.resolve("a").expect("should resolve through outer");
        assert_eq!(resolved.scope, SymbolScope::Global);
    }

    #[test]
    fn detects_local_captured_from_an_outer_function() {
        let mut outer = SymbolTable::new();
        outer.define("x");
        let mut middle = SymbolTable::new_enclosed(outer);
        middle.define("y");
        let inner = SymbolTable::new_enclosed(middle);
        assert!(inner.resolves_local_in_outer_function("y"));
        assert!(!inner.resolves_local_in_outer_function("x"));
    }
}
