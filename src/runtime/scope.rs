use std::rc::Rc;

use indexmap::IndexMap;

use crate::bytecode::ir::SymbolTableEntry;

/// Shared, immutable handle to a stored entry.
///
/// Handles stay valid after the machine that produced them is cleared or
/// reloaded; they simply keep the old definition alive.
pub type EntryHandle = Rc<SymbolTableEntry>;

/// Insertion-ordered name → entry map for one scope.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    entries: IndexMap<String, EntryHandle>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `entry` under its own name and returns what it replaced.
    ///
    /// A replaced name keeps its original position.
    pub fn insert(&mut self, entry: SymbolTableEntry) -> Option<EntryHandle> {
        self.entries.insert(entry.name.clone(), Rc::new(entry))
    }

    pub fn get(&self, name: &str) -> Option<&EntryHandle> {
        self.entries.get(name)
    }

    /// Mutable access for in-place updates; clones the entry first if a
    /// handle to it is held elsewhere.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut SymbolTableEntry> {
        self.entries.get_mut(name).map(Rc::make_mut)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntryHandle> {
        self.entries.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Copy with freshly allocated entries, sharing nothing with `self`.
    pub fn deep_clone(&self) -> Self {
        let entries = self
            .entries
            .iter()
            .map(|(name, entry)| (name.clone(), Rc::new(SymbolTableEntry::clone(entry))))
            .collect();
        Self { entries }
    }
}

/// Global scope at the bottom, one frame per active function call above it.
#[derive(Debug, Clone)]
pub struct ScopeStack {
    scopes: Vec<SymbolTable>,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            scopes: vec![SymbolTable::new()],
        }
    }

    pub fn global(&self) -> &SymbolTable {
        &self.scopes[0]
    }

    pub fn global_mut(&mut self) -> &mut SymbolTable {
        &mut self.scopes[0]
    }

    /// Pushes a frame and returns its index.
    pub fn push(&mut self, frame: SymbolTable) -> usize {
        self.scopes.push(frame);
        self.scopes.len() - 1
    }

    /// Pops the innermost frame. The global scope is never popped.
    pub fn pop(&mut self) -> Option<SymbolTable> {
        if self.scopes.len() > 1 {
            self.scopes.pop()
        } else {
            None
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Searches every scope, innermost first.
    pub fn find(&self, name: &str) -> Option<&EntryHandle> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Lexical lookup: the given frame, then the global scope.
    pub fn resolve(&self, name: &str, frame: Option<usize>) -> Option<&EntryHandle> {
        frame
            .and_then(|index| self.scopes.get(index))
            .and_then(|scope| scope.get(name))
            .or_else(|| self.global().get(name))
    }

    /// Drops every frame and every global entry.
    pub fn clear(&mut self) {
        self.scopes.truncate(1);
        self.scopes[0] = SymbolTable::new();
    }

    pub fn deep_clone(&self) -> Self {
        Self {
            scopes: self.scopes.iter().map(SymbolTable::deep_clone).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::cell::Cell;
    use crate::bytecode::ir::IcodeVector;

    fn scalar(name: &str, n: i64) -> SymbolTableEntry {
        SymbolTableEntry::scalar(name, IcodeVector::literal(Cell::Int(n)))
    }

    fn literal_of(entry: &EntryHandle) -> Cell {
        match &entry.kind {
            crate::bytecode::ir::EntryKind::Scalar(code) => code.as_literal().cloned().unwrap(),
            other => panic!("expected scalar, got {:?}", other),
        }
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut table = SymbolTable::new();
        table.insert(scalar("a", 1));
        table.insert(scalar("b", 2));
        let old = table.insert(scalar("a", 3));
        assert_eq!(literal_of(&old.unwrap()), Cell::Int(1));
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(literal_of(table.get("a").unwrap()), Cell::Int(3));
    }

    #[test]
    fn test_get_mut_does_not_touch_outstanding_handles() {
        let mut table = SymbolTable::new();
        table.insert(scalar("a", 1));
        let handle = Rc::clone(table.get("a").unwrap());

        *table.get_mut("a").unwrap() = scalar("a", 2);

        assert_eq!(literal_of(&handle), Cell::Int(1));
        assert_eq!(literal_of(table.get("a").unwrap()), Cell::Int(2));
    }

    #[test]
    fn test_deep_clone_shares_nothing() {
        let mut table = SymbolTable::new();
        table.insert(scalar("a", 1));
        let copy = table.deep_clone();
        assert!(!Rc::ptr_eq(table.get("a").unwrap(), copy.get("a").unwrap()));
    }

    #[test]
    fn test_find_innermost_first() {
        let mut scopes = ScopeStack::new();
        scopes.global_mut().insert(scalar("x", 1));
        let mut frame = SymbolTable::new();
        frame.insert(scalar("x", 2));
        scopes.push(frame);

        assert_eq!(literal_of(scopes.find("x").unwrap()), Cell::Int(2));
        scopes.pop();
        assert_eq!(literal_of(scopes.find("x").unwrap()), Cell::Int(1));
    }

    #[test]
    fn test_resolve_skips_intermediate_frames() {
        let mut scopes = ScopeStack::new();
        scopes.global_mut().insert(scalar("g", 0));

        let mut outer = SymbolTable::new();
        outer.insert(scalar("a", 1));
        scopes.push(outer);
        let inner = scopes.push(SymbolTable::new());

        assert!(scopes.resolve("a", Some(inner)).is_none());
        assert!(scopes.find("a").is_some());
        assert_eq!(literal_of(scopes.resolve("g", Some(inner)).unwrap()), Cell::Int(0));
    }

    #[test]
    fn test_global_is_never_popped() {
        let mut scopes = ScopeStack::new();
        assert!(scopes.pop().is_none());
        assert_eq!(scopes.depth(), 1);

        scopes.push(SymbolTable::new());
        scopes.global_mut().insert(scalar("a", 1));
        scopes.clear();
        assert_eq!(scopes.depth(), 1);
        assert!(scopes.global().is_empty());
    }
}
