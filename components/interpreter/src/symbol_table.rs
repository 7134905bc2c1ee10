//! Interned names with dense, stable indices.
//!
//! The VM keeps one table for method names and one for global variables.
//! Indices are handed out in insertion order starting at 0 and stay valid
//! until the table is truncated below them.

use std::collections::HashMap;

use core_types::SymbolError;

/// Append-only name to index mapping
#[derive(Debug, Clone)]
pub struct SymbolTable {
    names: Vec<String>,
    indices: HashMap<String, usize>,
    limit: usize,
    /// Entries below this index survive `truncate` and `clear`
    protected: usize,
}

impl SymbolTable {
    /// Create an empty table holding at most `limit` symbols
    pub fn new(limit: usize) -> Self {
        Self {
            names: Vec::new(),
            indices: HashMap::new(),
            limit,
            protected: 0,
        }
    }

    /// Keep every symbol interned so far out of reach of `truncate` and `clear`.
    ///
    /// The VM protects the names its core library binds, since class method
    /// tables keep referring to those indices.
    pub fn protect(&mut self) {
        self.protected = self.names.len();
    }

    /// Number of symbols that cannot be truncated
    pub fn protected(&self) -> usize {
        self.protected
    }

    /// Intern a new name.
    ///
    /// Fails with [`SymbolError::Duplicate`] if the name is already present,
    /// which lets a compiler report redefinitions.
    ///
    /// # Examples
    ///
    /// ```
    /// use interpreter::SymbolTable;
    ///
    /// let mut table = SymbolTable::new(8);
    /// assert_eq!(table.add("x"), Ok(0));
    /// assert_eq!(table.add("y"), Ok(1));
    /// assert!(table.add("x").is_err());
    /// ```
    pub fn add(&mut self, name: &str) -> Result<usize, SymbolError> {
        if self.indices.contains_key(name) {
            return Err(SymbolError::Duplicate(name.to_string()));
        }
        self.push(name)
    }

    /// Index of `name`, interning it if new
    pub fn ensure(&mut self, name: &str) -> Result<usize, SymbolError> {
        match self.indices.get(name) {
            Some(&index) => Ok(index),
            None => self.push(name),
        }
    }

    fn push(&mut self, name: &str) -> Result<usize, SymbolError> {
        if self.names.len() >= self.limit {
            return Err(SymbolError::Overflow { limit: self.limit });
        }
        let index = self.names.len();
        self.names.push(name.to_string());
        self.indices.insert(name.to_string(), index);
        Ok(index)
    }

    /// Index of `name` if it has been interned
    pub fn find(&self, name: &str) -> Option<usize> {
        self.indices.get(name).copied()
    }

    /// Name interned at `index`
    pub fn name_of(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Drop every symbol with an index of `count` or more.
    ///
    /// Used to roll back the declarations of a unit that failed to compile.
    /// Protected symbols are kept even when `count` is below them.
    pub fn truncate(&mut self, count: usize) {
        let count = count.max(self.protected);
        if count >= self.names.len() {
            return;
        }
        log::debug!(
            "symbols: truncating {} -> {} entries",
            self.names.len(),
            count
        );
        for name in self.names.drain(count..) {
            self.indices.remove(&name);
        }
    }

    /// Number of interned symbols
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether nothing has been interned
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Remove every unprotected symbol
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// Interned names in index order
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.names.iter().map(String::as_str)
    }
}
