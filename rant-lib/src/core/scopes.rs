//! Scopes is a stack of Mappings. Used during compilation
//!
//! Subroutine bodies open a scope, so names defined inside them (locals, parameters,
//! nested subroutines) vanish once the body is compiled. Lookups go from the innermost scope
//! outwards. Closed scopes are cheap to keep around, because the maps share structure

use im::HashMap as ImHashMap;
use im::Vector as ImVec;

use std::borrow::Borrow;
use std::fmt::Debug;
use std::hash::Hash;

pub type Scope<K, V> = ImHashMap<K, V>;
/// represents the scope hirarchy. Used during compilation
#[derive(Debug, Clone)]
pub struct Scopes<K, V>
where
    K: Debug + Hash + Clone + Eq,
    V: Clone + Debug,
{
    /// Each Entry in the vec is a new scope, the last is the inner most one.
    /// The first scope is the one of the pattern itself
    pub scopes: ImVec<Scope<K, V>>,
}

impl<K, V> Default for Scopes<K, V>
where
    K: Debug + Hash + Clone + Eq,
    V: Clone + Debug,
{
    fn default() -> Self {
        Scopes {
            scopes: ImVec::unit(ImHashMap::new()),
        }
    }
}

impl<K, V> Scopes<K, V>
where
    K: Debug + Hash + Clone + Eq,
    V: Clone + Debug,
{
    /// open a new scope
    pub fn open_new(&mut self) {
        self.scopes.push_back(ImHashMap::new());
    }

    /// collapse the innermost scope, the outermost one is never collapsed
    pub fn collapse_innermost(&mut self) -> Option<Scope<K, V>> {
        if self.scopes.len() > 1 {
            self.scopes.pop_back()
        } else {
            None
        }
    }

    /// number of open scopes, including the outermost one
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// add a symbol to the innermost scope
    pub fn add_entry(&mut self, key: K, val: V) {
        if let Some(scope) = self.scopes.back_mut() {
            scope.insert(key, val);
        }
    }

    /// returns the entry only if it was defined in the innermost scope
    pub fn find_local<BK>(&self, key: &BK) -> Option<&V>
    where
        BK: Hash + Eq + ?Sized,
        K: Borrow<BK>,
    {
        self.scopes.back().and_then(|scope| scope.get(key))
    }

    /// returns the information about a symbol if it can be found.
    ///
    /// starts searching in the innermost scope, and goes outwards,
    /// if the symbol is not in the scope. Returns None if the symbol is not
    /// in any scope
    pub fn find_entry<BK>(&self, key: &BK) -> Option<&V>
    where
        BK: Hash + Eq + ?Sized,
        K: Borrow<BK>,
    {
        for scope in self.scopes.iter().rev() {
            if let Some(info) = scope.get(key) {
                return Some(info);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_scopes_shadow_and_vanish() {
        let mut scopes: Scopes<String, u16> = Scopes::default();
        scopes.add_entry("a".into(), 0);
        scopes.open_new();
        assert_eq!(scopes.find_entry("a"), Some(&0));
        assert_eq!(scopes.find_local("a"), None);
        scopes.add_entry("a".into(), 1);
        assert_eq!(scopes.find_entry("a"), Some(&1));
        assert!(scopes.collapse_innermost().is_some());
        assert_eq!(scopes.find_entry("a"), Some(&0));
        assert!(scopes.collapse_innermost().is_none());
        assert_eq!(scopes.depth(), 1);
    }
}
