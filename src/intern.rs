use std::collections::HashMap;

use crate::SingleAppVersion;

/// De-duplicates app-version identities while a corpus is being read, handing out dense ids.
///
/// Corpora name the same handful of app-versions millions of times. The interner is owned by
/// whoever is reading the corpus (usually a [`Corpus`](crate::Corpus)) rather than being global
/// state, and can be cleared once the graph has been built from it.
#[derive(Debug, Clone, Default)]
pub struct Interner {
    ids: HashMap<SingleAppVersion, usize>,
    values: Vec<SingleAppVersion>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, app: &str, version: &str) -> usize {
        let key = SingleAppVersion::new(app, version);
        if let Some(&id) = self.ids.get(&key) {
            return id;
        }
        let id = self.values.len();
        self.values.push(key.clone());
        self.ids.insert(key, id);
        id
    }

    #[cfg(test)]
    pub fn lookup(&self, app: &str, version: &str) -> Option<usize> {
        self.ids.get(&SingleAppVersion::new(app, version)).copied()
    }

    pub fn get(&self, id: usize) -> &SingleAppVersion {
        &self.values[id]
    }

    pub fn values(&self) -> &[SingleAppVersion] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Drop everything. Previously issued ids are invalidated.
    pub fn clear(&mut self) {
        self.ids.clear();
        self.ids.shrink_to_fit();
        self.values.clear();
        self.values.shrink_to_fit();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ids_are_dense_and_stable() {
        let mut i = Interner::new();
        let a = i.intern("wordpress", "5.0");
        let b = i.intern("wordpress", "5.1");
        assert_eq!((a, b), (0, 1));
        assert_eq!(i.intern("wordpress", "5.0"), a);
        assert_eq!(i.len(), 2);
        assert_eq!(i.get(b).to_string(), "wordpress#5.1");
        assert_eq!(i.lookup("wordpress", "5.1"), Some(b));
        assert_eq!(i.lookup("joomla", "5.1"), None);

        i.clear();
        assert!(i.is_empty());
        assert_eq!(i.intern("joomla", "3.0"), 0);
    }
}
