use std::collections::BTreeMap;

/// Bidirectional mapping between class names and label indices.
///
/// Index `0` is reserved for background by convention. Iteration is always in
/// ascending index order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Labels {
    by_name: BTreeMap<String, u32>,
    by_index: BTreeMap<u32, String>,
}

impl Labels {
    /// Build from `(name, index)` pairs. Later pairs win on conflicts.
    pub fn new<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        let mut labels = Self::default();
        for (name, index) in pairs {
            let name = name.into();
            if let Some(previous) = labels.by_name.insert(name.clone(), index) {
                labels.by_index.remove(&previous);
            }
            if let Some(previous) = labels.by_index.insert(index, name) {
                labels.by_name.remove(&previous);
            }
        }
        labels
    }

    pub fn index(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, index: u32) -> Option<&str> {
        self.by_index.get(&index).map(String::as_str)
    }

    /// `(index, name)` pairs in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.by_index.iter().map(|(i, n)| (*i, n.as_str()))
    }

    /// Names in ascending index order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_index.values().map(String::as_str)
    }

    /// Name → index view.
    pub fn by_name(&self) -> &BTreeMap<String, u32> {
        &self.by_name
    }

    /// Index → name view.
    pub fn by_index(&self) -> &BTreeMap<u32, String> {
        &self.by_index
    }

    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }
}
