//! Two-level associative container keyed by `(groupId, artifactId)`.

use std::collections::BTreeMap;

use crate::artifact::ArtifactKey;

/// Maps groupId to a map from artifactId to `V`. Iteration order is the
/// deterministic key order of the underlying maps.
///
/// The index is a plain data structure; owners guard it with their own
/// lock and use [`ArtifactIndex::replace_all`] when several keys must
/// change under one critical section.
#[derive(Debug, Clone)]
pub struct ArtifactIndex<V> {
    groups: BTreeMap<String, BTreeMap<String, V>>,
    len: usize,
}

impl<V> Default for ArtifactIndex<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ArtifactIndex<V> {
    pub fn new() -> Self {
        Self {
            groups: BTreeMap::new(),
            len: 0,
        }
    }

    /// Insert or replace; returns the previous value if any.
    pub fn put(&mut self, key: &ArtifactKey, value: V) -> Option<V> {
        let previous = self
            .groups
            .entry(key.group_id.clone())
            .or_default()
            .insert(key.artifact_id.clone(), value);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    pub fn get(&self, group_id: &str, artifact_id: &str) -> Option<&V> {
        self.groups.get(group_id)?.get(artifact_id)
    }

    pub fn get_mut(&mut self, group_id: &str, artifact_id: &str) -> Option<&mut V> {
        self.groups.get_mut(group_id)?.get_mut(artifact_id)
    }

    pub fn remove(&mut self, key: &ArtifactKey) -> Option<V> {
        let by_artifact = self.groups.get_mut(&key.group_id)?;
        let removed = by_artifact.remove(&key.artifact_id);
        if removed.is_some() {
            self.len -= 1;
            if by_artifact.is_empty() {
                self.groups.remove(&key.group_id);
            }
        }
        removed
    }

    pub fn contains(&self, group_id: &str, artifact_id: &str) -> bool {
        self.get(group_id, artifact_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.groups.clear();
        self.len = 0;
    }

    pub fn visit_values(&self, mut callback: impl FnMut(&V)) {
        for by_artifact in self.groups.values() {
            for value in by_artifact.values() {
                callback(value);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ArtifactKey, &V)> {
        self.groups.iter().flat_map(|(group, by_artifact)| {
            by_artifact
                .iter()
                .map(move |(artifact, value)| (ArtifactKey::new(group, artifact), value))
        })
    }

    pub fn group_ids(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(|g| g.as_str())
    }

    pub fn artifact_ids(&self, group_id: &str) -> impl Iterator<Item = &str> {
        self.groups
            .get(group_id)
            .into_iter()
            .flat_map(|by_artifact| by_artifact.keys().map(|a| a.as_str()))
    }

    /// Apply removes and upserts as one mutation. The caller's lock makes
    /// this atomic with respect to readers.
    pub fn replace_all(&mut self, removes: &[ArtifactKey], upserts: Vec<(ArtifactKey, V)>) {
        for key in removes {
            self.remove(key);
        }
        for (key, value) in upserts {
            self.put(&key, value);
        }
    }
}
