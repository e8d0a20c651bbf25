//! Partitioning a drained batch into per-target groups.

use std::collections::HashMap;
use std::hash::Hash;

use crate::identifier::Identifier;
use crate::job::Job;

/// Jobs of one batch that share a target, in batch order.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub target: Identifier,
    pub jobs: Vec<Job>,
}

impl Group {
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Stable group-by.
///
/// Buckets appear in the order their key was first seen and items keep their
/// relative order inside a bucket. Every item lands in exactly one bucket and
/// no bucket is empty.
pub fn group_by<T, K, F>(items: impl IntoIterator<Item = T>, mut key: F) -> Vec<(K, Vec<T>)>
where
    K: Eq + Hash + Clone,
    F: FnMut(&T) -> K,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut buckets: Vec<(K, Vec<T>)> = Vec::new();

    for item in items {
        let k = key(&item);
        match index.get(&k) {
            Some(&slot) => buckets[slot].1.push(item),
            None => {
                index.insert(k.clone(), buckets.len());
                buckets.push((k, vec![item]));
            }
        }
    }

    buckets
}

/// Group jobs by target identifier.
pub fn group_by_target(jobs: impl IntoIterator<Item = Job>) -> Vec<Group> {
    group_by(jobs, |job| job.target().clone())
        .into_iter()
        .map(|(target, jobs)| Group { target, jobs })
        .collect()
}
