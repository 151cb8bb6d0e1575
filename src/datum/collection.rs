// src/datum/collection.rs

//! Ordered, name-addressable grouping of datum handles.

use crate::errors::Result;

use super::{hash_of, lock, DatumState, SharedDatum};

/// An ordered name → datum mapping.
///
/// Used to treat a task's entire output set as one composite handle.
/// The collection behaves like a datum whose state is the least-advanced
/// state of its members: it is AVAILABLE only when every member is.
/// An empty collection is vacuously AVAILABLE.
#[derive(Debug, Clone, Default)]
pub struct DatumCollection {
    members: Vec<(String, SharedDatum)>,
}

impl DatumCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a member, or replace it in place if the name is taken.
    /// Insertion order is preserved either way.
    pub fn insert(&mut self, name: impl Into<String>, datum: SharedDatum) {
        let name = name.into();
        match self.members.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = datum,
            None => self.members.push((name, datum)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&SharedDatum> {
        self.members
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SharedDatum)> {
        self.members.iter().map(|(n, d)| (n.as_str(), d))
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The least-advanced state among the members.
    pub fn state(&self) -> DatumState {
        self.members
            .iter()
            .map(|(_, d)| lock(d).state())
            .min()
            .unwrap_or(DatumState::Available)
    }

    /// Verify every member, stopping at the first that is not available.
    pub fn verify(&self) -> Result<()> {
        for (_, datum) in &self.members {
            lock(datum).verify()?;
        }
        Ok(())
    }

    /// Clear every member.
    pub fn clear(&self) {
        for (_, datum) in &self.members {
            lock(datum).clear();
        }
    }

    /// Order-sensitive aggregate of member quickhashes.
    ///
    /// `None` unless every member is AVAILABLE.
    pub fn quickhash(&self) -> Option<u64> {
        let mut hashes = Vec::with_capacity(self.members.len());
        for (_, datum) in &self.members {
            hashes.push(lock(datum).quickhash()?);
        }
        Some(hash_of(hashes))
    }
}

impl FromIterator<(String, SharedDatum)> for DatumCollection {
    fn from_iter<I: IntoIterator<Item = (String, SharedDatum)>>(iter: I) -> Self {
        let mut collection = Self::new();
        for (name, datum) in iter {
            collection.insert(name, datum);
        }
        collection
    }
}