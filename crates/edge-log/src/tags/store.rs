// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Display;
use std::sync::Mutex;

use super::Tags;

#[derive(Debug, Default)]
struct Inner {
    all: Tags,
    dirty: Tags,
    resync: bool,
}

/// Global tags plus the subset changed since the last acknowledged batch.
///
/// Producers call [`TagStore::set`] from any thread; the transmitter takes
/// the diff when it builds a batch. Discarding a stream forces a full resync
/// since the collector keys its tag state by stream.
#[derive(Debug, Default)]
pub struct TagStore {
    inner: Mutex<Inner>,
}

impl TagStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `tags` into the global set and marks them dirty.
    pub fn set<I, K, V>(&self, tags: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Display,
    {
        #[allow(clippy::expect_used)]
        let mut inner = self.inner.lock().expect("lock poisoned");
        for (key, value) in tags {
            let key = key.into();
            let value = value.to_string();
            inner.all.insert(key.clone(), value.clone());
            inner.dirty.insert(key, value);
        }
    }

    /// Returns what the collector has not seen yet: the dirty tags, or every
    /// tag when a resync is pending. `None` when there is nothing new.
    pub fn take_diff(&self) -> Option<Tags> {
        #[allow(clippy::expect_used)]
        let mut inner = self.inner.lock().expect("lock poisoned");
        let diff = if inner.resync {
            inner.all.clone()
        } else {
            inner.dirty.clone()
        };
        inner.dirty.clear();
        inner.resync = false;

        if diff.is_empty() {
            None
        } else {
            Some(diff)
        }
    }

    /// The next diff will carry the full set.
    pub fn force_resync(&self) {
        #[allow(clippy::expect_used)]
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.resync = true;
    }

    /// Re-marks a diff that was taken for a batch the collector never
    /// acknowledged. Values set since then are kept.
    pub fn restore(&self, diff: Tags) {
        #[allow(clippy::expect_used)]
        let mut inner = self.inner.lock().expect("lock poisoned");
        for (key, value) in diff {
            inner.dirty.entry(key).or_insert(value);
        }
    }

    pub fn snapshot(&self) -> Tags {
        #[allow(clippy::expect_used)]
        let inner = self.inner.lock().expect("lock poisoned");
        inner.all.clone()
    }
}
