//! Redirect history capture.
//!
//! When enabled through options, each intermediate redirect response is
//! appended to the client's history buffer. The buffer is a debugging aid:
//! do not run concurrent requests on a client with history enabled, the
//! captured sequence will interleave.

use std::sync::{Arc, Mutex};

use url::Url;

use crate::cookies::Cookies;
use crate::headers::Headers;

/// One intermediate hop of a redirect chain.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// The URL the hop was requested from.
    pub url: Url,
    pub status_code: u16,
    pub headers: Headers,
    pub cookies: Cookies,
    /// Referer header of the hop's request, when present.
    pub referer: Option<String>,
}

/// An ordered snapshot of intermediate responses.
#[derive(Debug, Clone, Default)]
pub struct History(Vec<HistoryEntry>);

impl History {
    pub fn new(entries: Vec<HistoryEntry>) -> Self {
        Self(entries)
    }

    /// URLs of every captured hop.
    pub fn urls(&self) -> Vec<&Url> {
        self.0.iter().map(|entry| &entry.url).collect()
    }

    /// Status codes of every captured hop.
    pub fn status_codes(&self) -> Vec<u16> {
        self.0.iter().map(|entry| entry.status_code).collect()
    }

    /// Referers of the hops that carried one.
    pub fn referrers(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter_map(|entry| entry.referer.as_deref())
            .collect()
    }

    /// Cookie lists of the hops that set cookies.
    pub fn cookies(&self) -> Vec<&Cookies> {
        self.0
            .iter()
            .map(|entry| &entry.cookies)
            .filter(|cookies| !cookies.is_empty())
            .collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HistoryEntry> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a HistoryEntry;
    type IntoIter = std::slice::Iter<'a, HistoryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// The client's shared history buffer.
pub(crate) type SharedHistory = Arc<Mutex<Vec<HistoryEntry>>>;

/// Snapshot the shared buffer into an immutable [`History`].
pub(crate) fn snapshot(shared: &SharedHistory) -> History {
    History(shared.lock().expect("history lock poisoned").clone())
}
