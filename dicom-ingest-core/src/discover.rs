//! Asynchronous traversal of a mixed file/directory selection.
//!
//! A [`DiscoverySession`] owns the pending-operation counter for one pass.
//! Each directory increments it before its listing is awaited and
//! decrements it after all of its children have settled, so the counter
//! only returns to zero once the whole tree is done. The selection itself is
//! wrapped in one extra increment so a batch of plain files completes the
//! same way. Sibling subtrees are listed concurrently with no cap.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::future::{join_all, BoxFuture, FutureExt};
use tracing::{debug, info, warn};

use crate::contract::{Entry, FileSource, IngestObserver};
use crate::error::IgnoreReason;

/// Result of one discovery pass.
#[derive(Debug, Default)]
pub struct Discovered {
    pub files: Vec<Entry>,
    /// Directories whose listing failed, with the reason.
    pub unlistable: Vec<(String, IgnoreReason)>,
}

enum Visit {
    File(Entry),
    Unlistable(String, IgnoreReason),
    Nested(Vec<Visit>),
}

pub struct DiscoverySession<'s> {
    source: &'s dyn FileSource,
    observer: &'s dyn IngestObserver,
    pending: AtomicUsize,
    files_found: AtomicUsize,
    completed: AtomicBool,
}

impl<'s> DiscoverySession<'s> {
    pub fn new(source: &'s dyn FileSource, observer: &'s dyn IngestObserver) -> Self {
        Self {
            source,
            observer,
            pending: AtomicUsize::new(0),
            files_found: AtomicUsize::new(0),
            completed: AtomicBool::new(false),
        }
    }

    /// Number of subtrees still being listed.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_complete(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    pub async fn run(&self, selection: Vec<Entry>) -> Discovered {
        info!(entries = selection.len(), "[DISCOVER] Starting traversal");
        self.enter();
        let visits = join_all(selection.into_iter().map(|entry| self.visit(entry))).await;
        self.leave();

        let mut discovered = Discovered::default();
        flatten(Visit::Nested(visits), &mut discovered);
        info!(
            files = discovered.files.len(),
            unlistable = discovered.unlistable.len(),
            "[DISCOVER] Traversal complete"
        );
        discovered
    }

    fn visit<'a>(&'a self, entry: Entry) -> BoxFuture<'a, Visit> {
        async move {
            if !entry.is_dir() {
                self.files_found.fetch_add(1, Ordering::SeqCst);
                return Visit::File(entry);
            }

            self.enter();
            let children = match self.source.list_directory(&entry).await {
                Ok(children) => children,
                Err(e) => {
                    warn!(path = %entry.path.display(), error = %e, "[DISCOVER] Listing failed");
                    self.leave();
                    let reason = IgnoreReason::Unlistable(e.to_string());
                    return Visit::Unlistable(entry.display_name(), reason);
                }
            };
            debug!(path = %entry.path.display(), children = children.len(), "[DISCOVER] Listed directory");

            let nested = join_all(children.into_iter().map(|child| self.visit(child))).await;
            self.leave();
            Visit::Nested(nested)
        }
        .boxed()
    }

    fn enter(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    fn leave(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1
            && !self.completed.swap(true, Ordering::SeqCst)
        {
            let files = self.files_found.load(Ordering::SeqCst);
            debug!(files, "[DISCOVER] Pending counter reached zero");
            self.observer.on_discovery_complete(files);
        }
    }
}

fn flatten(visit: Visit, out: &mut Discovered) {
    match visit {
        Visit::File(entry) => out.files.push(entry),
        Visit::Unlistable(name, reason) => out.unlistable.push((name, reason)),
        Visit::Nested(children) => {
            for child in children {
                flatten(child, out);
            }
        }
    }
}
