//! Concurrent metadata refresh
//!
//! A [`RefreshCoordinator`] fetches every selected record through a
//! [`Fetcher`] on a small pool of scoped worker threads. Workers share one
//! mutex over the worklist, the counters and the write path: a worker pops a
//! record under the lock, fetches with the lock released, then reacquires it
//! to apply the result.
//!
//! Deletions requested through `del_error` are queued and applied after all
//! workers have finished, highest id first, so compaction never moves a
//! record that is still waiting to be deleted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, warn};

use crate::fetch::{FetchResult, Fetcher, StatusTag};
use crate::interchange::ExportCapture;
use crate::models::{Bookmark, FieldUpdate};
use crate::selection::{Selection, StatusSet};
use crate::storage::{BookmarkStore, Commit, StoreError, StoreResult};
use crate::tags;

/// Applied updates per worker between commits
const COMMIT_EVERY: usize = 32;

/// Cooperative cancellation flag shared between the caller and workers
///
/// Workers check it before picking up the next record; a fetch already in
/// flight always runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag so the token can be reused for the next operation
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Options for one refresh run
#[derive(Debug, Clone)]
pub struct RefreshOptions {
    /// Upper bound on worker threads
    pub threads: usize,
    /// Store the URL reached after permanent redirects
    pub url_redirect: bool,
    /// Tag records that answered with a permanent redirect
    pub tag_redirect: StatusTag,
    /// Tag records that answered with an error status
    pub tag_error: StatusTag,
    /// Delete records whose status is in this set
    pub del_error: Option<StatusSet>,
    /// Capture records whose status is in this set for export
    pub export_on: Option<StatusSet>,
    /// Write fetched titles and descriptions
    pub update_title: bool,
    /// Fetch this URL instead of the stored one (single record only)
    pub custom_url: Option<String>,
    /// Canonical tags replacing the stored ones
    pub custom_tags: Option<String>,
    /// Hand queued deletions back to the caller instead of applying them
    pub delay_delete: bool,
    /// Leave the final commit to the caller
    pub defer_commit: bool,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            threads: 4,
            url_redirect: false,
            tag_redirect: StatusTag::Off,
            tag_error: StatusTag::Off,
            del_error: None,
            export_on: None,
            update_title: true,
            custom_url: None,
            custom_tags: None,
            delay_delete: false,
            defer_commit: false,
        }
    }
}

impl RefreshOptions {
    /// Any option that depends on the fetch status is set
    pub fn network_status_requested(&self) -> bool {
        self.url_redirect
            || self.tag_redirect.is_on()
            || self.tag_error.is_on()
            || self.del_error.as_ref().is_some_and(|s| !s.is_empty())
            || self.export_on.as_ref().is_some_and(|s| !s.is_empty())
    }

    fn deletes(&self, status: Option<u16>) -> bool {
        self.del_error.as_ref().is_some_and(|s| s.contains(status))
    }

    fn exports(&self, status: Option<u16>) -> bool {
        self.export_on.as_ref().is_some_and(|s| s.contains(status))
    }
}

/// A record the refresh could not handle cleanly
#[derive(Debug)]
pub struct RefreshFailure {
    pub id: i64,
    pub url: String,
    pub error: StoreError,
}

/// Outcome of a refresh run
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// Records selected for the run
    pub records: usize,
    /// Records fetched, summed over workers
    pub processed: usize,
    /// Ids written to, ascending
    pub updated: Vec<i64>,
    /// Records deleted on error (snapshots from before deletion)
    pub deleted: Vec<Bookmark>,
    /// Ids queued for deletion but left to the caller, descending
    pub pending_deletes: Vec<i64>,
    pub failures: Vec<RefreshFailure>,
    pub capture: ExportCapture,
    /// The run stopped early on cancellation
    pub cancelled: bool,
}

impl RefreshReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

/// State shared by the workers, guarded by one mutex
#[derive(Default)]
struct Progress {
    work: Vec<Bookmark>,
    done: usize,
    processed: usize,
    updated: Vec<i64>,
    to_delete: Vec<Bookmark>,
    failures: Vec<RefreshFailure>,
    capture: ExportCapture,
}

impl Progress {
    fn fail(&mut self, bm: &Bookmark, error: StoreError) {
        warn!(id = bm.id, url = %bm.url, error = %error, "Refresh failed");
        self.failures.push(RefreshFailure {
            id: bm.id,
            url: bm.url.clone(),
            error,
        });
    }
}

struct Shared {
    progress: Mutex<Progress>,
    finished: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reports a worker's tally when it exits, however it exits
struct Tally<'a> {
    shared: &'a Shared,
    processed: usize,
}

impl Drop for Tally<'_> {
    fn drop(&mut self) {
        let mut progress = self.shared.lock();
        progress.done += 1;
        progress.processed += self.processed;
        debug!(
            thread = ?std::thread::current().id(),
            processed = self.processed,
            "Refresh worker finished"
        );
        self.shared.finished.notify_all();
    }
}

/// Drives a refresh run over a [`BookmarkStore`]
pub struct RefreshCoordinator<'a> {
    store: &'a BookmarkStore,
    fetcher: &'a dyn Fetcher,
    cancel: &'a CancellationToken,
}

impl<'a> RefreshCoordinator<'a> {
    pub fn new(
        store: &'a BookmarkStore,
        fetcher: &'a dyn Fetcher,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            store,
            fetcher,
            cancel,
        }
    }

    /// Refresh the selected records
    ///
    /// Per-record failures are collected in the report; only invalid
    /// options, an empty selection or storage errors outside the workers
    /// fail the whole call.
    pub fn refresh(
        &self,
        selection: &Selection,
        options: &RefreshOptions,
    ) -> StoreResult<RefreshReport> {
        if !options.update_title && !options.network_status_requested() {
            return Err(StoreError::InvalidArgument(
                "no-op refresh: nothing to update".to_string(),
            ));
        }
        if options.custom_url.is_some() && selection.single().is_none() {
            return Err(StoreError::InvalidArgument(
                "a custom URL needs a single index".to_string(),
            ));
        }

        let work = match selection.ids_within(self.store.max_id()?) {
            None => self.store.get_all()?,
            Some(ids) => self.store.get_by_ids(&ids)?,
        };
        let records = work.len();
        if records == 0 {
            return Err(StoreError::NotFound("index, or the store is empty".to_string()));
        }

        let workers = options.threads.max(1).min(records);
        info!(records, workers, "Refreshing bookmarks");

        let shared = Shared {
            progress: Mutex::new(Progress {
                work,
                ..Default::default()
            }),
            finished: Condvar::new(),
        };

        let progress = std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| self.worker(&shared, options));
            }

            let mut progress = shared.lock();
            while progress.done < workers {
                progress = shared
                    .finished
                    .wait(progress)
                    .unwrap_or_else(PoisonError::into_inner);
                debug!(done = progress.done, workers, "Refresh workers completed");
            }
            std::mem::take(&mut *progress)
        });

        let cancelled = self.cancel.is_cancelled();
        if progress.processed != records {
            if cancelled {
                info!(records, processed = progress.processed, "Refresh cancelled");
            } else {
                error!(records, processed = progress.processed, "Refresh lost records");
            }
        }

        let mut report = RefreshReport {
            records,
            processed: progress.processed,
            updated: progress.updated,
            failures: progress.failures,
            capture: progress.capture,
            cancelled,
            ..Default::default()
        };
        report.updated.sort_unstable();
        report.updated.dedup();

        let mut to_delete = progress.to_delete;
        to_delete.sort_unstable_by(|a, b| b.id.cmp(&a.id));
        to_delete.dedup_by_key(|bm| bm.id);

        if options.delay_delete {
            report.pending_deletes = to_delete.iter().map(|bm| bm.id).collect();
        } else {
            for bm in to_delete {
                match self.store.delete_by_id(bm.id, Commit::Deferred) {
                    Ok(deleted) => {
                        info!(id = deleted.id, url = %deleted.url, "Deleted on error");
                        report.deleted.push(deleted);
                    }
                    Err(e) => report.failures.push(RefreshFailure {
                        id: bm.id,
                        url: bm.url,
                        error: e,
                    }),
                }
            }
        }

        if !options.defer_commit {
            self.store.commit()?;
        }
        Ok(report)
    }

    fn worker(&self, shared: &Shared, options: &RefreshOptions) {
        let mut tally = Tally {
            shared,
            processed: 0,
        };
        let mut applied = 0;

        loop {
            if self.cancel.is_cancelled() {
                debug!("Refresh worker stopping on cancel");
                break;
            }

            let next = shared.lock().work.pop();
            let Some(bm) = next else {
                break;
            };

            let target = options.custom_url.as_deref().unwrap_or(&bm.url);
            let result = self.fetcher.fetch(target, bm.is_immutable());
            tally.processed += 1;

            let mut progress = shared.lock();
            if self.apply(&mut progress, &bm, &result, options) {
                applied += 1;
                if applied % COMMIT_EVERY == 0 {
                    if let Err(e) = self.store.commit() {
                        warn!(error = %e, "Periodic refresh commit failed");
                    }
                }
            }
        }
    }

    /// Apply one fetch result; returns whether the record was written
    fn apply(
        &self,
        progress: &mut Progress,
        bm: &Bookmark,
        result: &FetchResult,
        options: &RefreshOptions,
    ) -> bool {
        if result.bad_url {
            progress.fail(bm, StoreError::MalformedUrl(bm.url.clone()));
            return self.write_custom_tags(progress, bm, options);
        }

        if options.deletes(result.status) {
            if options.exports(result.status) {
                progress.capture.record_deleted(bm.clone());
            }
            info!(id = bm.id, status = ?result.status, "Queued for deletion");
            progress.to_delete.push(bm.clone());
            return self.write_custom_tags(progress, bm, options);
        }

        match result.status {
            None => progress.fail(
                bm,
                StoreError::Network {
                    url: result.url.clone(),
                    reason: "no response".to_string(),
                },
            ),
            Some(status) if status >= 400 => progress.fail(
                bm,
                StoreError::HttpStatus {
                    url: result.url.clone(),
                    status,
                },
            ),
            Some(_) => {}
        }

        if result.mime_only {
            debug!(id = bm.id, "HEAD requested, metadata left alone");
            return self.write_custom_tags(progress, bm, options);
        }

        let mut update = FieldUpdate::default();
        if result.title.is_empty() {
            info!(id = bm.id, "No title");
        } else if options.update_title {
            update.title = Some(result.title.clone());
        }
        if options.update_title && !result.description.is_empty() {
            update.description = Some(result.description.clone());
        }

        let mut current_url = bm.url.as_str();
        if options.url_redirect && result.url != bm.url {
            update.url = Some(result.url.clone());
            current_url = result.url.as_str();
        }
        if options.exports(result.status) {
            progress
                .capture
                .record_redirect(current_url, bm.url.as_str());
        }

        let status_tags = result.status_tags(false, &options.tag_redirect, &options.tag_error);
        if !tags::is_empty_set(&status_tags) {
            let base = options.custom_tags.as_deref().unwrap_or(&bm.tags);
            update.tags = Some(tags::canonicalize([base, status_tags.as_str()]));
        } else if let Some(custom) = &options.custom_tags {
            update.tags = Some(custom.clone());
        }

        if update.is_empty() {
            return false;
        }
        self.write(progress, bm, &update)
    }

    fn write_custom_tags(
        &self,
        progress: &mut Progress,
        bm: &Bookmark,
        options: &RefreshOptions,
    ) -> bool {
        match &options.custom_tags {
            Some(custom) => {
                let update = FieldUpdate {
                    tags: Some(custom.clone()),
                    ..Default::default()
                };
                self.write(progress, bm, &update)
            }
            None => false,
        }
    }

    fn write(&self, progress: &mut Progress, bm: &Bookmark, update: &FieldUpdate) -> bool {
        match self
            .store
            .update_fields(Some(&[bm.id]), update, Commit::Deferred)
        {
            Ok(_) => {
                debug!(id = bm.id, title = ?update.title, "Refreshed bookmark");
                progress.updated.push(bm.id);
                true
            }
            Err(e) => {
                progress.fail(bm, e);
                false
            }
        }
    }
}
