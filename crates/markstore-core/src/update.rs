//! Record lifecycle: add, update, delete, tag rewrites, import and export
//!
//! [`UpdateEngine`] sits between callers and the [`BookmarkStore`]. It
//! decides when an operation needs the network, delegates bulk refreshes
//! to the [`RefreshCoordinator`] and applies local edits afterwards, so
//! values given by the caller win over fetched ones.

use chrono::Local;
use tracing::{debug, info, warn};

use crate::fetch::{FetchResult, Fetcher, StatusTag};
use crate::interchange::{ExportCapture, ExportRecord, ExportSink, ImportSource};
use crate::models::{Bookmark, FieldUpdate, NewBookmark, FLAG_IMMUTABLE, FLAG_NONE};
use crate::refresh::{CancellationToken, RefreshCoordinator, RefreshOptions, RefreshReport};
use crate::selection::{Selection, StatusSet};
use crate::storage::{BookmarkStore, Commit, StoreError, StoreResult};
use crate::tags::{self, TagEdit};

/// A bookmark to add
#[derive(Debug, Clone, Default)]
pub struct AddRequest {
    pub url: String,
    /// `None` takes the fetched title
    pub title: Option<String>,
    /// Raw comma-separated tags
    pub tags: String,
    /// `None` takes the fetched description
    pub description: Option<String>,
    pub immutable: bool,
    /// Skip the network entirely
    pub offline: bool,
    /// Store the URL reached after permanent redirects
    pub url_redirect: bool,
    pub tag_redirect: StatusTag,
    pub tag_error: StatusTag,
    /// Refuse to add when the status is in this set or no response came
    pub del_error: Option<StatusSet>,
}

impl AddRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Changes to apply to selected records
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    /// New URL; single record only. Without a title it triggers a fetch.
    pub url: Option<String>,
    /// New title; an empty string clears it
    pub title: Option<String>,
    pub tags: Option<TagEdit>,
    pub description: Option<String>,
    pub immutable: Option<bool>,
    pub threads: usize,
    pub url_redirect: bool,
    pub tag_redirect: StatusTag,
    pub tag_error: StatusTag,
    /// Delete records whose status is in this set
    pub del_error: Option<StatusSet>,
    /// Capture records whose status is in this set for export
    pub export_on: Option<StatusSet>,
}

impl Default for UpdateRequest {
    fn default() -> Self {
        Self {
            url: None,
            title: None,
            tags: None,
            description: None,
            immutable: None,
            threads: 4,
            url_redirect: false,
            tag_redirect: StatusTag::Off,
            tag_error: StatusTag::Off,
            del_error: None,
            export_on: None,
        }
    }
}

impl UpdateRequest {
    /// No field was given, so the request means "refetch metadata"
    pub fn fetch_title(&self) -> bool {
        self.url.is_none()
            && self.title.is_none()
            && self.tags.is_none()
            && self.description.is_none()
            && self.immutable.is_none()
    }

    fn status_options(&self) -> RefreshOptions {
        RefreshOptions {
            threads: self.threads,
            url_redirect: self.url_redirect,
            tag_redirect: self.tag_redirect.clone(),
            tag_error: self.tag_error.clone(),
            del_error: self.del_error.clone(),
            export_on: self.export_on.clone(),
            ..Default::default()
        }
    }

    fn exports(&self, status: Option<u16>) -> bool {
        self.export_on.as_ref().is_some_and(|s| s.contains(status))
    }

    fn deletes(&self, status: Option<u16>) -> bool {
        self.del_error.as_ref().is_some_and(|s| s.contains(status))
    }
}

/// What an update did
#[derive(Debug, Default)]
pub struct UpdateOutcome {
    /// Rows changed by local field edits
    pub updated: usize,
    /// Tag edits were applied
    pub tags_modified: bool,
    /// Records deleted on error
    pub deleted: Vec<Bookmark>,
    /// Report of the network refresh, when one ran
    pub refresh: Option<RefreshReport>,
    pub capture: ExportCapture,
}

/// Options for [`UpdateEngine::import`]
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Tag every imported record with today's date (`2024Mar05`)
    pub auto_tag: bool,
    /// Merge tags into records whose URL already exists
    pub append_tags_on_duplicate: bool,
}

/// Totals of an import run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub added: usize,
    /// Duplicates whose tags were merged
    pub merged: usize,
    pub skipped: usize,
    /// Auto tag applied, if any
    pub auto_tag: Option<String>,
}

pub struct UpdateEngine<'a> {
    store: &'a BookmarkStore,
    fetcher: &'a dyn Fetcher,
    cancel: &'a CancellationToken,
}

impl<'a> UpdateEngine<'a> {
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

    fn coordinator(&self) -> RefreshCoordinator<'a> {
        RefreshCoordinator::new(self.store, self.fetcher, self.cancel)
    }

    // ==================== Add ====================

    /// Add a bookmark, fetching its metadata unless offline
    pub fn add(&self, request: &AddRequest, commit: Commit) -> StoreResult<i64> {
        if request.url.trim().is_empty() {
            return Err(StoreError::InvalidArgument("empty URL".to_string()));
        }
        if let Some(existing) = self.store.get_by_url(&request.url)? {
            return Err(StoreError::DuplicateUrl {
                url: request.url.clone(),
                id: Some(existing.id),
            });
        }

        let result = if request.offline {
            FetchResult::offline(&request.url)
        } else {
            let result = self.fetcher.fetch(&request.url, false);
            if result.bad_url {
                warn!(url = %request.url, "Malformed URL");
            } else if result.mime_only {
                debug!(url = %request.url, "HTTP HEAD requested");
            } else if result.title.is_empty() && request.title.is_none() {
                info!(url = %request.url, "No title");
            }
            result
        };

        if let Some(del_error) = request.del_error.as_ref().filter(|s| !s.is_empty()) {
            match result.status {
                None => {
                    return Err(StoreError::Network {
                        url: request.url.clone(),
                        reason: "no response".to_string(),
                    })
                }
                Some(status) if del_error.contains(Some(status)) => {
                    return Err(StoreError::HttpStatus {
                        url: request.url.clone(),
                        status,
                    })
                }
                Some(_) => {}
            }
        }

        let url = if request.url_redirect && !result.url.is_empty() {
            result.url.clone()
        } else {
            request.url.clone()
        };
        let status_tags = result.status_tags(true, &request.tag_redirect, &request.tag_error);
        let record = NewBookmark {
            url,
            title: request.title.clone().unwrap_or_else(|| result.title.clone()),
            tags: tags::canonicalize([request.tags.as_str(), status_tags.as_str()]),
            description: request
                .description
                .clone()
                .unwrap_or_else(|| result.description.clone()),
            flags: if request.immutable {
                FLAG_IMMUTABLE
            } else {
                FLAG_NONE
            },
        };

        let id = self.store.insert(&record, commit)?;
        info!(id, url = %record.url, "Added bookmark");
        Ok(id)
    }

    // ==================== Update ====================

    /// Update the selected records
    ///
    /// Status options or an empty request hand the selection to a network
    /// refresh first; local edits are applied afterwards. A record deleted
    /// on error counts as success.
    pub fn update(
        &self,
        selection: &Selection,
        request: &UpdateRequest,
    ) -> StoreResult<UpdateOutcome> {
        let single = selection.single();
        if request.url.is_some() && single.is_none() {
            return Err(StoreError::InvalidArgument(
                "a URL can only be set on a single record".to_string(),
            ));
        }
        if let Some(min) = selection.min_id() {
            if min > self.store.max_id()? {
                return Err(StoreError::NotFound(format!("index {min}")));
            }
        }

        let mut outcome = UpdateOutcome::default();
        let mut update = FieldUpdate {
            description: request.description.clone(),
            immutable: request.immutable,
            ..Default::default()
        };

        let fetch_title = request.fetch_title();
        let mut network_test = fetch_title || request.status_options().network_status_requested();

        // A new URL without a title is fetched right away
        let mut fetched: Option<FetchResult> = None;
        let mut url = request.url.clone();
        match (&request.url, single) {
            (Some(target), Some(id)) if request.title.is_none() => {
                network_test = false;
                let result = self.fetcher.fetch(target, false);
                if result.bad_url {
                    warn!(url = %target, "Malformed URL");
                } else if result.title.is_empty() {
                    info!(url = %target, "No title");
                }
                if !result.description.is_empty()
                    && request.description.as_deref().map_or(true, str::is_empty)
                {
                    update.description = Some(result.description.clone());
                }
                if request.url_redirect && result.url != *target {
                    url = Some(result.url.clone());
                }
                if request.exports(result.status) {
                    let new_url = url.as_deref().unwrap_or(target);
                    outcome.capture.record_redirect(new_url, target.as_str());
                }
                update.title = Some(result.title.clone());

                if request.deletes(result.status) {
                    let bm = self
                        .store
                        .get_by_id(id)?
                        .ok_or_else(|| StoreError::NotFound(format!("index {id}")))?;
                    if request.exports(result.status) {
                        outcome.capture.record_deleted(bm);
                    }
                    warn!(id, status = ?result.status, "HTTP error, deleting");
                    outcome.deleted.push(self.store.delete_by_id(id, Commit::Now)?);
                    return Ok(outcome);
                }
                fetched = Some(result);
            }
            _ => update.title = request.title.clone(),
        }
        update.url = url.clone();

        let ids = selection.ids_within(self.store.max_id()?);
        let mut pending = Vec::new();
        if network_test {
            let options = RefreshOptions {
                update_title: fetch_title,
                custom_url: url.clone(),
                custom_tags: match &request.tags {
                    Some(TagEdit::Replace(tags)) => Some(tags.clone()),
                    _ => None,
                },
                delay_delete: true,
                defer_commit: true,
                ..request.status_options()
            };
            let report = self.coordinator().refresh(selection, &options)?;
            pending = report.pending_deletes.clone();
            outcome.capture.merge(report.capture.clone());
            outcome.refresh = Some(report);
        }

        let edits = self.apply_edits(
            ids.as_deref(),
            request,
            fetched.as_ref(),
            network_test,
            &mut update,
            &mut outcome,
        );
        outcome.deleted.extend(self.commit_delete(&pending)?);
        edits?;
        Ok(outcome)
    }

    fn apply_edits(
        &self,
        ids: Option<&[i64]>,
        request: &UpdateRequest,
        fetched: Option<&FetchResult>,
        network_test: bool,
        update: &mut FieldUpdate,
        outcome: &mut UpdateOutcome,
    ) -> StoreResult<()> {
        let status_tags = fetched
            .map(|r| r.status_tags(false, &request.tag_redirect, &request.tag_error))
            .unwrap_or_else(|| tags::DELIM_STR.to_string());
        let has_status_tags = !tags::is_empty_set(&status_tags);

        match &request.tags {
            Some(TagEdit::Append(tags_in)) => {
                let merged = tags::canonicalize([tags_in.as_str(), status_tags.as_str()]);
                self.store.append_tags(ids, &merged, Commit::Deferred)?;
                outcome.tags_modified = true;
            }
            None if has_status_tags => {
                self.store.append_tags(ids, &status_tags, Commit::Deferred)?;
                outcome.tags_modified = true;
            }
            Some(TagEdit::Remove(tags_in)) => {
                self.store.remove_tags(ids, tags_in, Commit::Deferred)?;
                if has_status_tags {
                    self.store.append_tags(ids, &status_tags, Commit::Deferred)?;
                }
                outcome.tags_modified = true;
            }
            // the refresh already wrote these as custom tags
            Some(TagEdit::Replace(tags_in)) if !network_test => {
                update.tags = Some(tags::canonicalize([tags_in.as_str(), status_tags.as_str()]));
            }
            _ => {}
        }

        if update.is_empty() {
            return Ok(());
        }

        let changed = self.store.update_fields(ids, update, Commit::Deferred)?;
        if changed == 0 {
            return Err(StoreError::NotFound(match ids {
                Some([id]) => format!("index {id}"),
                _ => "records".to_string(),
            }));
        }
        debug!(changed, "Applied field edits");
        outcome.updated = changed;
        Ok(())
    }

    /// Apply deletions queued by a refresh, highest id first, then commit
    fn commit_delete(&self, pending: &[i64]) -> StoreResult<Vec<Bookmark>> {
        let mut ids = pending.to_vec();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.dedup();

        let mut deleted = Vec::with_capacity(ids.len());
        for id in ids {
            match self.store.delete_by_id(id, Commit::Deferred) {
                Ok(bm) => deleted.push(bm),
                Err(e) => warn!(id, error = %e, "Queued delete failed"),
            }
        }
        self.store.commit()?;
        Ok(deleted)
    }

    // ==================== Refresh ====================

    /// Network refresh without local edits
    pub fn refresh(
        &self,
        selection: &Selection,
        options: &RefreshOptions,
    ) -> StoreResult<RefreshReport> {
        self.coordinator().refresh(selection, options)
    }

    // ==================== Delete ====================

    /// Delete the selected records, keeping ids dense; returns the count
    pub fn delete(&self, selection: &Selection) -> StoreResult<usize> {
        let deleted = match selection {
            Selection::All => self.store.delete_all(Commit::Now)?,
            Selection::One(id) => {
                self.store.delete_by_id(*id, Commit::Now)?;
                1
            }
            Selection::Range { low, high } => self.store.delete_range(*low, *high, Commit::Now)?,
            Selection::Set(_) => {
                let ids = selection
                    .ids_within(self.store.max_id()?)
                    .unwrap_or_default();
                if ids.is_empty() {
                    return Err(StoreError::NotFound("index".to_string()));
                }
                self.store.delete_ids(&ids, Commit::Now)?.len()
            }
        };
        info!(deleted, "Deleted bookmarks");
        Ok(deleted)
    }

    // ==================== Tags ====================

    /// Replace tag `old` by `new` in every record; empty `new` removes it
    pub fn replace_tag(&self, old: &str, new: &[&str]) -> StoreResult<usize> {
        if old.contains(tags::DELIM) {
            return Err(StoreError::InvalidArgument(format!(
                "tag cannot contain '{}'",
                tags::DELIM
            )));
        }
        let old = old.trim().to_lowercase();
        if old.is_empty() {
            return Err(StoreError::InvalidArgument("empty tag".to_string()));
        }

        let new_tags = tags::canonicalize(new.iter().copied());
        if new_tags == tags::wrap(&old) {
            return Err(StoreError::InvalidArgument(
                "original and replacement tags are the same".to_string(),
            ));
        }

        let changed = self.store.rename_tag(&old, &new_tags, Commit::Now)?;
        info!(tag = %old, replacement = %new_tags, changed, "Replaced tag");
        Ok(changed)
    }

    // ==================== Import / export ====================

    /// Add every record from `source`, committing once at the end
    pub fn import(
        &self,
        source: &mut dyn ImportSource,
        options: &ImportOptions,
    ) -> StoreResult<ImportSummary> {
        let records = source.read_records()?;
        let mut summary = ImportSummary {
            auto_tag: options
                .auto_tag
                .then(|| tags::auto_tag(Local::now().date_naive())),
            ..Default::default()
        };

        for record in records {
            if self.cancel.is_cancelled() {
                info!("Import cancelled");
                break;
            }

            let tags_in = match &summary.auto_tag {
                Some(auto) => tags::canonicalize([record.tags.as_str(), auto.as_str()]),
                None => tags::canonicalize([record.tags.as_str()]),
            };
            let request = AddRequest {
                url: record.url.clone(),
                title: record.title.clone(),
                tags: tags_in.clone(),
                description: record.description.clone(),
                immutable: record.flags & FLAG_IMMUTABLE != 0,
                offline: !record.fetch,
                url_redirect: !record.url_is_final,
                ..Default::default()
            };

            match self.add(&request, Commit::Deferred) {
                Ok(_) => summary.added += 1,
                Err(StoreError::DuplicateUrl { id: Some(id), .. })
                    if options.append_tags_on_duplicate =>
                {
                    self.store.append_tags(Some(&[id]), &tags_in, Commit::Deferred)?;
                    summary.merged += 1;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    debug!(url = %record.url, error = %e, "Skipped import record");
                    summary.skipped += 1;
                }
            }
        }

        self.store.commit()?;
        info!(
            added = summary.added,
            merged = summary.merged,
            skipped = summary.skipped,
            "Import finished"
        );
        Ok(summary)
    }

    /// Write records to `sink`
    ///
    /// With a capture from a refresh, only the captured records are written,
    /// annotated with their old URL or deletion. Otherwise `records`, or
    /// the whole store when `None`.
    pub fn export(
        &self,
        sink: &mut dyn ExportSink,
        records: Option<&[Bookmark]>,
        capture: Option<&ExportCapture>,
    ) -> StoreResult<usize> {
        let out: Vec<ExportRecord> = match (capture, records) {
            (Some(capture), _) => capture.resolve(&self.store.get_all()?),
            (None, Some(records)) => records.iter().map(ExportRecord::from).collect(),
            (None, None) => self.store.get_all()?.iter().map(ExportRecord::from).collect(),
        };
        if out.is_empty() {
            return Err(StoreError::NotFound("records to export".to_string()));
        }

        for record in &out {
            sink.write_record(record)?;
        }
        sink.finish()?;
        info!(count = out.len(), "Exported bookmarks");
        Ok(out.len())
    }
}
