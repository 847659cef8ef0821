//! Cloud sync manager.
//!
//! Owns the authorization/connection flow, the configured source list, and
//! at most one open directory browser. Shares the document set with the
//! lifecycle tracker so already-imported files are never imported twice.

use std::collections::BTreeSet;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::RwLock;

use doc_core::sync::is_supported_file;
use doc_core::{Document, RemoteFile, RemoteFolder, SyncSource, SyncSourceId, SyncStatus};

use crate::error::{ClientError, Result};
use crate::events::{EventBus, StateEvent};
use crate::services::{NewSyncSource, SyncProvider};
use crate::tracker::DocumentTracker;

/// Where the connection flow currently stands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionFlow {
    #[default]
    Idle,
    /// Waiting for the user to paste the provider's authorization code.
    AwaitingCode {
        auth_url: String,
        /// Set when reconnecting an existing source instead of creating one.
        reconnect: Option<SyncSourceId>,
        error: Option<String>,
    },
    /// Code exchanged; holding the credential until the source is persisted.
    Configuring {
        token: String,
        account_label: String,
    },
}

/// State of the open directory browser. Selection and import marks are
/// cleared on every path change; a failed load shows the error with empty
/// listings instead of stale contents.
#[derive(Debug, Clone)]
pub struct BrowseState {
    pub source_id: SyncSourceId,
    pub path: String,
    pub folders: Vec<RemoteFolder>,
    pub files: Vec<RemoteFile>,
    pub selected: BTreeSet<String>,
    pub importing: BTreeSet<String>,
    pub last_error: Option<String>,
}

impl BrowseState {
    fn closed_at(source_id: SyncSourceId, path: &str) -> Self {
        Self {
            source_id,
            path: path.to_string(),
            folders: Vec::new(),
            files: Vec::new(),
            selected: BTreeSet::new(),
            importing: BTreeSet::new(),
            last_error: None,
        }
    }
}

#[derive(Default)]
struct SyncState {
    sources: Vec<SyncSource>,
    flow: ConnectionFlow,
    auth_url_cache: Option<String>,
    browser: Option<BrowseState>,
}

pub struct SyncManager {
    provider: Arc<dyn SyncProvider>,
    tracker: Arc<DocumentTracker>,
    state: Arc<RwLock<SyncState>>,
    events: EventBus,
}

impl SyncManager {
    pub fn new(
        provider: Arc<dyn SyncProvider>,
        tracker: Arc<DocumentTracker>,
        events: EventBus,
    ) -> Self {
        Self {
            provider,
            tracker,
            state: Arc::new(RwLock::new(SyncState::default())),
            events,
        }
    }

    // --- Snapshots ---

    pub async fn sources(&self) -> Vec<SyncSource> {
        self.state.read().await.sources.clone()
    }

    pub async fn flow(&self) -> ConnectionFlow {
        self.state.read().await.flow.clone()
    }

    pub async fn browse_state(&self) -> Option<BrowseState> {
        self.state.read().await.browser.clone()
    }

    /// Paths in the open browser whose file name matches a non-failed
    /// document; these are excluded from select-all and not selectable.
    pub async fn already_present_paths(&self) -> Vec<String> {
        let files: Vec<RemoteFile> = match &self.state.read().await.browser {
            Some(browser) => browser.files.clone(),
            None => return Vec::new(),
        };
        let mut blocked = Vec::new();
        for file in files {
            if self.tracker.has_active_named(&file.name).await {
                blocked.push(file.path);
            }
        }
        blocked
    }

    // --- Connection flow ---

    /// Begin connecting a new source: fetch (and cache) the provider's
    /// authorization URL and wait for the code.
    pub async fn start_connection(&self) -> Result<String> {
        self.start_flow(None).await
    }

    /// Begin re-authorizing an existing, disconnected source.
    pub async fn start_reconnection(&self, source_id: SyncSourceId) -> Result<String> {
        self.source_exists(source_id).await?;
        self.start_flow(Some(source_id)).await
    }

    async fn start_flow(&self, reconnect: Option<SyncSourceId>) -> Result<String> {
        let cached = self.state.read().await.auth_url_cache.clone();
        let auth_url = match cached {
            Some(url) => url,
            None => {
                let url = self.provider.authorization_url().await?;
                self.state.write().await.auth_url_cache = Some(url.clone());
                url
            }
        };

        self.state.write().await.flow = ConnectionFlow::AwaitingCode {
            auth_url: auth_url.clone(),
            reconnect,
            error: None,
        };
        self.events.emit(StateEvent::SyncChanged);
        Ok(auth_url)
    }

    /// Exchange the pasted authorization code. On success the flow advances
    /// (to configuration, or straight back to idle for a reconnect); on
    /// failure it stays where it is with the provider's error shown inline.
    pub async fn submit_code(&self, code: &str) -> Result<()> {
        let reconnect = match &self.state.read().await.flow {
            ConnectionFlow::AwaitingCode { reconnect, .. } => *reconnect,
            _ => {
                warn!("authorization code submitted outside the connection flow");
                return Ok(());
            }
        };

        if let Some(source_id) = reconnect {
            return self.reconnect(source_id, code).await;
        }

        match self.provider.exchange_code(code, None).await {
            Ok(account) => {
                info!("authorized cloud account '{}'", account.account_label);
                self.state.write().await.flow = ConnectionFlow::Configuring {
                    token: account.token,
                    account_label: account.account_label,
                };
                self.events.emit(StateEvent::SyncChanged);
                Ok(())
            }
            Err(e) => {
                self.record_flow_error(&e).await;
                Err(e)
            }
        }
    }

    /// Exchange a code on behalf of an existing source. The provider stores
    /// the credential on the source record; the local record is updated to
    /// match.
    pub async fn reconnect(&self, source_id: SyncSourceId, code: &str) -> Result<()> {
        self.source_exists(source_id).await?;
        match self.provider.exchange_code(code, Some(source_id)).await {
            Ok(account) => {
                let mut state = self.state.write().await;
                if let Some(source) = state.sources.iter_mut().find(|s| s.id == source_id) {
                    source.oauth_token = Some(account.token);
                    source.account_label = Some(account.account_label);
                    source.is_connected = true;
                    source.status = SyncStatus::Idle;
                    source.error_message = None;
                }
                if matches!(state.flow, ConnectionFlow::AwaitingCode { .. }) {
                    state.flow = ConnectionFlow::Idle;
                }
                drop(state);
                info!("reconnected sync source {source_id}");
                self.events.emit(StateEvent::SyncChanged);
                Ok(())
            }
            Err(e) => {
                self.record_flow_error(&e).await;
                Err(e)
            }
        }
    }

    async fn record_flow_error(&self, error: &ClientError) {
        let mut state = self.state.write().await;
        if let ConnectionFlow::AwaitingCode { error: slot, .. } = &mut state.flow {
            *slot = Some(match error {
                ClientError::Api { detail, .. } => detail.clone(),
                other => other.to_string(),
            });
        }
        drop(state);
        self.events.emit(StateEvent::SyncChanged);
    }

    /// Persist a new source with the credential held by the flow. The flow's
    /// copy is discarded afterwards; the source record is its sole holder
    /// from here on.
    pub async fn create_source(
        &self,
        name: &str,
        folder_path: &str,
        sync_interval: u32,
    ) -> Result<SyncSource> {
        let (token, account_label) = match &self.state.read().await.flow {
            ConnectionFlow::Configuring {
                token,
                account_label,
            } => (token.clone(), account_label.clone()),
            _ => return Err(ClientError::NotConnected),
        };

        let source = self
            .provider
            .create_source(NewSyncSource {
                name: name.to_string(),
                folder_path: folder_path.to_string(),
                sync_interval,
                oauth_token: Some(token),
                account_label: Some(account_label),
            })
            .await?;

        let mut state = self.state.write().await;
        state.sources.push(source.clone());
        state.flow = ConnectionFlow::Idle;
        drop(state);
        info!("created sync source '{}' (id={})", source.name, source.id);
        self.events.emit(StateEvent::SyncChanged);
        Ok(source)
    }

    /// Abandon the connection flow without creating anything.
    pub async fn cancel_connection(&self) {
        self.state.write().await.flow = ConnectionFlow::Idle;
        self.events.emit(StateEvent::SyncChanged);
    }

    // --- Source list ---

    /// Replace the source list with the provider's current view. This is
    /// also the only thing that updates displayed sync statuses.
    pub async fn refresh_sources(&self) -> Result<()> {
        let sources = self.provider.list_sources().await?;
        self.state.write().await.sources = sources;
        self.events.emit(StateEvent::SyncChanged);
        Ok(())
    }

    /// Ask the provider to sync now. The displayed status is not updated
    /// optimistically; the next list refresh reports it.
    pub async fn sync(&self, source_id: SyncSourceId) -> Result<()> {
        self.source_exists(source_id).await?;
        self.provider.trigger_sync(source_id).await
    }

    pub async fn disconnect(&self, source_id: SyncSourceId) -> Result<()> {
        self.source_exists(source_id).await?;
        self.provider.disconnect(source_id).await
    }

    /// Delete a source, closing its browser if it is the open one.
    pub async fn delete_source(&self, source_id: SyncSourceId) -> Result<()> {
        self.source_exists(source_id).await?;
        self.provider.delete_source(source_id).await?;

        let mut state = self.state.write().await;
        state.sources.retain(|s| s.id != source_id);
        let browser_closed =
            matches!(&state.browser, Some(browser) if browser.source_id == source_id);
        if browser_closed {
            state.browser = None;
        }
        drop(state);
        self.events.emit(StateEvent::SyncChanged);
        if browser_closed {
            self.events.emit(StateEvent::BrowserChanged);
        }
        Ok(())
    }

    // --- Browsing ---

    /// Toggle the browser for a source: close it if it is already open,
    /// otherwise open it at the disk root. Opening replaces any browser
    /// open for another source. Browsing is only valid while connected.
    pub async fn open_browser(&self, source_id: SyncSourceId) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if let Some(browser) = &state.browser {
                if browser.source_id == source_id {
                    state.browser = None;
                    drop(state);
                    self.events.emit(StateEvent::BrowserChanged);
                    return Ok(());
                }
            }
        }
        self.credential_for(source_id).await?;
        self.state.write().await.browser = Some(BrowseState::closed_at(source_id, "/"));
        self.load_folder(source_id, "/").await
    }

    pub async fn close_browser(&self) {
        let mut state = self.state.write().await;
        if state.browser.take().is_some() {
            drop(state);
            self.events.emit(StateEvent::BrowserChanged);
        }
    }

    /// Fetch a directory listing and replace the browser contents
    /// atomically. Selection and import marks never survive a path change.
    pub async fn load_folder(&self, source_id: SyncSourceId, path: &str) -> Result<()> {
        {
            let state = self.state.read().await;
            match &state.browser {
                Some(browser) if browser.source_id == source_id => {}
                _ => return Err(ClientError::BrowserClosed),
            }
        }
        let token = self.credential_for(source_id).await?;

        match self.provider.list_directory(&token, path).await {
            Ok(listing) => {
                let mut state = self.state.write().await;
                if let Some(browser) = &mut state.browser {
                    *browser = BrowseState {
                        source_id,
                        path: path.to_string(),
                        folders: listing.folders,
                        files: listing.files,
                        selected: BTreeSet::new(),
                        importing: BTreeSet::new(),
                        last_error: None,
                    };
                }
                drop(state);
                self.events.emit(StateEvent::BrowserChanged);
                Ok(())
            }
            Err(e) => {
                let mut state = self.state.write().await;
                if let Some(browser) = &mut state.browser {
                    *browser = BrowseState::closed_at(source_id, path);
                    browser.last_error = Some(e.to_string());
                }
                drop(state);
                self.events.emit(StateEvent::BrowserChanged);
                Err(e)
            }
        }
    }

    pub async fn navigate_up(&self) -> Result<()> {
        let (source_id, path) = self.open_browser_path().await?;
        let parent = parent_path(&path);
        self.load_folder(source_id, &parent).await
    }

    pub async fn navigate_to_folder(&self, folder_path: &str) -> Result<()> {
        let (source_id, _) = self.open_browser_path().await?;
        self.load_folder(source_id, folder_path).await
    }

    // --- Selection ---

    /// Select or deselect one file. Files whose name matches a non-failed
    /// document are never selectable.
    pub async fn toggle_select(&self, path: &str) -> Result<()> {
        let file = self.browser_file(path).await?;
        if self.tracker.has_active_named(&file.name).await {
            debug!("'{}' already imported, selection refused", file.name);
            return Ok(());
        }
        let mut state = self.state.write().await;
        if let Some(browser) = &mut state.browser {
            if !browser.selected.remove(path) {
                browser.selected.insert(path.to_string());
            }
        }
        drop(state);
        self.events.emit(StateEvent::BrowserChanged);
        Ok(())
    }

    /// Select every listed file that is not already imported and not mid-
    /// import.
    pub async fn select_all(&self) -> Result<()> {
        let files: Vec<RemoteFile> = match &self.state.read().await.browser {
            Some(browser) => browser.files.clone(),
            None => return Err(ClientError::BrowserClosed),
        };

        let mut selectable = BTreeSet::new();
        for file in files {
            if is_supported_file(&file.name) && !self.tracker.has_active_named(&file.name).await {
                selectable.insert(file.path);
            }
        }

        let mut state = self.state.write().await;
        if let Some(browser) = &mut state.browser {
            for path in browser.importing.iter() {
                selectable.remove(path);
            }
            browser.selected = selectable;
        }
        drop(state);
        self.events.emit(StateEvent::BrowserChanged);
        Ok(())
    }

    pub async fn clear_selection(&self) {
        let mut state = self.state.write().await;
        if let Some(browser) = &mut state.browser {
            browser.selected.clear();
        }
        drop(state);
        self.events.emit(StateEvent::BrowserChanged);
    }

    // --- Import ---

    /// Import one file by path and register the resulting document with the
    /// lifecycle tracker. A file that became a duplicate since the listing
    /// loaded is skipped.
    pub async fn import_one(&self, source_id: SyncSourceId, file: &RemoteFile) -> Result<()> {
        if !is_supported_file(&file.name) {
            info!("skipping import of '{}', unsupported type", file.name);
            return Ok(());
        }
        if self.tracker.has_active_named(&file.name).await {
            info!("skipping import of '{}', already present", file.name);
            return Ok(());
        }
        let token = self.credential_for(source_id).await?;

        self.set_importing(&file.path, true).await;
        let result = self.provider.import_file(&token, &file.path, &file.name).await;
        self.set_importing(&file.path, false).await;

        match result {
            Ok(receipt) => {
                let doc = Document::new_processing(receipt.document_id, receipt.filename);
                self.tracker.register_uploaded(doc).await;
                Ok(())
            }
            Err(e) => {
                warn!("import of '{}' failed: {e}", file.name);
                let mut state = self.state.write().await;
                if let Some(browser) = &mut state.browser {
                    browser.last_error = Some(e.to_string());
                }
                drop(state);
                self.events.emit(StateEvent::BrowserChanged);
                Err(e)
            }
        }
    }

    /// Import every selected file, strictly one at a time so each import's
    /// duplicate check sees the documents created by the imports before it.
    /// Selection is cleared afterwards regardless of per-file outcomes.
    pub async fn import_selected(&self, source_id: SyncSourceId) -> Result<()> {
        let files: Vec<RemoteFile> = {
            let state = self.state.read().await;
            let browser = match &state.browser {
                Some(browser) if browser.source_id == source_id => browser,
                _ => return Err(ClientError::BrowserClosed),
            };
            browser
                .files
                .iter()
                .filter(|f| browser.selected.contains(&f.path))
                .cloned()
                .collect()
        };

        for file in &files {
            // Per-file failures never abort the batch.
            let _ = self.import_one(source_id, file).await;
        }

        self.clear_selection().await;
        Ok(())
    }

    // --- Helpers ---

    async fn source_exists(&self, source_id: SyncSourceId) -> Result<()> {
        let state = self.state.read().await;
        if state.sources.iter().any(|s| s.id == source_id) {
            Ok(())
        } else {
            Err(ClientError::SourceNotFound(source_id))
        }
    }

    /// The credential for browsing/import: the source's stored token, or the
    /// one held by an in-progress connection flow if the record has none yet.
    async fn credential_for(&self, source_id: SyncSourceId) -> Result<String> {
        let state = self.state.read().await;
        let source = state
            .sources
            .iter()
            .find(|s| s.id == source_id)
            .ok_or(ClientError::SourceNotFound(source_id))?;
        if let Some(token) = &source.oauth_token {
            return Ok(token.clone());
        }
        if let ConnectionFlow::Configuring { token, .. } = &state.flow {
            return Ok(token.clone());
        }
        Err(ClientError::NotConnected)
    }

    async fn open_browser_path(&self) -> Result<(SyncSourceId, String)> {
        let state = self.state.read().await;
        state
            .browser
            .as_ref()
            .map(|b| (b.source_id, b.path.clone()))
            .ok_or(ClientError::BrowserClosed)
    }

    async fn browser_file(&self, path: &str) -> Result<RemoteFile> {
        let state = self.state.read().await;
        let browser = state.browser.as_ref().ok_or(ClientError::BrowserClosed)?;
        browser
            .files
            .iter()
            .find(|f| f.path == path)
            .cloned()
            .ok_or_else(|| ClientError::Api {
                status: 404,
                detail: format!("file not listed: {path}"),
            })
    }

    async fn set_importing(&self, path: &str, importing: bool) {
        let mut state = self.state.write().await;
        if let Some(browser) = &mut state.browser {
            if importing {
                browser.importing.insert(path.to_string());
            } else {
                browser.importing.remove(path);
            }
        }
        drop(state);
        self.events.emit(StateEvent::BrowserChanged);
    }
}

/// Parent of a browse path; the root is its own parent.
fn parent_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => {
            let parent = &trimmed[..idx];
            if parent.ends_with(':') {
                format!("{parent}/")
            } else {
                parent.to_string()
            }
        }
    }
}
