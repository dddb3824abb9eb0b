//! Gallery state: paged photo feed, selection, long press and the viewer.
//!
//! The state machine is synchronous and takes time as an argument, so any
//! front end (terminal, GUI, tests) can drive it with its own event loop.

use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::models::{Photo, PhotoPage};

/// How long a touch must be held to enter selection mode.
pub const LONG_PRESS: Duration = Duration::from_millis(500);

/// Movement beyond this many pixels on either axis is a scroll, not a press.
pub const LONG_PRESS_SLOP: f64 = 10.0;

/// Pause between files of a batch download.
pub const DOWNLOAD_DELAY: Duration = Duration::from_millis(300);

pub const PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Browsing,
    Selecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardState {
    Unselected,
    Selected,
    LongPressPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    ArrowLeft,
    ArrowRight,
    Escape,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapOutcome {
    Ignored,
    OpenedViewer(usize),
    Toggled { index: usize, selected: bool },
}

/// A page fetch the gallery has committed to. Hand it back to
/// [`Gallery::finish_page_load`] once the request completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page_token: Option<String>,
    pub page_size: u32,
}

#[derive(Debug, Clone, Copy)]
struct PendingPress {
    index: usize,
    origin: Point,
    started: Instant,
}

#[derive(Debug)]
pub struct Gallery {
    error: Option<String>,
    has_more: bool,
    loaded_once: bool,
    loading: bool,
    mode: Mode,
    next_page_token: Option<String>,
    pending_press: Option<PendingPress>,
    photos: Vec<Photo>,
    selected: HashSet<String>,
    viewer: Option<usize>,
}

impl Default for Gallery {
    fn default() -> Self {
        Self::new()
    }
}

impl Gallery {
    pub fn new() -> Self {
        Self {
            error: None,
            has_more: true,
            loaded_once: false,
            loading: false,
            mode: Mode::Browsing,
            next_page_token: None,
            pending_press: None,
            photos: Vec::new(),
            selected: HashSet::new(),
            viewer: None,
        }
    }

    pub fn photos(&self) -> &[Photo] {
        &self.photos
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    // ------------------------------------------------------------------
    // Paging
    // ------------------------------------------------------------------

    /// Request the first page. Also used to retry after a failed first load.
    pub fn start_initial_load(&mut self) -> Option<PageRequest> {
        if self.loading {
            return None;
        }
        self.loading = true;
        Some(PageRequest {
            page_token: None,
            page_size: PAGE_SIZE,
        })
    }

    /// The sentinel below the grid scrolled into view.
    ///
    /// Yields a request only when nothing is in flight and the server handed
    /// out a continuation cursor.
    pub fn on_sentinel_visible(&mut self) -> Option<PageRequest> {
        if self.loading || !self.loaded_once || !self.has_more {
            return None;
        }
        let page_token = self.next_page_token.clone()?;
        self.loading = true;
        Some(PageRequest {
            page_token: Some(page_token),
            page_size: PAGE_SIZE,
        })
    }

    pub fn finish_page_load(&mut self, request: &PageRequest, result: Result<PhotoPage, String>) {
        self.loading = false;
        match result {
            Ok(page) => {
                if request.page_token.is_none() {
                    self.photos = page.photos;
                    self.selected.clear();
                    self.viewer = None;
                } else {
                    self.photos.extend(page.photos);
                }
                self.next_page_token = page.next_page_token.filter(|t| !t.is_empty());
                self.has_more = page.has_more && self.next_page_token.is_some();
                self.loaded_once = true;
                self.error = None;
            }
            Err(message) => {
                // The cursor is kept so the same page can be requested again.
                self.error = Some(message);
            }
        }
    }

    // ------------------------------------------------------------------
    // Taps, selection and long press
    // ------------------------------------------------------------------

    pub fn tap(&mut self, index: usize) -> TapOutcome {
        if index >= self.photos.len() {
            return TapOutcome::Ignored;
        }
        match self.mode {
            Mode::Browsing => {
                self.viewer = Some(index);
                TapOutcome::OpenedViewer(index)
            }
            Mode::Selecting => {
                let selected = self.toggle(index);
                TapOutcome::Toggled { index, selected }
            }
        }
    }

    pub fn card_state(&self, index: usize) -> CardState {
        if self.pending_press.is_some_and(|p| p.index == index) {
            return CardState::LongPressPending;
        }
        match self.photos.get(index) {
            Some(photo) if self.selected.contains(&photo.id) => CardState::Selected,
            _ => CardState::Unselected,
        }
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.contains(id)
    }

    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    /// Selected photos in gallery order.
    pub fn selected_photos(&self) -> Vec<Photo> {
        self.photos
            .iter()
            .filter(|p| self.selected.contains(&p.id))
            .cloned()
            .collect()
    }

    /// Switch between browsing and selection. Leaving selection mode drops
    /// the selection.
    pub fn toggle_selection_mode(&mut self) {
        self.mode = match self.mode {
            Mode::Browsing => Mode::Selecting,
            Mode::Selecting => {
                self.selected.clear();
                Mode::Browsing
            }
        };
    }

    /// Select everything, or nothing if everything is already selected.
    pub fn toggle_select_all(&mut self) {
        if self.selected.len() == self.photos.len() {
            self.selected.clear();
        } else {
            self.selected = self.photos.iter().map(|p| p.id.clone()).collect();
        }
    }

    pub fn touch_start(&mut self, index: usize, at: Point, now: Instant) {
        if index >= self.photos.len() {
            return;
        }
        self.pending_press = Some(PendingPress {
            index,
            origin: at,
            started: now,
        });
    }

    pub fn touch_move(&mut self, to: Point) {
        if let Some(press) = self.pending_press {
            let dx = (to.x - press.origin.x).abs();
            let dy = (to.y - press.origin.y).abs();
            if dx > LONG_PRESS_SLOP || dy > LONG_PRESS_SLOP {
                self.pending_press = None;
            }
        }
    }

    pub fn touch_end(&mut self) {
        self.pending_press = None;
    }

    /// Complete a pending long press once it has been held long enough.
    /// Returns the index that got selected.
    pub fn poll_long_press(&mut self, now: Instant) -> Option<usize> {
        let press = self.pending_press?;
        if now.duration_since(press.started) < LONG_PRESS {
            return None;
        }
        self.pending_press = None;
        self.mode = Mode::Selecting;
        let id = self.photos.get(press.index)?.id.clone();
        self.selected.insert(id);
        Some(press.index)
    }

    fn toggle(&mut self, index: usize) -> bool {
        let id = &self.photos[index].id;
        if self.selected.remove(id) {
            false
        } else {
            self.selected.insert(id.clone());
            true
        }
    }

    // ------------------------------------------------------------------
    // Viewer
    // ------------------------------------------------------------------

    pub fn viewer_index(&self) -> Option<usize> {
        self.viewer
    }

    pub fn viewer_photo(&self) -> Option<&Photo> {
        self.viewer.and_then(|i| self.photos.get(i))
    }

    pub fn close_viewer(&mut self) {
        self.viewer = None;
    }

    pub fn can_go_previous(&self) -> bool {
        self.viewer.is_some_and(|i| i > 0)
    }

    pub fn can_go_next(&self) -> bool {
        self.viewer.is_some_and(|i| i + 1 < self.photos.len())
    }

    pub fn go_previous(&mut self) {
        if self.can_go_previous() {
            self.viewer = self.viewer.map(|i| i - 1);
        }
    }

    pub fn go_next(&mut self) {
        if self.can_go_next() {
            self.viewer = self.viewer.map(|i| i + 1);
        }
    }

    /// Keyboard bindings; they only apply while the viewer is open.
    /// Returns whether the key was handled.
    pub fn handle_key(&mut self, key: Key) -> bool {
        if self.viewer.is_none() {
            return false;
        }
        match key {
            Key::Escape => self.close_viewer(),
            Key::ArrowLeft => self.go_previous(),
            Key::ArrowRight => self.go_next(),
            Key::Other => return false,
        }
        true
    }

    /// Called after a batch download: selection is cleared and selection
    /// mode ends.
    pub fn finish_batch_download(&mut self) {
        self.selected.clear();
        self.mode = Mode::Browsing;
    }
}

/// File name used when saving a photo locally.
///
/// Names come from the server, so only their final path component is kept;
/// a name with no usable component falls back to the photo id.
pub fn download_file_name(photo: &Photo) -> String {
    plain_file_name(&photo.name).unwrap_or_else(|| {
        format!(
            "photo-{}.jpg",
            plain_file_name(&photo.id).unwrap_or_default()
        )
    })
}

/// Make `name` unique among `taken`, appending `-2`, `-3`, ... before the
/// extension, and record the result.
pub fn unique_file_name(taken: &mut HashSet<String>, name: String) -> String {
    if taken.insert(name.clone()) {
        return name;
    }
    let path = Path::new(&name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut n = 2;
    loop {
        let candidate = format!("{stem}-{n}{extension}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn plain_file_name(raw: &str) -> Option<String> {
    Path::new(raw)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .filter(|name| !name.is_empty() && name != "..")
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DownloadSummary {
    pub downloaded: usize,
    pub failed: usize,
}

/// Download photos one after another with `delay` between them.
/// Failures are logged and do not stop the batch.
pub async fn download_sequentially<F, Fut, E>(
    photos: Vec<Photo>,
    delay: Duration,
    mut save: F,
) -> DownloadSummary
where
    F: FnMut(Photo) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    let mut summary = DownloadSummary::default();
    let total = photos.len();

    for (position, photo) in photos.into_iter().enumerate() {
        let id = photo.id.clone();
        match save(photo).await {
            Ok(()) => summary.downloaded += 1,
            Err(e) => {
                tracing::warn!(photo_id = %id, error = %e, "Download failed");
                summary.failed += 1;
            }
        }
        if position + 1 < total && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    summary
}
