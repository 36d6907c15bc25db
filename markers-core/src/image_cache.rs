/*!
# Icon Image Cache

Maps icon URLs to decoded bitmaps. The first reference to a URL starts one
asynchronous load; draws requested before it finishes wait in a per-entry FIFO
and run when the completion is processed on the owning thread.

Loads are fire-and-forget. A failed load leaves the entry in
[`LoadState::Failed`] for the rest of the cache's life and its markers are
never drawn.
*/

use crate::coords::Point;
use crate::error::{MarkerError, MarkerResult};
use crate::types::{MarkerId, MarkerRef};
use image::RgbaImage;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub type Bitmap = Arc<RgbaImage>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Loading,
    Ready,
    Failed,
}

/// Cheap key into the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageHandle(Rc<str>);

impl ImageHandle {
    pub fn url(&self) -> &str {
        &self.0
    }
}

/// A draw waiting for its icon.
#[derive(Debug, Clone)]
pub struct PendingDraw {
    pub marker: MarkerRef,
    pub position: Point,
}

struct ImageEntry {
    bitmap: Option<Bitmap>,
    state: LoadState,
    pending: VecDeque<PendingDraw>,
}

type Completion = (String, MarkerResult<RgbaImage>);

/// Completion slot handed to an [`ImageSource`]. It can be sent to and
/// completed from any thread; the result is picked up by the owning cache.
pub struct LoadReply {
    url: String,
    sender: Sender<Completion>,
}

impl LoadReply {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn complete(self, result: MarkerResult<RgbaImage>) {
        if self.sender.send((self.url, result)).is_err() {
            log::debug!("Image cache dropped before load finished");
        }
    }
}

/// Starts icon loads.
pub trait ImageSource {
    /// Begin loading `reply.url()`. Must not block on the load itself.
    fn fetch(&self, reply: LoadReply);
}

/// Reads and decodes icon files on the rayon pool.
#[derive(Debug, Clone, Default)]
pub struct FileImageSource {
    root: Option<PathBuf>,
}

impl FileImageSource {
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Resolve relative URLs against `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, url: &str) -> PathBuf {
        let path = PathBuf::from(url.strip_prefix("file://").unwrap_or(url));
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path,
        }
    }
}

impl ImageSource for FileImageSource {
    fn fetch(&self, reply: LoadReply) {
        let path = self.resolve(reply.url());
        rayon::spawn(move || {
            let result = image::open(&path)
                .map(|decoded| decoded.to_rgba8())
                .map_err(|err| MarkerError::image_load(reply.url(), err.to_string()));
            reply.complete(result);
        });
    }
}

/// Serves bitmaps registered up front; unknown URLs fail.
#[derive(Debug, Clone, Default)]
pub struct StaticImageSource {
    images: HashMap<String, RgbaImage>,
}

impl StaticImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, url: impl Into<String>, image: RgbaImage) -> Self {
        self.images.insert(url.into(), image);
        self
    }
}

impl ImageSource for StaticImageSource {
    fn fetch(&self, reply: LoadReply) {
        let result = self
            .images
            .get(reply.url())
            .cloned()
            .ok_or_else(|| MarkerError::image_load(reply.url(), "no such image"));
        reply.complete(result);
    }
}

pub struct ImageCache {
    entries: HashMap<Rc<str>, ImageEntry>,
    source: Box<dyn ImageSource>,
    sender: Sender<Completion>,
    receiver: Receiver<Completion>,
    in_flight: usize,
}

impl ImageCache {
    pub fn new(source: impl ImageSource + 'static) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            entries: HashMap::new(),
            source: Box::new(source),
            sender,
            receiver,
            in_flight: 0,
        }
    }

    /// Returns the entry for `url`, starting a load on first reference.
    pub fn get_or_load(&mut self, url: &str) -> ImageHandle {
        if let Some((key, _)) = self.entries.get_key_value(url) {
            return ImageHandle(key.clone());
        }

        let key: Rc<str> = Rc::from(url);
        self.entries.insert(
            key.clone(),
            ImageEntry {
                bitmap: None,
                state: LoadState::Loading,
                pending: VecDeque::new(),
            },
        );
        self.in_flight += 1;
        log::debug!("Loading icon {}", url);
        self.source.fetch(LoadReply {
            url: url.to_string(),
            sender: self.sender.clone(),
        });
        ImageHandle(key)
    }

    pub fn state(&self, handle: &ImageHandle) -> Option<LoadState> {
        self.entries.get(&handle.0).map(|entry| entry.state)
    }

    pub fn is_loaded(&self, handle: &ImageHandle) -> bool {
        self.state(handle) == Some(LoadState::Ready)
    }

    pub fn bitmap(&self, handle: &ImageHandle) -> Option<Bitmap> {
        self.entries.get(&handle.0).and_then(|entry| entry.bitmap.clone())
    }

    /// Draws now if the icon is ready, otherwise queues the draw.
    ///
    /// A marker already queued on this entry keeps its place in the queue and
    /// has its position updated.
    pub fn on_ready<F>(&mut self, handle: &ImageHandle, marker: &MarkerRef, position: Point, draw: F)
    where
        F: FnOnce(&MarkerRef, Point, &Bitmap),
    {
        let Some(entry) = self.entries.get_mut(&handle.0) else {
            return;
        };
        match entry.state {
            LoadState::Ready => {
                if let Some(bitmap) = &entry.bitmap {
                    draw(marker, position, bitmap);
                }
            }
            LoadState::Loading => {
                let id = marker.id();
                match entry.pending.iter_mut().find(|p| p.marker.id() == id) {
                    Some(queued) => queued.position = position,
                    None => entry.pending.push_back(PendingDraw {
                        marker: marker.clone(),
                        position,
                    }),
                }
            }
            LoadState::Failed => {}
        }
    }

    /// Applies every finished load, flushing queued draws in arrival order.
    /// Returns the number of loads applied.
    pub fn process_completions<F>(&mut self, mut draw: F) -> usize
    where
        F: FnMut(&MarkerRef, Point, &Bitmap),
    {
        let mut applied = 0;
        while let Ok((url, result)) = self.receiver.try_recv() {
            self.finish(&url, result, &mut draw);
            applied += 1;
        }
        applied
    }

    /// Like [`process_completions`](Self::process_completions) but blocks until
    /// no load is outstanding or `timeout` passes.
    pub fn wait_for_loads<F>(&mut self, timeout: Duration, mut draw: F) -> usize
    where
        F: FnMut(&MarkerRef, Point, &Bitmap),
    {
        let deadline = Instant::now() + timeout;
        let mut applied = 0;
        while self.in_flight > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok((url, result)) => {
                    self.finish(&url, result, &mut draw);
                    applied += 1;
                }
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!("Gave up waiting on {} icon load(s)", self.in_flight);
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        applied + self.process_completions(draw)
    }

    fn finish<F>(&mut self, url: &str, result: MarkerResult<RgbaImage>, draw: &mut F)
    where
        F: FnMut(&MarkerRef, Point, &Bitmap),
    {
        let Some(entry) = self.entries.get_mut(url) else {
            return;
        };
        if entry.state != LoadState::Loading {
            return;
        }
        self.in_flight = self.in_flight.saturating_sub(1);

        match result {
            Ok(image) => {
                let bitmap = Arc::new(image);
                entry.state = LoadState::Ready;
                entry.bitmap = Some(bitmap.clone());
                for PendingDraw { marker, position } in entry.pending.drain(..) {
                    draw(&marker, position, &bitmap);
                }
            }
            Err(err) => {
                log::warn!("{}", err);
                entry.state = LoadState::Failed;
                entry.pending.clear();
            }
        }
    }

    /// Drops every queued draw.
    pub fn discard_pending(&mut self) {
        for entry in self.entries.values_mut() {
            entry.pending.clear();
        }
    }

    /// Drops queued draws for one marker.
    pub fn forget_marker(&mut self, id: MarkerId) {
        for entry in self.entries.values_mut() {
            entry.pending.retain(|p| p.marker.id() != id);
        }
    }

    pub fn pending_draws(&self, handle: &ImageHandle) -> usize {
        self.entries.get(&handle.0).map_or(0, |entry| entry.pending.len())
    }

    /// Loads started but not yet applied.
    pub fn loads_in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::LatLng;
    use crate::types::{Icon, Marker};
    use std::cell::RefCell;

    /// Holds replies until the test completes them.
    #[derive(Clone, Default)]
    struct ManualSource {
        replies: Rc<RefCell<Vec<LoadReply>>>,
    }

    impl ImageSource for ManualSource {
        fn fetch(&self, reply: LoadReply) {
            self.replies.borrow_mut().push(reply);
        }
    }

    fn marker(url: &str) -> MarkerRef {
        Marker::new(LatLng::new(0.0, 0.0), Icon::new(url, 4.0, 4.0))
    }

    #[test]
    fn test_concurrent_references_share_one_load() {
        let source = ManualSource::default();
        let mut cache = ImageCache::new(source.clone());
        let a = cache.get_or_load("pin.png");
        let b = cache.get_or_load("pin.png");
        assert_eq!(a, b);
        assert_eq!(source.replies.borrow().len(), 1);
        assert_eq!(cache.state(&a), Some(LoadState::Loading));
        assert_eq!(cache.loads_in_flight(), 1);
    }

    #[test]
    fn test_pending_draws_flush_in_order_after_load() {
        let source = ManualSource::default();
        let mut cache = ImageCache::new(source.clone());
        let first = marker("pin.png");
        let second = marker("pin.png");
        let handle = cache.get_or_load("pin.png");

        let mut drawn = Vec::new();
        cache.on_ready(&handle, &first, Point::new(1.0, 1.0), |m, _, _| drawn.push(m.id()));
        cache.on_ready(&handle, &second, Point::new(2.0, 2.0), |m, _, _| drawn.push(m.id()));
        assert!(drawn.is_empty());
        assert_eq!(cache.pending_draws(&handle), 2);

        let reply = source.replies.borrow_mut().pop().unwrap();
        reply.complete(Ok(RgbaImage::new(4, 4)));
        let applied = cache.process_completions(|m, _, _| drawn.push(m.id()));

        assert_eq!(applied, 1);
        assert_eq!(drawn, vec![first.id(), second.id()]);
        assert!(cache.is_loaded(&handle));
        assert_eq!(cache.pending_draws(&handle), 0);

        // Ready entries draw synchronously
        let mut immediate = 0;
        cache.on_ready(&handle, &first, Point::new(3.0, 3.0), |_, _, _| immediate += 1);
        assert_eq!(immediate, 1);
    }

    #[test]
    fn test_requeue_updates_position_instead_of_duplicating() {
        let source = ManualSource::default();
        let mut cache = ImageCache::new(source.clone());
        let m = marker("pin.png");
        let handle = cache.get_or_load("pin.png");
        cache.on_ready(&handle, &m, Point::new(1.0, 1.0), |_, _, _| {});
        cache.on_ready(&handle, &m, Point::new(9.0, 9.0), |_, _, _| {});
        assert_eq!(cache.pending_draws(&handle), 1);

        source.replies.borrow_mut().pop().unwrap().complete(Ok(RgbaImage::new(1, 1)));
        let mut positions = Vec::new();
        cache.process_completions(|_, p, _| positions.push(p));
        assert_eq!(positions, vec![Point::new(9.0, 9.0)]);
    }

    #[test]
    fn test_failed_load_never_draws() {
        let mut cache = ImageCache::new(StaticImageSource::new());
        let m = marker("missing.png");
        let handle = cache.get_or_load("missing.png");
        let mut drawn = 0;
        cache.on_ready(&handle, &m, Point::default(), |_, _, _| drawn += 1);
        cache.process_completions(|_, _, _| drawn += 1);

        assert_eq!(cache.state(&handle), Some(LoadState::Failed));
        assert!(!cache.is_loaded(&handle));
        cache.on_ready(&handle, &m, Point::default(), |_, _, _| drawn += 1);
        assert_eq!(drawn, 0);
        assert_eq!(cache.loads_in_flight(), 0);
    }

    #[test]
    fn test_discard_and_forget_pending() {
        let source = ManualSource::default();
        let mut cache = ImageCache::new(source);
        let a = marker("pin.png");
        let b = marker("pin.png");
        let handle = cache.get_or_load("pin.png");
        cache.on_ready(&handle, &a, Point::default(), |_, _, _| {});
        cache.on_ready(&handle, &b, Point::default(), |_, _, _| {});
        cache.forget_marker(a.id());
        assert_eq!(cache.pending_draws(&handle), 1);
        cache.discard_pending();
        assert_eq!(cache.pending_draws(&handle), 0);
    }

    #[test]
    fn test_static_source_loads_known_urls() {
        let source = StaticImageSource::new().with_image("dot.png", RgbaImage::new(2, 3));
        let mut cache = ImageCache::new(source);
        let handle = cache.get_or_load("dot.png");
        cache.process_completions(|_, _, _| {});
        let bitmap = cache.bitmap(&handle).unwrap();
        assert_eq!(bitmap.dimensions(), (2, 3));
    }
}
