//! Image I/O collaborator: request protocol, client handle, and service.
//!
//! The engine never touches image files directly. It talks to an I/O
//! service through [`IoHandle`], which sends [`IoRequest`] messages over a
//! channel:
//!
//! - `Load`: filename in, `width * height` bytes out (row-major, `255`
//!   alive, `0` dead).
//! - `Save`: filename and `width * height` bytes in, nothing out.
//! - `CheckIdle`: answered with `true` once every earlier request has been
//!   handled.
//!
//! The service processes requests strictly in order on a dedicated blocking
//! thread, delegating storage to an [`ImageStore`] backend.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Errors produced by the image I/O collaborator.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// The service is no longer accepting requests.
    #[error("image I/O service stopped")]
    ServiceStopped,

    /// No image exists under the requested name.
    #[error("image not found: {name}")]
    NotFound {
        /// The requested image name.
        name: String,
    },

    /// Reading the image from the backend failed.
    #[error("failed to read image {name}: {source}")]
    Read {
        /// The requested image name.
        name: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Writing the image to the backend failed.
    #[error("failed to write image {name}: {source}")]
    Write {
        /// The image name being written.
        name: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The stored image is not in the expected format.
    #[error("malformed image {name}: {reason}")]
    Format {
        /// The image name.
        name: String,
        /// What was wrong with it.
        reason: String,
    },
}

/// Storage backend behind the I/O service.
///
/// Implementations are driven from a single blocking thread, so they may
/// perform synchronous file I/O.
pub trait ImageStore: Send + 'static {
    /// Load the image stored under `name`, expected to be
    /// `width * height` cells.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`] if the image is missing or unreadable.
    fn load(&mut self, name: &str, width: usize, height: usize) -> Result<Vec<u8>, IoError>;

    /// Store `bytes` (`width * height` cells) under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`] if the image cannot be written.
    fn save(&mut self, name: &str, width: usize, height: usize, bytes: &[u8]) -> Result<(), IoError>;
}

/// In-memory image store. Clones share the same images.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    images: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Put an image into the store.
    pub fn insert(&self, name: impl Into<String>, bytes: Vec<u8>) {
        self.images
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), bytes);
    }

    /// Fetch a copy of a stored image.
    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.images
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Names of all stored images, sorted.
    pub fn names(&self) -> Vec<String> {
        self.images
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl ImageStore for MemoryStore {
    fn load(&mut self, name: &str, _width: usize, _height: usize) -> Result<Vec<u8>, IoError> {
        self.get(name).ok_or_else(|| IoError::NotFound {
            name: name.to_owned(),
        })
    }

    fn save(&mut self, name: &str, _width: usize, _height: usize, bytes: &[u8]) -> Result<(), IoError> {
        self.insert(name, bytes.to_vec());
        Ok(())
    }
}

/// A request to the image I/O service.
#[derive(Debug)]
pub enum IoRequest {
    /// Read an image and reply with its bytes.
    Load {
        /// Image name.
        filename: String,
        /// Expected width.
        width: usize,
        /// Expected height.
        height: usize,
        /// Where to send the loaded bytes.
        reply: oneshot::Sender<Result<Vec<u8>, IoError>>,
    },

    /// Write an image. Fire-and-forget; confirm with `CheckIdle`.
    Save {
        /// Image name.
        filename: String,
        /// Image width.
        width: usize,
        /// Image height.
        height: usize,
        /// Row-major cell bytes.
        bytes: Vec<u8>,
    },

    /// Ask whether all earlier requests have completed.
    CheckIdle {
        /// Where to send the answer.
        reply: oneshot::Sender<bool>,
    },
}

/// Client side of the image I/O service. Cheap to clone.
#[derive(Debug, Clone)]
pub struct IoHandle {
    tx: mpsc::Sender<IoRequest>,
}

impl IoHandle {
    /// Wrap a raw request sender, for callers that run their own service.
    pub const fn from_sender(tx: mpsc::Sender<IoRequest>) -> Self {
        Self { tx }
    }

    /// Request an image and wait for its bytes.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::ServiceStopped`] if the service is gone, or the
    /// backend's error.
    pub async fn load(&self, filename: String, width: usize, height: usize) -> Result<Vec<u8>, IoError> {
        let (reply, rx) = oneshot::channel();
        self.send(IoRequest::Load {
            filename,
            width,
            height,
            reply,
        })
        .await?;
        rx.await.map_err(|_closed| IoError::ServiceStopped)?
    }

    /// Queue an image for writing.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::ServiceStopped`] if the service is gone.
    pub async fn save(&self, filename: String, width: usize, height: usize, bytes: Vec<u8>) -> Result<(), IoError> {
        self.send(IoRequest::Save {
            filename,
            width,
            height,
            bytes,
        })
        .await
    }

    /// Ask the service whether it has finished every earlier request.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::ServiceStopped`] if the service is gone.
    pub async fn check_idle(&self) -> Result<bool, IoError> {
        let (reply, rx) = oneshot::channel();
        self.send(IoRequest::CheckIdle { reply }).await?;
        rx.await.map_err(|_closed| IoError::ServiceStopped)
    }

    /// Block until the service reports idle.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::ServiceStopped`] if the service is gone.
    pub async fn wait_idle(&self) -> Result<(), IoError> {
        while !self.check_idle().await? {
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    async fn send(&self, request: IoRequest) -> Result<(), IoError> {
        self.tx
            .send(request)
            .await
            .map_err(|_closed| IoError::ServiceStopped)
    }
}

/// Start the I/O service on a blocking thread.
///
/// The service runs until every [`IoHandle`] clone is dropped. Save
/// failures are logged and do not stop the service.
pub fn spawn_io_service<S: ImageStore>(mut store: S, capacity: usize) -> (IoHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(capacity.max(1));
    let handle = tokio::task::spawn_blocking(move || {
        info!("Image I/O service started");
        while let Some(request) = rx.blocking_recv() {
            handle_request(&mut store, request);
        }
        info!("Image I/O service stopped");
    });
    (IoHandle { tx }, handle)
}

fn handle_request<S: ImageStore>(store: &mut S, request: IoRequest) {
    match request {
        IoRequest::Load {
            filename,
            width,
            height,
            reply,
        } => {
            debug!(filename = %filename, "Loading image");
            let result = store.load(&filename, width, height);
            if reply.send(result).is_err() {
                debug!(filename = %filename, "Load requester went away");
            }
        }
        IoRequest::Save {
            filename,
            width,
            height,
            bytes,
        } => match store.save(&filename, width, height, &bytes) {
            Ok(()) => debug!(filename = %filename, "Image saved"),
            Err(e) => error!(filename = %filename, error = %e, "Failed to save image"),
        },
        IoRequest::CheckIdle { reply } => {
            // Requests are handled in order, so everything queued before
            // this one is done.
            let _ = reply.send(true);
        }
    }
}
