//! Capability interfaces implemented by stitching and completion backends.

use crate::error::{BackendError, ResolutionError};
use image::RgbaImage;
use std::sync::atomic::{AtomicU64, Ordering};

/// Combines an ordered sequence of overlapping frames into one image.
pub trait StitchingCapability: Send + Sync {
    fn name(&self) -> &'static str;

    /// Check backing assets before a job is accepted.
    fn validate(&self) -> Result<(), ResolutionError> {
        Ok(())
    }

    fn stitch(&self, frames: &[RgbaImage], blend_enabled: bool) -> Result<RgbaImage, BackendError>;
}

/// Fills the irregular border a stitch leaves behind.
///
/// Backends hold expensive native state (a loaded model, scratch buffers)
/// only between [`acquire`](Self::acquire) and the release of the returned
/// [`AlgorithmHandle`].
pub trait CompletionCapability: Send + Sync {
    fn name(&self) -> &'static str;

    /// Check backing assets before a job is accepted.
    fn validate(&self) -> Result<(), ResolutionError> {
        Ok(())
    }

    fn acquire(&self) -> Result<AlgorithmHandle, BackendError>;
}

/// Initialized backend instance behind an [`AlgorithmHandle`].
pub trait CompletionSession: Send {
    /// `Ok(None)` means the backend ran but produced no image.
    fn complete(&mut self, image: &RgbaImage) -> Result<Option<RgbaImage>, BackendError>;

    /// Free native resources. Called exactly once by the owning handle.
    fn release(&mut self) {}
}

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Exclusive ownership of an initialized completion backend.
///
/// Not `Clone`: the session is released exactly once, either through
/// [`release`](Self::release) or when the handle is dropped, including
/// during unwinding.
pub struct AlgorithmHandle {
    id: u64,
    backend: &'static str,
    session: Option<Box<dyn CompletionSession>>,
}

impl AlgorithmHandle {
    pub fn new(backend: &'static str, session: Box<dyn CompletionSession>) -> Self {
        let id = NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(id, backend, "Algorithm handle acquired");
        Self {
            id,
            backend,
            session: Some(session),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    pub fn complete(&mut self, image: &RgbaImage) -> Result<Option<RgbaImage>, BackendError> {
        match self.session.as_mut() {
            Some(session) => session.complete(image),
            None => Err(BackendError::new("handle already released")),
        }
    }

    /// Release the backend now instead of at drop.
    pub fn release(mut self) {
        self.release_session();
    }

    fn release_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.release();
            tracing::debug!(id = self.id, backend = self.backend, "Algorithm handle released");
        }
    }
}

impl Drop for AlgorithmHandle {
    fn drop(&mut self) {
        self.release_session();
    }
}

impl std::fmt::Debug for AlgorithmHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlgorithmHandle")
            .field("id", &self.id)
            .field("backend", &self.backend)
            .field("released", &self.session.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct Counted(Arc<AtomicUsize>);

    impl CompletionSession for Counted {
        fn complete(&mut self, image: &RgbaImage) -> Result<Option<RgbaImage>, BackendError> {
            Ok(Some(image.clone()))
        }

        fn release(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn explicit_release_happens_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let handle = AlgorithmHandle::new("counted", Box::new(Counted(released.clone())));
        handle.release();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_releases() {
        let released = Arc::new(AtomicUsize::new(0));
        {
            let mut handle = AlgorithmHandle::new("counted", Box::new(Counted(released.clone())));
            handle.complete(&RgbaImage::new(2, 2)).unwrap();
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handle_ids_are_unique() {
        let released = Arc::new(AtomicUsize::new(0));
        let a = AlgorithmHandle::new("counted", Box::new(Counted(released.clone())));
        let b = AlgorithmHandle::new("counted", Box::new(Counted(released.clone())));
        assert_ne!(a.id(), b.id());
    }
}
