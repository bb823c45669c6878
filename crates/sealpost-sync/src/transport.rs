//! Remote sync transport abstraction.
//!
//! The transport moves a keyring's sync payload to and from wherever it is
//! kept remotely. Implementations may proxy through a provider page, talk
//! HTTP, or keep everything in memory.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, SyncError};
use crate::messages::{DownloadReply, DownloadRequest, UploadReply, UploadRequest};

/// Download/upload of the remote payload.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait RemoteSyncTransport: Send + Sync {
    /// Fetch the remote payload unless it is at `request.version`.
    async fn download(&self, request: DownloadRequest) -> Result<DownloadReply>;

    /// Replace the remote payload. Fails with [`SyncError::Conflict`] if the
    /// remote moved past `request.version`.
    async fn upload(&self, request: UploadRequest) -> Result<UploadReply>;
}

/// Await `fut`, failing with [`SyncError::Timeout`] after `timeout`.
pub async fn with_timeout<T>(
    timeout: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| SyncError::Timeout(timeout))?
}

/// A simple in-memory remote for testing.
///
/// Enforces optimistic concurrency on the version tag like a real backend.
pub mod memory {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RemoteState {
        counter: u64,
        version: Option<String>,
        payload: Option<String>,
    }

    /// In-memory remote implementation.
    #[derive(Default)]
    pub struct MemoryRemote {
        state: Mutex<RemoteState>,
        latency: Mutex<Option<Duration>>,
        downloads: AtomicUsize,
        uploads: AtomicUsize,
    }

    impl MemoryRemote {
        /// Create an empty remote.
        pub fn new() -> Self {
            Self::default()
        }

        /// Delay every request by `latency`.
        pub fn set_latency(&self, latency: Option<Duration>) {
            if let Ok(mut l) = self.latency.lock() {
                *l = latency;
            }
        }

        /// Current version tag.
        pub fn version(&self) -> Option<String> {
            self.state.lock().ok().and_then(|s| s.version.clone())
        }

        /// Current payload.
        pub fn payload(&self) -> Option<String> {
            self.state.lock().ok().and_then(|s| s.payload.clone())
        }

        /// Accepted uploads so far.
        pub fn upload_count(&self) -> usize {
            self.uploads.load(Ordering::SeqCst)
        }

        /// Downloads served so far.
        pub fn download_count(&self) -> usize {
            self.downloads.load(Ordering::SeqCst)
        }

        /// Store a payload as if another client had uploaded it.
        pub fn overwrite(&self, payload: String) -> String {
            let mut state = match self.state.lock() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            Self::commit(&mut state, payload)
        }

        fn commit(state: &mut RemoteState, payload: String) -> String {
            state.counter += 1;
            let version = format!("v{}", state.counter);
            state.version = Some(version.clone());
            state.payload = Some(payload);
            version
        }

        async fn delay(&self) {
            let latency = self.latency.lock().ok().and_then(|l| *l);
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
        }

        fn state(&self) -> Result<std::sync::MutexGuard<'_, RemoteState>> {
            self.state
                .lock()
                .map_err(|_| SyncError::Transport("remote state poisoned".into()))
        }
    }

    #[async_trait]
    impl RemoteSyncTransport for MemoryRemote {
        async fn download(&self, request: DownloadRequest) -> Result<DownloadReply> {
            self.delay().await;
            let state = self.state()?;
            self.downloads.fetch_add(1, Ordering::SeqCst);
            let payload = if request.version == state.version {
                None
            } else {
                state.payload.clone()
            };
            Ok(DownloadReply {
                payload,
                version: state.version.clone(),
            })
        }

        async fn upload(&self, request: UploadRequest) -> Result<UploadReply> {
            self.delay().await;
            let mut state = self.state()?;
            if request.version != state.version {
                return Err(SyncError::Conflict {
                    sent: request.version,
                    remote: state.version.clone(),
                });
            }
            let version = Self::commit(&mut state, request.payload);
            self.uploads.fetch_add(1, Ordering::SeqCst);
            Ok(UploadReply { version })
        }
    }

}
