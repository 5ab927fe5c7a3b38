//! Physical link boundary.
//!
//! The serial (or network) driver itself lives outside this crate; the
//! gateway only requires something that delivers and accepts raw byte
//! chunks. The session owns the reader half exclusively in its receive task
//! and the writer half behind its send lock, so implementations need no
//! internal synchronization.

use bytes::Bytes;

/// Read half of a physical link.
#[async_trait::async_trait]
pub trait LinkReader: Send + 'static {
    /// Receive the next chunk of raw bytes. Chunks carry no framing
    /// guarantees; a chunk may hold a partial frame or several frames.
    ///
    /// Returns an empty chunk when the peer closed the link cleanly.
    async fn recv(&mut self) -> std::io::Result<Bytes>;
}

/// Write half of a physical link.
#[async_trait::async_trait]
pub trait LinkWriter: Send + 'static {
    /// Transmit one encoded frame.
    async fn send(&mut self, frame: &[u8]) -> std::io::Result<()>;
}

/// One physical link to a vehicle.
pub trait Link: Send + 'static {
    /// Stable identity of the underlying device (e.g. a serial port path).
    /// The fleet registry uses this to serialize attach/detach per link.
    fn identity(&self) -> String;

    /// Split into independently owned read and write halves.
    fn split(self: Box<Self>) -> (Box<dyn LinkReader>, Box<dyn LinkWriter>);
}

/// Enumerates candidate links for discovery.
///
/// Implementations report every currently reachable link; the fleet
/// registry filters out links it already owns.
#[async_trait::async_trait]
pub trait LinkScanner: Send + Sync + 'static {
    async fn scan(&self) -> Vec<Box<dyn Link>>;
}

#[async_trait::async_trait]
impl<T: LinkScanner + ?Sized> LinkScanner for std::sync::Arc<T> {
    async fn scan(&self) -> Vec<Box<dyn Link>> {
        (**self).scan().await
    }
}
