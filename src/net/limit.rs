//! Per-worker cap on connections served at once.
//!
//! Every accepted connection takes a slot before it is handed to the inner
//! acceptor and keeps it until the stream is dropped. Once all slots are
//! taken, newly accepted connections wait in their own task for one to free
//! up; the accept loop itself never stalls.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum_server::accept::Accept;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Acceptor that limits how many connections are open past it.
#[derive(Debug, Clone)]
pub struct ConnectionLimitAcceptor<A> {
    inner: A,
    slots: Arc<Semaphore>,
}

impl<A> ConnectionLimitAcceptor<A> {
    pub fn new(limit: usize, inner: A) -> Self {
        Self {
            inner,
            slots: Arc::new(Semaphore::new(limit.min(Semaphore::MAX_PERMITS))),
        }
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }
}

impl<A, I, S> Accept<I, S> for ConnectionLimitAcceptor<A>
where
    A: Accept<I, S> + Clone + Send + Sync + 'static,
    A::Stream: Send,
    A::Service: Send,
    A::Future: Send,
    I: Send + 'static,
    S: Send + 'static,
{
    type Stream = LimitedStream<A::Stream>;
    type Service = A::Service;
    type Future = Pin<Box<dyn Future<Output = io::Result<(Self::Stream, Self::Service)>> + Send>>;

    fn accept(&self, stream: I, service: S) -> Self::Future {
        let inner = self.inner.clone();
        let slots = Arc::clone(&self.slots);

        Box::pin(async move {
            let permit = slots
                .acquire_owned()
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "connection slots closed"))?;
            let (stream, service) = inner.accept(stream, service).await?;
            Ok((
                LimitedStream {
                    inner: stream,
                    _permit: permit,
                },
                service,
            ))
        })
    }
}

/// Stream holding a connection slot for as long as it lives.
#[derive(Debug)]
pub struct LimitedStream<I> {
    inner: I,
    _permit: OwnedSemaphorePermit,
}

impl<I> LimitedStream<I> {
    pub fn get_ref(&self) -> &I {
        &self.inner
    }
}

impl<I: AsyncRead + Unpin> AsyncRead for LimitedStream<I> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl<I: AsyncWrite + Unpin> AsyncWrite for LimitedStream<I> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
