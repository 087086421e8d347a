//! Host server session used by the remote strategy.
//!
//! Connection establishment and sign-on happen elsewhere; the strategy only
//! needs to push request frames and pull reply frames over an existing
//! conversation.

use std::io::{Read, Write};

use crate::dss::{read_dss, write_dss_chain, DssSegment};
use crate::error::{RlaError, RlaResult};

/// A conversation with the host DDM server job.
pub trait HostSession: Send {
    /// Send a group of request frames as one logical transmission.
    fn send(&mut self, frames: &[DssSegment]) -> RlaResult<()>;

    /// Receive the next reply frame.
    fn receive(&mut self) -> RlaResult<DssSegment>;

    /// Whether the conversation is still usable.
    fn is_connected(&self) -> bool;

    /// Tear the conversation down. Idempotent.
    fn disconnect(&mut self);
}

/// [`HostSession`] over any blocking byte stream, e.g. a `TcpStream`.
pub struct StreamSession<S> {
    stream: Option<S>,
}

impl<S: Read + Write + Send> StreamSession<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    /// Give the stream back, if still connected.
    pub fn into_inner(self) -> Option<S> {
        self.stream
    }

    fn stream(&mut self) -> RlaResult<&mut S> {
        self.stream.as_mut().ok_or(RlaError::ConnectionDropped)
    }
}

impl<S: Read + Write + Send> HostSession for StreamSession<S> {
    fn send(&mut self, frames: &[DssSegment]) -> RlaResult<()> {
        let result = write_dss_chain(self.stream()?, frames);
        if let Err(RlaError::Io(ref e)) = result {
            if is_disconnect(e.kind()) {
                self.disconnect();
                return Err(RlaError::ConnectionDropped);
            }
        }
        result
    }

    fn receive(&mut self) -> RlaResult<DssSegment> {
        match read_dss(self.stream()?) {
            Err(RlaError::ConnectionDropped) => {
                self.disconnect();
                Err(RlaError::ConnectionDropped)
            }
            Err(RlaError::Io(e)) if is_disconnect(e.kind()) => {
                self.disconnect();
                Err(RlaError::ConnectionDropped)
            }
            other => other,
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("host session closed");
        }
    }
}

fn is_disconnect(kind: std::io::ErrorKind) -> bool {
    use std::io::ErrorKind::*;
    matches!(
        kind,
        BrokenPipe | ConnectionReset | ConnectionAborted | NotConnected | UnexpectedEof
    )
}
