//! Request/reply pairing over a [`HostSession`].
//!
//! A request is one DDM command, optionally followed by a data object (a
//! record buffer) in a second frame chained to it with the same correlator.
//! The reply is a run of frames with the request's correlation ID that ends
//! at the first frame without the chain bit. [`ReplyChain`] yields those
//! frames lazily so callers can stop reading as soon as they have what they
//! need.

use crate::code_points;
use crate::correlation::CorrelationIds;
use crate::ddm::{parse_ddm_list, DdmObject};
use crate::dss::DssSegment;
use crate::error::{RlaError, RlaResult};
use crate::session::HostSession;

/// An outbound request: a command and an optional chained data object.
#[derive(Debug, Clone)]
pub struct Request {
    pub command: DdmObject,
    pub data: Option<DdmObject>,
}

impl Request {
    pub fn new(command: DdmObject) -> Self {
        Self {
            command,
            data: None,
        }
    }

    /// Chain a data object to the command.
    pub fn with_data(mut self, data: DdmObject) -> Self {
        self.data = Some(data);
        self
    }

    /// Frame this request under `correlation_id`.
    pub fn frames(&self, correlation_id: u16, allow_extended: bool) -> RlaResult<Vec<DssSegment>> {
        let command = DssSegment::new_request(correlation_id, self.command.serialize(false)?);
        match &self.data {
            None => Ok(vec![command]),
            Some(data) => Ok(vec![
                command.chained_same_correlator(),
                DssSegment::new_object(correlation_id, data.serialize(allow_extended)?),
            ]),
        }
    }
}

/// Send `request` with a fresh correlation ID and return its reply chain.
///
/// A dropped session is disconnected before `ConnectionDropped` is returned;
/// nothing is retried.
pub fn exchange<'a>(
    session: &'a mut dyn HostSession,
    ids: &CorrelationIds,
    request: &Request,
    allow_extended: bool,
) -> RlaResult<ReplyChain<'a>> {
    if !session.is_connected() {
        return Err(RlaError::ConnectionDropped);
    }
    let correlation_id = ids.next();
    let frames = request.frames(correlation_id, allow_extended)?;
    tracing::debug!(
        command = code_points::name(request.command.code_point),
        correlation_id,
        frames = frames.len(),
        "sending request"
    );
    if let Err(e) = session.send(&frames) {
        return Err(dropped(session, e));
    }
    Ok(ReplyChain {
        session,
        correlation_id,
        done: false,
    })
}

fn dropped(session: &mut dyn HostSession, e: RlaError) -> RlaError {
    if matches!(e, RlaError::ConnectionDropped) {
        tracing::error!("connection to the host dropped mid-exchange");
        session.disconnect();
    }
    e
}

/// The frames answering one request, read on demand.
pub struct ReplyChain<'a> {
    session: &'a mut dyn HostSession,
    correlation_id: u16,
    done: bool,
}

impl ReplyChain<'_> {
    /// Correlation ID the replies must carry.
    pub fn correlation_id(&self) -> u16 {
        self.correlation_id
    }

    /// Read the remaining frames and split their payloads into DDM objects,
    /// in receipt order.
    ///
    /// A frame that does not parse still has the rest of its chain read off
    /// the session, so the next request sees its own replies. The error is
    /// reported as an unexpected reply.
    pub fn objects(self) -> RlaResult<Vec<DdmObject>> {
        let correlation_id = self.correlation_id;
        let mut objects = Vec::new();
        let mut malformed = None;
        for frame in self {
            let frame = frame?;
            if malformed.is_some() {
                continue;
            }
            match parse_ddm_list(&frame.payload) {
                Ok(parsed) => objects.extend(parsed),
                Err(e) => malformed = Some(e),
            }
        }
        match malformed {
            Some(e) => {
                tracing::warn!(correlation_id, error = %e, "discarded malformed reply chain");
                Err(RlaError::UnexpectedReply(format!(
                    "reply to request {} is malformed: {}",
                    correlation_id, e
                )))
            }
            None => Ok(objects),
        }
    }
}

impl Iterator for ReplyChain<'_> {
    type Item = RlaResult<DssSegment>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let frame = match self.session.receive() {
            Ok(frame) => frame,
            Err(e) => {
                self.done = true;
                return Some(Err(dropped(self.session, e)));
            }
        };
        tracing::trace!(
            correlation_id = frame.correlation_id,
            chained = frame.chained,
            len = frame.payload.len(),
            "received frame"
        );
        if frame.correlation_id != self.correlation_id {
            self.done = true;
            return Some(Err(RlaError::UnexpectedReply(format!(
                "correlation ID {} does not match request {}",
                frame.correlation_id, self.correlation_id
            ))));
        }
        if !frame.chained {
            self.done = true;
        }
        Some(Ok(frame))
    }
}
