//! The per-connection request/response engine.
//!
//! A [`Messenger`] owns one transport. Writes from any number of logical
//! callers are serialized through a single send path; a dedicated background
//! task drains the read half and completes pending requests by correlation
//! id, so responses may arrive in any order relative to requests.

use std::{
    collections::HashMap,
    io::Cursor,
    ops::DerefMut,
    sync::{
        Arc,
        atomic::{AtomicI32, Ordering},
    },
};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt, WriteHalf},
    sync::{
        Mutex as AsyncMutex,
        oneshot::{Sender, channel},
    },
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::protocol::{
    api_key::ApiKey,
    api_version::{ApiVersion, ApiVersionRange},
    error::Error as ApiError,
    frame::{AsyncMessageRead, AsyncMessageWrite},
    messages::{
        ApiVersionsRequest, ReadVersionedError, ReadVersionedType, RequestBody, RequestHeader,
        ResponseHeader, WriteVersionedError, WriteVersionedType,
    },
    primitives::{Int16, Int32, NullableString},
};

/// All supported APIs encode with a pre-flexible request header (version 1)
/// and response header (version 0).
const REQUEST_HEADER_VERSION: ApiVersion = ApiVersion(Int16(1));
const RESPONSE_HEADER_VERSION: ApiVersion = ApiVersion(Int16(0));

struct Response {
    #[allow(dead_code)]
    header: ResponseHeader,
    data: Cursor<Vec<u8>>,
}

struct ActiveRequest {
    channel: Sender<Result<Response, Arc<RequestError>>>,
}

enum MessengerState {
    /// Currently active requests by correlation id.
    ///
    /// An active request is only registered here if the channel driving it is
    /// still waiting for the response.
    RequestMap(HashMap<i32, ActiveRequest>),

    /// One-way "dead end" state: a transport-level error occurred and the
    /// connection can no longer be used. All pending and future requests
    /// fail with the stored error.
    Poison(Arc<RequestError>),
}

impl MessengerState {
    /// Poison the connection, failing every pending request.
    fn poison(&mut self, err: RequestError) -> Arc<RequestError> {
        match self {
            Self::RequestMap(map) => {
                let err = Arc::new(err);
                warn!(%err, "poisoning connection");

                for (_, active_request) in map.drain() {
                    // it's OK if the other side is gone
                    active_request
                        .channel
                        .send(Err(Arc::clone(&err)))
                        .ok();
                }

                *self = Self::Poison(Arc::clone(&err));
                err
            }
            Self::Poison(e) => Arc::clone(e),
        }
    }
}

/// A connection to a single broker.
///
/// Note: This is a low-level connection that does not handle reconnects or
/// topology changes; that is the domain of a connection pool.
pub struct Messenger<RW> {
    /// Write half of the stream.
    ///
    /// An async mutex because the lock is held across write+flush.
    stream_write: AsyncMutex<WriteHalf<RW>>,

    /// Client ID attached to every request header.
    client_id: Arc<str>,

    /// Upper size limit for incoming frames.
    max_message_size: usize,

    /// Next correlation id; unique per in-flight request on this connection.
    correlation_id: AtomicI32,

    /// Version ranges negotiated via [`Messenger::sync_versions`].
    ///
    /// Written once after connect, then read-only for the lifetime of this
    /// connection.
    version_ranges: RwLock<HashMap<ApiKey, ApiVersionRange>>,

    state: Arc<Mutex<MessengerState>>,

    join_handle: JoinHandle<()>,
}

impl<RW> std::fmt::Debug for Messenger<RW> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messenger")
            .field("client_id", &self.client_id)
            .field("max_message_size", &self.max_message_size)
            .finish_non_exhaustive()
    }
}

#[derive(Error, Debug)]
pub enum RequestError {
    #[error("Cannot find a mutually supported version for {api_key:?}")]
    NoVersionMatch { api_key: ApiKey },

    #[error("Cannot encode request: {0}")]
    WriteError(#[from] WriteVersionedError),

    #[error("Cannot write framed message: {0}")]
    WriteMessageError(#[from] crate::protocol::frame::WriteError),

    #[error("Cannot read framed message: {0}")]
    ReadMessageError(#[from] crate::protocol::frame::ReadError),

    #[error("Malformed response: {0}")]
    ReadError(#[from] ReadVersionedError),

    #[error("Response has {size} trailing bytes after message body")]
    TooMuchData { size: u64 },

    #[error("Cannot read/write data: {0}")]
    IO(#[from] std::io::Error),

    #[error("Connection is poisoned: {0}")]
    Poisoned(Arc<RequestError>),
}

impl RequestError {
    /// Is this a transport-level failure (as opposed to a protocol or usage
    /// error)?
    ///
    /// Transport failures fail all pending requests on the connection; a
    /// pool should drop the connection and hand out a fresh one.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            Self::Poisoned(_) | Self::IO(_) | Self::WriteMessageError(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum SyncVersionsError {
    #[error("Request error during version sync: {0}")]
    RequestError(#[from] RequestError),

    #[error("Broker error during version sync: {0}")]
    Broker(ApiError),

    #[error("Got flipped version range from broker for {api_key:?}: {min}..{max}")]
    FlippedVersionRange {
        api_key: ApiKey,
        min: ApiVersion,
        max: ApiVersion,
    },

    #[error("Did not find a working ApiVersions version")]
    NoWorkingVersion,
}

impl<RW> Messenger<RW>
where
    RW: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: RW, max_message_size: usize, client_id: Arc<str>) -> Self {
        let (stream_read, stream_write) = tokio::io::split(stream);
        let state = Arc::new(Mutex::new(MessengerState::RequestMap(HashMap::new())));
        let state_captured = Arc::clone(&state);

        let join_handle = tokio::spawn(async move {
            let mut stream_read = stream_read;

            loop {
                match stream_read.read_message(max_message_size).await {
                    Ok(msg) => {
                        let mut cursor = Cursor::new(msg);
                        let header = match ResponseHeader::read_versioned(
                            &mut cursor,
                            RESPONSE_HEADER_VERSION,
                        ) {
                            Ok(header) => header,
                            Err(e) => {
                                state_captured.lock().poison(RequestError::ReadError(e));
                                break;
                            }
                        };

                        let mut state = state_captured.lock();
                        match state.deref_mut() {
                            MessengerState::RequestMap(map) => {
                                match map.remove(&header.correlation_id.0) {
                                    Some(active_request) => {
                                        // it's OK if the caller is gone
                                        // (e.g. cancelled by a timeout)
                                        active_request
                                            .channel
                                            .send(Ok(Response {
                                                header,
                                                data: cursor,
                                            }))
                                            .ok();
                                    }
                                    None => {
                                        // likely a late response for a caller
                                        // that timed out; drop it
                                        debug!(
                                            correlation_id = header.correlation_id.0,
                                            "dropping response w/o matching request"
                                        );
                                    }
                                }
                            }
                            MessengerState::Poison(_) => break,
                        }
                    }
                    Err(e) => {
                        state_captured
                            .lock()
                            .poison(RequestError::ReadMessageError(e));
                        break;
                    }
                }
            }
        });

        Self {
            stream_write: AsyncMutex::new(stream_write),
            client_id,
            max_message_size,
            correlation_id: AtomicI32::new(0),
            version_ranges: RwLock::new(HashMap::new()),
            state,
            join_handle,
        }
    }

    /// Install the negotiated per-API version table.
    pub(crate) fn set_version_ranges(&self, ranges: HashMap<ApiKey, ApiVersionRange>) {
        *self.version_ranges.write() = ranges;
    }

    /// The negotiated per-API version ranges the broker reported.
    pub fn version_ranges(&self) -> HashMap<ApiKey, ApiVersionRange> {
        self.version_ranges.read().clone()
    }

    fn version_for<R>(&self) -> Result<ApiVersion, RequestError>
    where
        R: RequestBody,
    {
        self.version_ranges
            .read()
            .get(&R::API_KEY)
            .and_then(|server_range| server_range.intersect_max(&R::API_VERSION_RANGE))
            .ok_or(RequestError::NoVersionMatch {
                api_key: R::API_KEY,
            })
    }

    /// Issue a request and await its response.
    ///
    /// Callers suspend only on their own correlation id; unrelated in-flight
    /// requests proceed independently.
    pub async fn request<R>(&self, msg: R) -> Result<R::ResponseBody, RequestError>
    where
        R: RequestBody + Send + WriteVersionedType<Vec<u8>>,
        R::ResponseBody: ReadVersionedType<Cursor<Vec<u8>>>,
    {
        let version = self.version_for::<R>()?;
        self.request_with_version(msg, version).await
    }

    async fn request_with_version<R>(
        &self,
        msg: R,
        version: ApiVersion,
    ) -> Result<R::ResponseBody, RequestError>
    where
        R: RequestBody + Send + WriteVersionedType<Vec<u8>>,
        R::ResponseBody: ReadVersionedType<Cursor<Vec<u8>>>,
    {
        let correlation_id = self.correlation_id.fetch_add(1, Ordering::SeqCst);
        let buf = self.encode_request(&msg, version, correlation_id)?;

        let (tx, rx) = channel();

        // Register the waiter before the bytes hit the wire, otherwise a fast
        // response could race the bookkeeping.
        {
            let mut state = self.state.lock();
            match state.deref_mut() {
                MessengerState::RequestMap(map) => {
                    map.insert(correlation_id, ActiveRequest { channel: tx });
                }
                MessengerState::Poison(e) => {
                    return Err(RequestError::Poisoned(Arc::clone(e)));
                }
            }
        }

        if let Err(e) = self.send_message(&buf).await {
            // A failed write may have left a partial frame on the wire; the
            // stream framing is gone, so the connection is done.
            let e = self.state.lock().poison(e);
            return Err(RequestError::Poisoned(e));
        }

        match rx.await {
            Ok(Ok(mut response)) => {
                let body = R::ResponseBody::read_versioned(&mut response.data, version)?;

                // A partially consumed response means the broker spoke a
                // different version than negotiated.
                let read = response.data.position();
                let total = response.data.into_inner().len() as u64;
                if read != total {
                    return Err(RequestError::TooMuchData { size: total - read });
                }

                Ok(body)
            }
            Ok(Err(e)) => Err(RequestError::Poisoned(e)),
            Err(_) => Err(RequestError::IO(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "reader task terminated",
            ))),
        }
    }

    /// Write a request without registering a response waiter.
    ///
    /// Used for produce requests with acks=0, to which the broker never
    /// responds. Returns once the frame is flushed.
    pub async fn send_unacknowledged<R>(&self, msg: R) -> Result<(), RequestError>
    where
        R: RequestBody + Send + WriteVersionedType<Vec<u8>>,
    {
        let version = self.version_for::<R>()?;
        let correlation_id = self.correlation_id.fetch_add(1, Ordering::SeqCst);
        let buf = self.encode_request(&msg, version, correlation_id)?;

        if let MessengerState::Poison(e) = self.state.lock().deref_mut() {
            return Err(RequestError::Poisoned(Arc::clone(e)));
        }

        if let Err(e) = self.send_message(&buf).await {
            let e = self.state.lock().poison(e);
            return Err(RequestError::Poisoned(e));
        }

        Ok(())
    }

    fn encode_request<R>(
        &self,
        msg: &R,
        version: ApiVersion,
        correlation_id: i32,
    ) -> Result<Vec<u8>, RequestError>
    where
        R: RequestBody + Send + WriteVersionedType<Vec<u8>>,
    {
        let header = RequestHeader {
            request_api_key: R::API_KEY,
            request_api_version: version,
            correlation_id: Int32(correlation_id),
            client_id: NullableString(Some(self.client_id.to_string())),
        };

        let mut buf = Vec::new();
        header.write_versioned(&mut buf, REQUEST_HEADER_VERSION)?;
        msg.write_versioned(&mut buf, version)?;
        Ok(buf)
    }

    async fn send_message(&self, buf: &[u8]) -> Result<(), RequestError> {
        let mut stream_write = self.stream_write.lock().await;
        stream_write.write_message(buf).await?;
        stream_write.flush().await?;
        Ok(())
    }

    /// Negotiate API versions with the broker.
    ///
    /// Starts at the highest ApiVersions version this client speaks and
    /// downgrades while the broker rejects it, either explicitly
    /// (`UnsupportedVersion`) or by answering with an older encoding that
    /// fails to decode.
    pub async fn sync_versions(&self) -> Result<(), SyncVersionsError> {
        let supported = ApiVersionsRequest::API_VERSION_RANGE;

        for upper_bound in (supported.min().0.0..=supported.max().0.0).rev() {
            let version = ApiVersion(Int16(upper_bound));

            match self
                .request_with_version(&ApiVersionsRequest::default(), version)
                .await
            {
                Ok(response) => {
                    match response.error_code {
                        None => {}
                        Some(ApiError::UnsupportedVersion) if upper_bound > 0 => {
                            debug!(%version, "broker rejected ApiVersions version, downgrading");
                            continue;
                        }
                        Some(e) => return Err(SyncVersionsError::Broker(e)),
                    }

                    let mut ranges = HashMap::with_capacity(response.api_keys.len());
                    for api_key in response.api_keys {
                        if matches!(api_key.api_key, ApiKey::Unknown(_)) {
                            continue;
                        }
                        if api_key.min_version > api_key.max_version {
                            return Err(SyncVersionsError::FlippedVersionRange {
                                api_key: api_key.api_key,
                                min: api_key.min_version,
                                max: api_key.max_version,
                            });
                        }
                        ranges.insert(
                            api_key.api_key,
                            ApiVersionRange::new(api_key.min_version, api_key.max_version),
                        );
                    }

                    debug!(?ranges, "negotiated API versions");
                    self.set_version_ranges(ranges);
                    return Ok(());
                }
                Err(
                    RequestError::ReadError(_)
                    | RequestError::ReadMessageError(_)
                    | RequestError::TooMuchData { .. },
                ) if upper_bound > 0 => {
                    // older brokers answer with an encoding we did not ask
                    // for; try again assuming less
                    debug!(%version, "cannot decode ApiVersions response, downgrading");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(SyncVersionsError::NoWorkingVersion)
    }
}

impl<RW> Drop for Messenger<RW> {
    fn drop(&mut self) {
        self.join_handle.abort();
    }
}
