use bytes::{Bytes, BytesMut};

use crate::encoding::{put_buffer, put_headers, put_string, put_uint16, Cursor, Headers};
use crate::error::CodecError;

/// Status used when a handler does not set one.
pub const DEFAULT_STATUS: u16 = 200;

/// Content type used when a handler does not set one.
pub const DEFAULT_CONTENT_TYPE: &str = "text/html";

/// A message with a fixed binary struct layout.
///
/// Implemented by [`Request`] and [`Response`] so that framing, reassembly
/// and the async reader/writer work for either direction.
pub trait WireMessage: Sized {
    /// Append the encoded struct to `dst` (no length prefix).
    fn encode(&self, dst: &mut BytesMut);

    /// Decode exactly one struct from `src`.
    fn decode(src: &[u8]) -> Result<Self, CodecError>;

    /// Correlation id carried by the message.
    fn id(&self) -> &str;
}

/// A request sent from the client side to the router.
///
/// Wire layout: `id: string, body: buffer, url: string, method: string`.
/// `headers` stays in-process; a decoded request always has none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub id: String,
    pub method: String,
    pub url: String,
    pub body: Bytes,
    pub headers: Headers,
}

impl Request {
    /// Create a request with an empty header map.
    pub fn new(
        id: impl Into<String>,
        method: impl Into<String>,
        url: impl Into<String>,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            url: url.into(),
            body: body.into(),
            headers: Headers::new(),
        }
    }

    /// Attach in-process headers.
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Path portion of the url (everything before the first `?`).
    pub fn path(&self) -> &str {
        self.url.split_once('?').map_or(self.url.as_str(), |(path, _)| path)
    }

    /// Raw query string, if the url carries one.
    pub fn query_string(&self) -> Option<&str> {
        self.url.split_once('?').map(|(_, query)| query)
    }
}

impl WireMessage for Request {
    fn encode(&self, dst: &mut BytesMut) {
        put_string(dst, &self.id);
        put_buffer(dst, &self.body);
        put_string(dst, &self.url);
        put_string(dst, &self.method);
    }

    fn decode(src: &[u8]) -> Result<Self, CodecError> {
        let mut cursor = Cursor::new(src);
        let id = cursor.string("id")?;
        let body = cursor.buffer("body")?;
        let url = cursor.string("url")?;
        let method = cursor.string("method")?;
        cursor.finish()?;
        Ok(Self {
            id,
            method,
            url,
            body,
            headers: Headers::new(),
        })
    }

    fn id(&self) -> &str {
        &self.id
    }
}

/// A response sent from the router back to the client side.
///
/// Wire layout: `id: string, body: buffer, headers: json, status: uint16`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub id: String,
    pub body: Bytes,
    pub headers: Headers,
    pub status: u16,
}

impl Response {
    /// A 200 response with `Content-Type: text/html` and an empty body.
    pub fn new(id: impl Into<String>) -> Self {
        let mut headers = Headers::new();
        headers.insert("Content-Type".to_string(), DEFAULT_CONTENT_TYPE.to_string());
        Self {
            id: id.into(),
            body: Bytes::new(),
            headers,
            status: DEFAULT_STATUS,
        }
    }

    /// A `text/plain` response with a fixed status and body.
    pub fn plain(id: impl Into<String>, status: u16, body: &'static str) -> Self {
        let mut headers = Headers::new();
        headers.insert("Content-Type".to_string(), "text/plain".to_string());
        Self {
            id: id.into(),
            body: Bytes::from_static(body.as_bytes()),
            headers,
            status,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

impl WireMessage for Response {
    fn encode(&self, dst: &mut BytesMut) {
        put_string(dst, &self.id);
        put_buffer(dst, &self.body);
        put_headers(dst, &self.headers);
        put_uint16(dst, self.status);
    }

    fn decode(src: &[u8]) -> Result<Self, CodecError> {
        let mut cursor = Cursor::new(src);
        let id = cursor.string("id")?;
        let body = cursor.buffer("body")?;
        let headers = cursor.headers("headers")?;
        let status = cursor.uint16("status")?;
        cursor.finish()?;
        Ok(Self {
            id,
            body,
            headers,
            status,
        })
    }

    fn id(&self) -> &str {
        &self.id
    }
}

fn encode_to_bytes<M: WireMessage>(msg: &M) -> Bytes {
    let mut dst = BytesMut::new();
    msg.encode(&mut dst);
    dst.freeze()
}

/// Encode a request struct (no length prefix).
pub fn encode_request(request: &Request) -> Bytes {
    encode_to_bytes(request)
}

/// Decode a request struct from one complete frame payload.
pub fn decode_request(src: &[u8]) -> Result<Request, CodecError> {
    Request::decode(src)
}

/// Encode a response struct (no length prefix).
pub fn encode_response(response: &Response) -> Bytes {
    encode_to_bytes(response)
}

/// Decode a response struct from one complete frame payload.
pub fn decode_response(src: &[u8]) -> Result<Response, CodecError> {
    Response::decode(src)
}
