//! Fixed request/response exchanges over a secured channel
//!
//! The client writes one request and reads one response. The server reads a
//! request and answers with the next canned response, once per response, in
//! order. Any read or write that yields zero bytes or an error aborts the
//! exchange.

use crate::{Error, Result};
use bytes::{Bytes, BytesMut};
use std::borrow::Cow;

/// Capacity of every receive buffer
pub const MAX_BUF_SIZE: usize = 1024;

/// Request sent by the client
pub const REQUEST: &[u8] = b"GET /index.html HTTP/1.1\r\nHOST: twt.com\r\n\r\n";

/// Response to the first request
pub const RESPONSE_1: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 6\r\n\r\nHello\n";

/// Response to the second request
pub const RESPONSE_2: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 6\r\n\r\nWorld\n";

/// Canned server responses, in the order they are sent
pub const RESPONSES: [&[u8]; 2] = [RESPONSE_1, RESPONSE_2];

/// Read/write operations over an established secure channel
///
/// Implementations return an error for any result that is not a positive
/// byte count.
pub trait SecureChannel {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    fn write(&mut self, buf: &[u8]) -> Result<usize>;
}

/// Bounded receive buffer
///
/// A read never hands the channel more than `capacity` bytes of space, and
/// only the bytes actually received are exposed as data or text.
#[derive(Debug)]
pub struct MessageBuffer {
    buf: BytesMut,
    capacity: usize,
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self::with_capacity(MAX_BUF_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        MessageBuffer { buf: BytesMut::with_capacity(capacity), capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Replace the contents with one read from `channel`
    pub fn read_from<C: SecureChannel + ?Sized>(&mut self, channel: &mut C) -> Result<usize> {
        self.buf.clear();
        self.buf.resize(self.capacity, 0);

        let n = channel.read(&mut self.buf[..])?;
        if n == 0 || n > self.capacity {
            self.buf.clear();
            return Err(Error::Transfer(format!("SSL_read failed ret={}", n)));
        }

        self.buf.truncate(n);
        Ok(n)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Received bytes as text, for logging
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.buf)
    }

    /// Take the received bytes, leaving the buffer empty
    pub fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

fn write_message<C: SecureChannel + ?Sized>(channel: &mut C, msg: &[u8]) -> Result<usize> {
    let n = channel.write(msg)?;
    if n == 0 {
        return Err(Error::Transfer("SSL_write failed ret=0".to_string()));
    }
    Ok(n)
}

/// Client side: write `request`, read one response
pub fn client_transaction<C: SecureChannel + ?Sized>(channel: &mut C, request: &[u8]) -> Result<Bytes> {
    write_message(channel, request)?;

    let mut buf = MessageBuffer::new();
    let n = buf.read_from(channel)?;
    tracing::trace!(bytes = n, "response received");
    Ok(buf.take())
}

/// Server side: for each response in order, read a request then send it
///
/// Returns the number of completed exchanges.
pub fn server_transaction<C: SecureChannel + ?Sized>(channel: &mut C, responses: &[&[u8]]) -> Result<usize> {
    let mut buf = MessageBuffer::new();

    for (i, response) in responses.iter().enumerate() {
        let n = buf.read_from(channel)?;
        tracing::debug!(exchange = i, bytes = n, request = %buf.text(), "SSL_read");

        let n = write_message(channel, response)?;
        tracing::debug!(exchange = i, bytes = n, "SSL_write sent response");
    }

    Ok(responses.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Debug, PartialEq, Eq)]
    enum Event {
        Read(usize),
        Write(Vec<u8>),
    }

    /// Channel fed from a queue of inbound messages; records every call
    #[derive(Default)]
    struct ScriptedChannel {
        inbound: VecDeque<Vec<u8>>,
        events: Vec<Event>,
        short_write: bool,
    }

    impl ScriptedChannel {
        fn with_inbound(messages: &[&[u8]]) -> Self {
            ScriptedChannel {
                inbound: messages.iter().map(|m| m.to_vec()).collect(),
                ..Default::default()
            }
        }
    }

    impl SecureChannel for ScriptedChannel {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            self.events.push(Event::Read(buf.len()));
            match self.inbound.pop_front() {
                Some(msg) => {
                    let n = msg.len().min(buf.len());
                    buf[..n].copy_from_slice(&msg[..n]);
                    Ok(n)
                }
                None => Ok(0),
            }
        }

        fn write(&mut self, buf: &[u8]) -> Result<usize> {
            self.events.push(Event::Write(buf.to_vec()));
            if self.short_write {
                Ok(0)
            } else {
                Ok(buf.len())
            }
        }
    }

    #[test]
    fn test_client_transaction() {
        let mut channel = ScriptedChannel::with_inbound(&[RESPONSE_1]);
        let response = client_transaction(&mut channel, REQUEST).unwrap();

        assert_eq!(&response[..], RESPONSE_1);
        assert_eq!(
            channel.events,
            vec![Event::Write(REQUEST.to_vec()), Event::Read(MAX_BUF_SIZE)]
        );
    }

    #[test]
    fn test_client_transaction_fails_on_empty_read() {
        let mut channel = ScriptedChannel::default();
        let err = client_transaction(&mut channel, REQUEST).unwrap_err();
        assert!(matches!(err, Error::Transfer(_)));
    }

    #[test]
    fn test_client_transaction_fails_on_zero_write() {
        let mut channel = ScriptedChannel::with_inbound(&[RESPONSE_1]);
        channel.short_write = true;

        let err = client_transaction(&mut channel, REQUEST).unwrap_err();
        assert!(matches!(err, Error::Transfer(_)));
        // Never reached the read
        assert_eq!(channel.events.len(), 1);
    }

    #[test]
    fn test_server_transaction_orders_exchanges() {
        let mut channel = ScriptedChannel::with_inbound(&[REQUEST, REQUEST]);
        let done = server_transaction(&mut channel, &RESPONSES).unwrap();

        assert_eq!(done, 2);
        assert_eq!(
            channel.events,
            vec![
                Event::Read(MAX_BUF_SIZE),
                Event::Write(RESPONSE_1.to_vec()),
                Event::Read(MAX_BUF_SIZE),
                Event::Write(RESPONSE_2.to_vec()),
            ]
        );
    }

    #[test]
    fn test_server_transaction_stops_at_missing_request() {
        let mut channel = ScriptedChannel::with_inbound(&[REQUEST]);
        let err = server_transaction(&mut channel, &RESPONSES).unwrap_err();

        assert!(matches!(err, Error::Transfer(_)));
        // Second response never sent
        assert_eq!(channel.events.len(), 3);
    }

    #[test]
    fn test_buffer_never_exceeds_capacity() {
        let oversized = vec![b'x'; MAX_BUF_SIZE * 3];
        let mut channel = ScriptedChannel::with_inbound(&[oversized.as_slice()]);

        let mut buf = MessageBuffer::new();
        let n = buf.read_from(&mut channel).unwrap();

        assert_eq!(n, MAX_BUF_SIZE);
        assert_eq!(buf.as_bytes().len(), MAX_BUF_SIZE);
        assert_eq!(buf.text().len(), MAX_BUF_SIZE);
    }

    #[test]
    fn test_buffer_text_is_bounded_to_received_bytes() {
        let mut channel = ScriptedChannel::with_inbound(&[&b"abc"[..], &b"\xffz"[..]]);
        let mut buf = MessageBuffer::with_capacity(16);

        buf.read_from(&mut channel).unwrap();
        assert_eq!(buf.text(), "abc");

        // Reuse does not leak previous contents
        buf.read_from(&mut channel).unwrap();
        assert_eq!(buf.text(), "\u{fffd}z");
        assert_eq!(buf.take().len(), 2);
        assert!(buf.as_bytes().is_empty());
    }
}
