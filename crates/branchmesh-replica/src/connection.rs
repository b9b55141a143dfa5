//! Framed TCP connection shared by the server and the connection pool.

use branchmesh_wire::{Frame, Request, Response};
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{RpcError, RpcResult};

const BUFFER_SIZE: usize = 4096;

/// A TCP stream with its read and write buffers.
pub(crate) struct Connection {
    stream: TcpStream,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl Connection {
    pub(crate) fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(BUFFER_SIZE),
            write_buf: BytesMut::with_capacity(BUFFER_SIZE),
        }
    }

    /// Reads the next frame.
    ///
    /// Returns `Ok(None)` if the remote end closed the connection cleanly
    /// between frames. Cancel-safe: partially received bytes stay buffered.
    pub(crate) async fn read_frame(&mut self) -> RpcResult<Option<Frame>> {
        loop {
            if let Some(frame) = Frame::decode(&mut self.read_buf)? {
                return Ok(Some(frame));
            }

            if self.stream.read_buf(&mut self.read_buf).await? == 0 {
                if self.read_buf.is_empty() {
                    return Ok(None);
                }
                return Err(RpcError::ConnectionClosed);
            }
        }
    }

    pub(crate) async fn write_frame(&mut self, frame: &Frame) -> RpcResult<()> {
        self.write_buf.clear();
        frame.encode(&mut self.write_buf);
        self.stream.write_all(&self.write_buf).await?;
        Ok(())
    }

    /// Sends `request` and waits for the matching response.
    pub(crate) async fn round_trip(&mut self, request: &Request) -> RpcResult<Response> {
        self.write_frame(&request.to_frame()?).await?;

        let frame = self
            .read_frame()
            .await?
            .ok_or(RpcError::ConnectionClosed)?;
        let response = Response::from_frame(&frame)?;

        if response.id != request.id {
            return Err(RpcError::UnexpectedResponse(format!(
                "response id {} does not match request id {}",
                response.id, request.id
            )));
        }
        Ok(response)
    }
}
