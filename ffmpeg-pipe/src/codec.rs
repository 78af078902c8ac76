//! Stage abstractions shared by the decode and encode loops.
//!
//! The loops only ever talk to these traits, so they can be driven by the
//! FFmpeg-backed [`Decoder`](crate::decoder::Decoder) and
//! [`Encoder`](crate::encoder::Encoder) or by an in-memory fake.

use std::io::{self, Read};

use bytes::Bytes;

use crate::layout::{FramePlanes, FramePlanesMut};

/// Outcome of pulling one item out of a codec stage.
#[derive(Debug, PartialEq, Eq)]
pub enum Recv<T> {
    /// An item is available.
    Ready(T),
    /// The stage needs more input before it can produce anything.
    Again,
    /// The stage has been flushed and will produce nothing more.
    Eof,
}

/// Maps the result of an FFmpeg receive call onto [`Recv`]. `EAGAIN` and
/// `AVERROR_EOF` are flow control; anything else is fatal.
pub(crate) fn recv_from<T>(
    result: Result<(), ffmpeg_next::Error>,
    item: impl FnOnce() -> T,
) -> anyhow::Result<Recv<T>> {
    match result {
        Ok(()) => Ok(Recv::Ready(item())),
        Err(ffmpeg_next::Error::Eof) => Ok(Recv::Eof),
        Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
            Ok(Recv::Again)
        }
        Err(err) => Err(err.into()),
    }
}

/// Splits a raw elementary byte stream into packets.
pub trait PacketParser {
    /// Consumes a prefix of `data` and returns how many bytes were taken along
    /// with a complete packet, if one ended inside that prefix. Passing an
    /// empty slice flushes whatever the parser is still holding.
    fn parse(&mut self, data: &[u8]) -> anyhow::Result<(usize, Option<Bytes>)>;
}

/// Send/receive half of a decoder.
pub trait FrameDecoder {
    type Frame: FramePlanes;

    fn send_packet(&mut self, data: &[u8]) -> anyhow::Result<()>;

    /// Signals end of input so buffered frames can be drained.
    fn send_eof(&mut self) -> anyhow::Result<()>;

    fn receive_frame(&mut self) -> anyhow::Result<Recv<Self::Frame>>;
}

/// A compressed packet handed out by an encoder.
pub trait CodedPacket {
    fn data(&self) -> &[u8];
    fn pts(&self) -> Option<i64>;
}

/// Send/receive half of an encoder.
pub trait FrameEncoder {
    type Frame: FramePlanesMut;
    type Packet: CodedPacket;

    /// Allocates a frame with the geometry the encoder was opened with.
    fn alloc_frame(&self) -> anyhow::Result<Self::Frame>;

    fn send_frame(&mut self, frame: &mut Self::Frame, pts: i64) -> anyhow::Result<()>;

    /// Signals end of input so buffered packets can be drained.
    fn send_eof(&mut self) -> anyhow::Result<()>;

    fn receive_packet(&mut self) -> anyhow::Result<Recv<Self::Packet>>;

    /// Trailer appended to the raw byte stream after flushing, if the codec's
    /// container-less format requires one.
    fn sequence_end_code(&self) -> Option<&'static [u8]> {
        None
    }
}

impl<T: PacketParser + ?Sized> PacketParser for &mut T {
    fn parse(&mut self, data: &[u8]) -> anyhow::Result<(usize, Option<Bytes>)> {
        (**self).parse(data)
    }
}

impl<T: FrameDecoder + ?Sized> FrameDecoder for &mut T {
    type Frame = T::Frame;

    fn send_packet(&mut self, data: &[u8]) -> anyhow::Result<()> {
        (**self).send_packet(data)
    }

    fn send_eof(&mut self) -> anyhow::Result<()> {
        (**self).send_eof()
    }

    fn receive_frame(&mut self) -> anyhow::Result<Recv<Self::Frame>> {
        (**self).receive_frame()
    }
}

impl<T: FrameEncoder + ?Sized> FrameEncoder for &mut T {
    type Frame = T::Frame;
    type Packet = T::Packet;

    fn alloc_frame(&self) -> anyhow::Result<Self::Frame> {
        (**self).alloc_frame()
    }

    fn send_frame(&mut self, frame: &mut Self::Frame, pts: i64) -> anyhow::Result<()> {
        (**self).send_frame(frame, pts)
    }

    fn send_eof(&mut self) -> anyhow::Result<()> {
        (**self).send_eof()
    }

    fn receive_packet(&mut self) -> anyhow::Result<Recv<Self::Packet>> {
        (**self).receive_packet()
    }

    fn sequence_end_code(&self) -> Option<&'static [u8]> {
        (**self).sequence_end_code()
    }
}

/// Reads until `buf` is full or the reader is exhausted. Returns the number of
/// bytes read, which is short only at end of input.
pub fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recv_from_maps_flow_control() {
        let again = recv_from(
            Err(ffmpeg_next::Error::Other {
                errno: ffmpeg_next::util::error::EAGAIN,
            }),
            || 1,
        )
        .unwrap();
        assert_eq!(again, Recv::Again);

        let eof = recv_from(Err(ffmpeg_next::Error::Eof), || 1).unwrap();
        assert_eq!(eof, Recv::Eof);

        let ready = recv_from(Ok(()), || 7).unwrap();
        assert_eq!(ready, Recv::Ready(7));
    }

    #[test]
    fn test_recv_from_other_errors_are_fatal() {
        let res = recv_from(Err(ffmpeg_next::Error::InvalidData), || ());
        assert!(res.is_err());
    }

    #[test]
    fn test_read_full_stops_at_end() {
        let mut input: &[u8] = &[1, 2, 3, 4, 5];
        let mut buf = [0u8; 4];
        assert_eq!(read_full(&mut input, &mut buf).unwrap(), 4);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(read_full(&mut input, &mut buf).unwrap(), 1);
        assert_eq!(read_full(&mut input, &mut buf).unwrap(), 0);
    }
}
