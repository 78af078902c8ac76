use std::io::{Read, Write};

use anyhow::Context as _;
use bytes::Bytes;

use crate::{
    codec::{FrameDecoder, PacketParser, Recv, read_full, recv_from},
    frame::RawVideoFrame,
    layout::ImageLayout,
    parser::Parser,
};

/// Bytes read from the input per iteration.
pub const CHUNK_SIZE: usize = 4096;

/// A named FFmpeg video decoder together with the bitstream parser for its
/// codec.
pub struct Decoder {
    inner: ffmpeg_next::codec::decoder::Video,
    parser: Parser,
}

impl Decoder {
    pub fn new(codec_name: &str, width: u32, height: u32) -> anyhow::Result<Self> {
        let codec = ffmpeg_next::decoder::find_by_name(codec_name)
            .ok_or_else(|| anyhow::anyhow!("codec not found: {}", codec_name))?;
        let parser = Parser::new(codec.id())?;

        let mut decoder_ctx = ffmpeg_next::codec::Context::new_with_codec(codec);
        // mpeg4 and msmpeg4 do not carry the picture size in the bitstream
        unsafe {
            (*decoder_ctx.as_mut_ptr()).width = width as i32;
            (*decoder_ctx.as_mut_ptr()).height = height as i32;
        }
        let inner = decoder_ctx.decoder().open_as(codec)?.video()?;
        log::info!("decoder opened: {} ({:?})", codec.name(), codec.id());

        Ok(Self { inner, parser })
    }
}

impl PacketParser for Decoder {
    fn parse(&mut self, data: &[u8]) -> anyhow::Result<(usize, Option<Bytes>)> {
        unsafe {
            let codec_ctx = self.inner.as_mut_ptr();
            self.parser.parse(codec_ctx, data)
        }
    }
}

impl FrameDecoder for Decoder {
    type Frame = RawVideoFrame;

    fn send_packet(&mut self, data: &[u8]) -> anyhow::Result<()> {
        let packet = ffmpeg_next::codec::packet::Packet::copy(data);
        self.inner.send_packet(&packet)?;
        Ok(())
    }

    fn send_eof(&mut self) -> anyhow::Result<()> {
        self.inner.send_eof()?;
        Ok(())
    }

    fn receive_frame(&mut self) -> anyhow::Result<Recv<RawVideoFrame>> {
        let mut frame = ffmpeg_next::frame::Video::empty();
        let result = self.inner.receive_frame(&mut frame);
        recv_from(result, move || RawVideoFrame::from(frame))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecodeStats {
    pub chunks: u64,
    pub packets: u64,
    pub frames: u64,
    pub bytes_written: u64,
}

/// Everything one decode run needs: the compressed input, the raw output,
/// the parser/decoder stage and the buffers reused across iterations.
pub struct DecodeSession<R, W, D> {
    input: R,
    output: W,
    stage: D,
    layout: ImageLayout,
    chunk: Vec<u8>,
    packed: Vec<u8>,
    stats: DecodeStats,
}

impl<R, W, D> DecodeSession<R, W, D>
where
    R: Read,
    W: Write,
    D: PacketParser + FrameDecoder,
{
    pub fn new(input: R, output: W, stage: D, layout: ImageLayout) -> Self {
        let packed = vec![0u8; layout.size()];
        Self {
            input,
            output,
            stage,
            layout,
            chunk: vec![0u8; CHUNK_SIZE],
            packed,
            stats: DecodeStats::default(),
        }
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk = vec![0u8; size.max(1)];
        self
    }

    /// Reads the input to exhaustion, writing every decoded frame as packed
    /// bytes, then flushes the parser and the decoder.
    pub fn run(mut self) -> anyhow::Result<DecodeStats> {
        loop {
            let filled = read_full(&mut self.input, &mut self.chunk).context("reading input")?;
            if filled == 0 {
                break;
            }
            self.stats.chunks += 1;
            self.parse_chunk(filled)?;
        }

        let (_, tail) = self.stage.parse(&[]).context("flushing parser")?;
        if let Some(packet) = tail {
            self.decode(Some(&packet))?;
        }
        self.decode(None)?;
        self.output.flush().context("flushing output")?;

        log::info!(
            "decode finished: {} chunks, {} packets, {} frames, {} bytes written",
            self.stats.chunks,
            self.stats.packets,
            self.stats.frames,
            self.stats.bytes_written
        );
        Ok(self.stats)
    }

    fn parse_chunk(&mut self, len: usize) -> anyhow::Result<()> {
        let mut offset = 0;
        while offset < len {
            let (consumed, packet) = self
                .stage
                .parse(&self.chunk[offset..len])
                .context("parsing input")?;
            if consumed == 0 && packet.is_none() {
                anyhow::bail!("parser made no progress at offset {}", offset);
            }
            offset += consumed;
            if let Some(packet) = packet {
                self.decode(Some(&packet))?;
            }
        }
        Ok(())
    }

    /// Submits one packet (or end of input for `None`) and drains every frame
    /// the decoder can hand back.
    fn decode(&mut self, packet: Option<&[u8]>) -> anyhow::Result<()> {
        match packet {
            Some(data) => {
                self.stats.packets += 1;
                log::trace!("packet #{}: {} bytes", self.stats.packets, data.len());
                self.stage
                    .send_packet(data)
                    .context("sending packet to decoder")?;
            }
            None => self.stage.send_eof().context("flushing decoder")?,
        }

        loop {
            match self.stage.receive_frame().context("decoding")? {
                Recv::Ready(frame) => {
                    self.layout
                        .check_geometry(&frame)
                        .with_context(|| format!("frame {}", self.stats.frames))?;
                    self.layout.pack(&frame, &mut self.packed)?;
                    self.output
                        .write_all(&self.packed)
                        .context("writing output")?;
                    self.stats.frames += 1;
                    self.stats.bytes_written += self.packed.len() as u64;
                }
                Recv::Again | Recv::Eof => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use ffmpeg_next::format::Pixel;

    use super::*;
    use crate::layout::{PlaneLayout, tests::FakeFrame};

    const DELIM: u8 = 0xff;

    fn layout() -> ImageLayout {
        ImageLayout::from_planes(4, 2, vec![PlaneLayout::new(4, 2), PlaneLayout::new(2, 1)])
    }

    /// Packets are runs of bytes ended by `DELIM`. Each packet decodes into a
    /// frame filled with its first byte; one frame is held back until EOF.
    #[derive(Default)]
    struct FakeDecoder {
        pending: Vec<u8>,
        queue: VecDeque<u8>,
        eof: bool,
        eof_calls: usize,
        fail_on: Option<u8>,
        // frames come out with this geometry instead of `layout()`
        frame_layout: Option<ImageLayout>,
    }

    impl PacketParser for FakeDecoder {
        fn parse(&mut self, data: &[u8]) -> anyhow::Result<(usize, Option<Bytes>)> {
            if data.is_empty() {
                if self.pending.is_empty() {
                    return Ok((0, None));
                }
                return Ok((0, Some(Bytes::from(std::mem::take(&mut self.pending)))));
            }
            match data.iter().position(|b| *b == DELIM) {
                Some(pos) => {
                    self.pending.extend_from_slice(&data[..pos]);
                    let packet = Bytes::from(std::mem::take(&mut self.pending));
                    Ok((pos + 1, Some(packet)))
                }
                None => {
                    self.pending.extend_from_slice(data);
                    Ok((data.len(), None))
                }
            }
        }
    }

    impl FrameDecoder for FakeDecoder {
        type Frame = FakeFrame;

        fn send_packet(&mut self, data: &[u8]) -> anyhow::Result<()> {
            self.queue.push_back(data[0]);
            Ok(())
        }

        fn send_eof(&mut self) -> anyhow::Result<()> {
            self.eof = true;
            self.eof_calls += 1;
            Ok(())
        }

        fn receive_frame(&mut self) -> anyhow::Result<Recv<FakeFrame>> {
            if !self.eof && self.queue.len() < 2 {
                return Ok(Recv::Again);
            }
            match self.queue.pop_front() {
                Some(value) if Some(value) == self.fail_on => {
                    anyhow::bail!("corrupt packet {}", value)
                }
                Some(value) => {
                    let geometry = self.frame_layout.clone().unwrap_or_else(layout);
                    Ok(Recv::Ready(FakeFrame::padded(&geometry, 8, value)))
                }
                None => Ok(Recv::Eof),
            }
        }
    }

    fn stream(values: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for v in values {
            out.extend_from_slice(&[*v, *v, *v]);
            out.push(DELIM);
        }
        out
    }

    #[test]
    fn test_decode_across_chunks_and_flush() {
        let input = stream(&[1, 2, 3, 4, 5]);
        let mut output = Vec::new();
        let mut fake = FakeDecoder::default();

        let stats = DecodeSession::new(&input[..], &mut output, &mut fake, layout())
            .with_chunk_size(3)
            .run()
            .unwrap();

        let size = layout().size();
        assert_eq!(stats.frames, 5);
        assert_eq!(stats.packets, 5);
        assert_eq!(stats.bytes_written, 5 * size as u64);
        assert_eq!(output.len(), 5 * size);
        for (i, frame) in output.chunks(size).enumerate() {
            assert!(frame.iter().all(|b| *b == i as u8 + 1));
        }
        assert_eq!(fake.eof_calls, 1);
    }

    #[test]
    fn test_parser_tail_is_decoded() {
        let mut input = stream(&[7, 8]);
        input.extend_from_slice(&[9, 9]);
        let mut output = Vec::new();

        let stats = DecodeSession::new(&input[..], &mut output, FakeDecoder::default(), layout())
            .run()
            .unwrap();

        assert_eq!(stats.frames, 3);
        assert!(output[output.len() - layout().size()..].iter().all(|b| *b == 9));
    }

    #[test]
    fn test_empty_input_still_flushes() {
        let mut output = Vec::new();
        let mut fake = FakeDecoder::default();

        let stats = DecodeSession::new(&[][..], &mut output, &mut fake, layout())
            .run()
            .unwrap();

        assert_eq!(stats, DecodeStats::default());
        assert!(output.is_empty());
        assert_eq!(fake.eof_calls, 1);
    }

    #[test]
    fn test_decode_error_is_fatal() {
        let input = stream(&[1, 2, 3, 4]);
        let mut output = Vec::new();
        let fake = FakeDecoder {
            fail_on: Some(3),
            ..Default::default()
        };

        let res = DecodeSession::new(&input[..], &mut output, fake, layout()).run();

        assert!(res.is_err());
        assert_eq!(output.len(), 2 * layout().size());
    }

    #[test]
    fn test_frame_geometry_mismatch_is_fatal() {
        let input = stream(&[1, 2]);
        let mut output = Vec::new();
        let big = ImageLayout::from_planes(64, 64, vec![PlaneLayout::new(64, 64)]);

        let res = DecodeSession::new(&input[..], &mut output, FakeDecoder::default(), big).run();

        assert!(res.is_err());
        assert!(output.is_empty());
    }

    #[test]
    fn test_larger_frame_is_not_cropped() {
        let input = stream(&[1, 2]);
        let mut output = Vec::new();
        // every plane of this frame is big enough to hold `layout()`
        let fake = FakeDecoder {
            frame_layout: Some(ImageLayout::from_planes(
                8,
                4,
                vec![PlaneLayout::new(8, 4), PlaneLayout::new(4, 2)],
            )),
            ..Default::default()
        };

        let res = DecodeSession::new(&input[..], &mut output, fake, layout()).run();

        let err = res.unwrap_err();
        assert!(format!("{:#}", err).contains("frame is 8x4, expected 4x2"));
        assert!(output.is_empty());
    }

    #[test]
    fn test_pixel_format_mismatch_is_fatal() {
        let expected = ImageLayout::new(Pixel::YUV420P, 4, 2).unwrap();
        let decoded = ImageLayout::new(Pixel::YUV422P, 4, 2).unwrap();
        let input = stream(&[1]);
        let mut output = Vec::new();
        let fake = FakeDecoder {
            frame_layout: Some(decoded),
            ..Default::default()
        };

        let res = DecodeSession::new(&input[..], &mut output, fake, expected).run();

        assert!(format!("{:#}", res.unwrap_err()).contains("pixel format"));
        assert!(output.is_empty());
    }
}
