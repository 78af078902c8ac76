use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ffmpeg_next::format::Pixel;

use crate::codec::{CodedPacket, FrameEncoder, Recv};
use crate::decoder::{DecodeSession, DecodeStats, Decoder};
use crate::encoder::{
    EncodeSession, EncodeStats, Encoder, MPEG_SEQUENCE_END_CODE, PackedReader, PlanarReader,
    Settings,
};
use crate::layout::{FramePlanesMut, ImageLayout};
use crate::metadata::probe;

const WIDTH: u32 = 16;
const HEIGHT: u32 = 16;
const FPS: i32 = 25;
const FRAME_SIZE: usize = (WIDTH * HEIGHT * 3 / 2) as usize;

fn codec_available(name: &str) -> bool {
    crate::init().unwrap();
    let found = ffmpeg_next::encoder::find_by_name(name).is_some()
        && ffmpeg_next::decoder::find_by_name(name).is_some();
    if !found {
        eprintln!("skip: {} codec not available", name);
    }
    found
}

/// Frames 0..count, frame `i` is a flat luma of `i * 20` with neutral chroma.
fn raw_frames(count: u8) -> Vec<u8> {
    let luma = (WIDTH * HEIGHT) as usize;
    let mut out = Vec::with_capacity(FRAME_SIZE * count as usize);
    for i in 0..count {
        out.extend(std::iter::repeat_n(i * 20, luma));
        out.extend(std::iter::repeat_n(128u8, FRAME_SIZE - luma));
    }
    out
}

fn encode(raw: &[u8], out: &Path, codec: &str, packed: bool) -> anyhow::Result<EncodeStats> {
    let encoder = Encoder::new(Settings::fixed(codec, Pixel::YUV420P, WIDTH, HEIGHT, FPS))?;
    let output = BufWriter::new(File::create(out)?);
    if packed {
        let fill = PackedReader::new(Pixel::YUV420P, WIDTH, HEIGHT)?;
        EncodeSession::new(raw, output, encoder, fill)?.run()
    } else {
        let fill = PlanarReader::new(Pixel::YUV420P, WIDTH, HEIGHT);
        EncodeSession::new(raw, output, encoder, fill)?.run()
    }
}

fn decode(input: &Path, codec: &str) -> anyhow::Result<(DecodeStats, Vec<u8>)> {
    let decoder = Decoder::new(codec, WIDTH, HEIGHT)?;
    let layout = ImageLayout::new(Pixel::YUV420P, WIDTH, HEIGHT)?;
    let input = BufReader::new(File::open(input)?);
    let mut output = Vec::new();
    let stats = DecodeSession::new(input, &mut output, decoder, layout).run()?;
    Ok((stats, output))
}

#[test]
fn test_round_trip_mpeg1video() -> anyhow::Result<()> {
    if !codec_available("mpeg1video") {
        return Ok(());
    }
    let dir = tempfile::tempdir()?;
    let encoded = dir.path().join("out.m1v");

    let enc_stats = encode(&raw_frames(10), &encoded, "mpeg1video", false)?;
    assert_eq!(enc_stats.frames, 10);
    assert!(enc_stats.packets >= 10);

    let (dec_stats, decoded) = decode(&encoded, "mpeg1video")?;
    assert_eq!(dec_stats.frames, 10);
    assert_eq!(decoded.len(), 10 * FRAME_SIZE);

    let first = &decoded[..FRAME_SIZE];
    let last = &decoded[decoded.len() - FRAME_SIZE..];
    assert_eq!(first.len(), FRAME_SIZE);
    assert_eq!(last.len(), FRAME_SIZE);
    // lossy, but a flat 0 and a flat 180 picture stay far apart
    assert!(first[0] < 60);
    assert!(last[0] > 120);
    Ok(())
}

#[test]
fn test_encode_is_deterministic() -> anyhow::Result<()> {
    if !codec_available("mpeg1video") {
        return Ok(());
    }
    let dir = tempfile::tempdir()?;
    let a = dir.path().join("a.m1v");
    let b = dir.path().join("b.m1v");
    let c = dir.path().join("c.m1v");
    let raw = raw_frames(10);

    encode(&raw, &a, "mpeg1video", false)?;
    encode(&raw, &b, "mpeg1video", false)?;
    // for yuv420p at even sizes both readers see the same bytes
    encode(&raw, &c, "mpeg1video", true)?;

    let a = std::fs::read(a)?;
    assert!(!a.is_empty());
    assert_eq!(a, std::fs::read(b)?);
    assert_eq!(a, std::fs::read(c)?);
    Ok(())
}

#[test]
fn test_reencode_decoded_output_is_deterministic() -> anyhow::Result<()> {
    if !codec_available("mpeg1video") {
        return Ok(());
    }
    let dir = tempfile::tempdir()?;
    let first = dir.path().join("first.m1v");
    encode(&raw_frames(6), &first, "mpeg1video", false)?;
    let (_, decoded) = decode(&first, "mpeg1video")?;

    let again_a = dir.path().join("again_a.m1v");
    let again_b = dir.path().join("again_b.m1v");
    encode(&decoded, &again_a, "mpeg1video", true)?;
    encode(&decoded, &again_b, "mpeg1video", true)?;

    assert_eq!(std::fs::read(again_a)?, std::fs::read(again_b)?);
    Ok(())
}

#[test]
fn test_mpeg_end_code_only_for_legacy_codecs() -> anyhow::Result<()> {
    if !codec_available("mpeg1video") {
        return Ok(());
    }
    let dir = tempfile::tempdir()?;
    let mpeg1 = dir.path().join("out.m1v");
    encode(&raw_frames(3), &mpeg1, "mpeg1video", false)?;
    assert!(std::fs::read(&mpeg1)?.ends_with(&MPEG_SEQUENCE_END_CODE));

    if codec_available("mpeg4") {
        let mpeg4 = dir.path().join("out.m4v");
        encode(&raw_frames(3), &mpeg4, "mpeg4", false)?;
        assert!(!std::fs::read(&mpeg4)?.ends_with(&MPEG_SEQUENCE_END_CODE));
    }
    Ok(())
}

#[test]
fn test_probe_encoded_stream() -> anyhow::Result<()> {
    if !codec_available("mpeg1video") {
        return Ok(());
    }
    let dir = tempfile::tempdir()?;
    let encoded = dir.path().join("probe.m1v");
    encode(&raw_frames(10), &encoded, "mpeg1video", false)?;

    let info = probe(encoded.to_str().unwrap())?;
    assert_eq!(info.format.nb_streams, 1);
    let stream = &info.streams[0];
    assert_eq!(stream.codec_type, "video");
    assert_eq!(stream.codec_name, "mpeg1video");
    assert_eq!(stream.width, Some(WIDTH));
    assert_eq!(stream.height, Some(HEIGHT));
    Ok(())
}

/// (pts, dts, key) of every packet the encoder hands back for `frames`.
fn encoded_timestamps(frames: u8) -> anyhow::Result<Vec<(Option<i64>, Option<i64>, bool)>> {
    let mut encoder = Encoder::new(Settings::fixed("mpeg1video", Pixel::YUV420P, WIDTH, HEIGHT, FPS))?;
    let layout = ImageLayout::new(Pixel::YUV420P, WIDTH, HEIGHT)?;
    let raw = raw_frames(frames);
    let mut frame = encoder.alloc_frame()?;
    let mut stamps = Vec::new();

    let mut drain = |encoder: &mut Encoder| -> anyhow::Result<()> {
        while let Recv::Ready(packet) = encoder.receive_packet()? {
            stamps.push((packet.pts(), packet.dts(), packet.is_key()));
        }
        Ok(())
    };
    for (pts, image) in raw.chunks(FRAME_SIZE).enumerate() {
        frame.make_writable()?;
        layout.unpack(image, &mut frame)?;
        encoder.send_frame(&mut frame, pts as i64)?;
        drain(&mut encoder)?;
    }
    encoder.send_eof()?;
    drain(&mut encoder)?;
    Ok(stamps)
}

#[test]
fn test_encoder_packet_timestamps() -> anyhow::Result<()> {
    if !codec_available("mpeg1video") {
        return Ok(());
    }
    let stamps = encoded_timestamps(10)?;
    assert_eq!(stamps.len(), 10);
    assert!(stamps[0].2, "first packet must be a key frame");

    // one B-frame reorders presentation order, so only dts is monotonic
    let dts: Vec<i64> = stamps.iter().map(|s| s.1.unwrap()).collect();
    assert!(dts.windows(2).all(|w| w[0] < w[1]), "dts not increasing: {:?}", dts);

    let mut pts: Vec<i64> = stamps.iter().map(|s| s.0.unwrap()).collect();
    pts.sort_unstable();
    assert_eq!(pts, (0..10).collect::<Vec<i64>>());
    Ok(())
}

#[test]
fn test_unknown_codec_names() {
    crate::init().unwrap();
    assert!(Decoder::new("no-such-codec", WIDTH, HEIGHT).is_err());
    assert!(Encoder::new(Settings::fixed("no-such-codec", Pixel::YUV420P, WIDTH, HEIGHT, FPS)).is_err());
}
