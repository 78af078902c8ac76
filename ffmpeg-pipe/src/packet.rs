use crate::codec::CodedPacket;

/// A compressed packet produced by an encoder. The backing buffer is
/// unreferenced when the packet is dropped.
pub struct RawPacket {
    packet: ffmpeg_next::codec::packet::Packet,
}

impl RawPacket {
    /// Decode timestamp; differs from the presentation order once the
    /// encoder emits B-frames.
    pub fn dts(&self) -> Option<i64> {
        self.packet.dts()
    }

    pub fn is_key(&self) -> bool {
        self.packet.is_key()
    }
}

impl From<ffmpeg_next::codec::packet::Packet> for RawPacket {
    fn from(packet: ffmpeg_next::codec::packet::Packet) -> Self {
        Self { packet }
    }
}

impl CodedPacket for RawPacket {
    fn data(&self) -> &[u8] {
        self.packet.data().unwrap_or(&[])
    }

    fn pts(&self) -> Option<i64> {
        self.packet.pts()
    }
}
