use ffmpeg_next::format::Pixel;

use crate::layout::{FramePlanes, FramePlanesMut};

/// A decoded or encoder-bound video frame owned by FFmpeg.
pub struct RawVideoFrame {
    frame: ffmpeg_next::frame::Video,
}

impl From<ffmpeg_next::frame::Video> for RawVideoFrame {
    fn from(frame: ffmpeg_next::frame::Video) -> Self {
        Self { frame }
    }
}

impl RawVideoFrame {
    /// Allocates stride-aligned buffers for a `format` frame of the given size.
    pub fn alloc(format: Pixel, width: u32, height: u32) -> anyhow::Result<Self> {
        if width == 0 || height == 0 {
            anyhow::bail!("invalid video size {}x{}", width, height);
        }
        if format == Pixel::None {
            anyhow::bail!("invalid pixel format for raw video");
        }
        Ok(Self {
            frame: ffmpeg_next::frame::Video::new(format, width, height),
        })
    }

    pub fn set_pts(&mut self, pts: Option<i64>) {
        self.frame.set_pts(pts);
    }

    pub fn as_video(&self) -> &ffmpeg_next::frame::Video {
        &self.frame
    }
}

impl FramePlanes for RawVideoFrame {
    fn width(&self) -> u32 {
        self.frame.width()
    }

    fn height(&self) -> u32 {
        self.frame.height()
    }

    fn format(&self) -> Option<Pixel> {
        match self.frame.format() {
            Pixel::None => None,
            format => Some(format),
        }
    }

    fn plane_count(&self) -> usize {
        self.frame.planes()
    }

    fn stride(&self, index: usize) -> usize {
        self.frame.stride(index)
    }

    fn plane(&self, index: usize) -> &[u8] {
        self.frame.data(index)
    }
}

impl FramePlanesMut for RawVideoFrame {
    fn plane_mut(&mut self, index: usize) -> &mut [u8] {
        self.frame.data_mut(index)
    }

    fn make_writable(&mut self) -> anyhow::Result<()> {
        let ret = unsafe { ffmpeg_next::ffi::av_frame_make_writable(self.frame.as_mut_ptr()) };
        if ret < 0 {
            return Err(ffmpeg_next::Error::from(ret).into());
        }
        Ok(())
    }
}
