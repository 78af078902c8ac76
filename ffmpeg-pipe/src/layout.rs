//! Tightly packed image geometry.
//!
//! Raw video files carry no row alignment, while decoded and encoder-bound
//! frames pad each row out to their stride. [`ImageLayout`] describes the
//! packed form and moves pixels between the two.

use anyhow::{anyhow, bail, ensure};
use ffmpeg_next::format::Pixel;

/// Read access to the planes of a frame.
pub trait FramePlanes {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// `None` when the frame does not carry a pixel format.
    fn format(&self) -> Option<Pixel> {
        None
    }
    fn plane_count(&self) -> usize;
    /// Padded row length of `index` in bytes.
    fn stride(&self, index: usize) -> usize;
    fn plane(&self, index: usize) -> &[u8];
}

/// Write access to the planes of a frame.
pub trait FramePlanesMut: FramePlanes {
    fn plane_mut(&mut self, index: usize) -> &mut [u8];

    /// Makes sure no one else holds a reference to the frame's buffers before
    /// they are overwritten.
    fn make_writable(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    pub row_bytes: usize,
    pub rows: usize,
}

impl PlaneLayout {
    pub fn new(row_bytes: usize, rows: usize) -> Self {
        Self { row_bytes, rows }
    }

    pub fn size(&self) -> usize {
        self.row_bytes * self.rows
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLayout {
    width: u32,
    height: u32,
    format: Option<Pixel>,
    planes: Vec<PlaneLayout>,
}

impl ImageLayout {
    /// Packed layout of `format` at the given size.
    pub fn new(format: Pixel, width: u32, height: u32) -> anyhow::Result<Self> {
        if width == 0 || height == 0 {
            bail!("invalid video size {}x{}", width, height);
        }
        let descriptor = format
            .descriptor()
            .ok_or_else(|| anyhow!("unsupported pixel format: {:?}", format))?;
        let flags = unsafe { (*descriptor.as_ptr()).flags };
        if flags & ffmpeg_next::ffi::AV_PIX_FMT_FLAG_PAL as u64 != 0 {
            bail!("palettized pixel format not supported: {}", descriptor.name());
        }

        let mut linesizes = [0i32; 4];
        let ret = unsafe {
            ffmpeg_next::ffi::av_image_fill_linesizes(
                linesizes.as_mut_ptr(),
                format.into(),
                width as i32,
            )
        };
        if ret < 0 {
            return Err(ffmpeg_next::Error::from(ret).into());
        }

        let chroma_shift = descriptor.log2_chroma_h() as u32;
        let planes = linesizes
            .iter()
            .enumerate()
            .take_while(|(_, linesize)| **linesize > 0)
            .map(|(index, linesize)| {
                // planes 1 and 2 carry chroma, everything else is full height
                let shift = if index == 1 || index == 2 { chroma_shift } else { 0 };
                let rows = (height + (1 << shift) - 1) >> shift;
                PlaneLayout::new(*linesize as usize, rows as usize)
            })
            .collect();

        Ok(Self {
            width,
            height,
            format: Some(format),
            planes,
        })
    }

    /// Luma plane followed by two quarter-size chroma planes, regardless of
    /// the pixel format actually in use.
    pub fn planar_420(width: u32, height: u32) -> Self {
        let (w, h) = (width as usize, height as usize);
        Self {
            width,
            height,
            format: None,
            planes: vec![
                PlaneLayout::new(w, h),
                PlaneLayout::new(w / 2, h / 2),
                PlaneLayout::new(w / 2, h / 2),
            ],
        }
    }

    pub fn from_planes(width: u32, height: u32, planes: Vec<PlaneLayout>) -> Self {
        Self {
            width,
            height,
            format: None,
            planes,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel format the layout was computed for, if any.
    pub fn format(&self) -> Option<Pixel> {
        self.format
    }

    pub fn planes(&self) -> &[PlaneLayout] {
        &self.planes
    }

    /// Total number of packed bytes for one image.
    pub fn size(&self) -> usize {
        self.planes.iter().map(PlaneLayout::size).sum()
    }

    /// Fails unless `frame` has exactly this size and, when both sides know
    /// it, the same pixel format.
    pub fn check_geometry<F: FramePlanes + ?Sized>(&self, frame: &F) -> anyhow::Result<()> {
        ensure!(
            frame.width() == self.width && frame.height() == self.height,
            "frame is {}x{}, expected {}x{}",
            frame.width(),
            frame.height(),
            self.width,
            self.height
        );
        if let (Some(actual), Some(expected)) = (frame.format(), self.format) {
            ensure!(
                actual == expected,
                "frame pixel format is {:?}, expected {:?}",
                actual,
                expected
            );
        }
        Ok(())
    }

    /// Fails unless every plane of this layout fits inside `frame`.
    pub fn check_frame<F: FramePlanes + ?Sized>(&self, frame: &F) -> anyhow::Result<()> {
        ensure!(
            frame.plane_count() >= self.planes.len(),
            "frame has {} planes, layout needs {}",
            frame.plane_count(),
            self.planes.len()
        );
        for (index, plane) in self.planes.iter().enumerate() {
            if plane.rows == 0 {
                continue;
            }
            let stride = frame.stride(index);
            let needed = stride * (plane.rows - 1) + plane.row_bytes;
            ensure!(
                stride >= plane.row_bytes && frame.plane(index).len() >= needed,
                "plane {} too small for {}x{} (stride {}, {} bytes, need {})",
                index,
                self.width,
                self.height,
                stride,
                frame.plane(index).len(),
                needed
            );
        }
        Ok(())
    }

    /// Copies `frame` into `dst`, dropping stride padding.
    pub fn pack<F: FramePlanes + ?Sized>(&self, frame: &F, dst: &mut [u8]) -> anyhow::Result<()> {
        ensure!(
            dst.len() >= self.size(),
            "packed buffer too small: {} < {}",
            dst.len(),
            self.size()
        );
        self.check_frame(frame)?;

        let mut offset = 0;
        for (index, plane) in self.planes.iter().enumerate() {
            let src = frame.plane(index);
            let stride = frame.stride(index);
            for row in 0..plane.rows {
                let start = row * stride;
                dst[offset..offset + plane.row_bytes]
                    .copy_from_slice(&src[start..start + plane.row_bytes]);
                offset += plane.row_bytes;
            }
        }
        Ok(())
    }

    /// Spreads packed `src` over the (possibly padded) planes of `frame`.
    pub fn unpack<F: FramePlanesMut + ?Sized>(&self, src: &[u8], frame: &mut F) -> anyhow::Result<()> {
        ensure!(
            src.len() >= self.size(),
            "packed buffer too small: {} < {}",
            src.len(),
            self.size()
        );
        self.check_frame(frame)?;

        let mut offset = 0;
        for (index, plane) in self.planes.iter().enumerate() {
            let stride = frame.stride(index);
            let dst = frame.plane_mut(index);
            for row in 0..plane.rows {
                let start = row * stride;
                dst[start..start + plane.row_bytes]
                    .copy_from_slice(&src[offset..offset + plane.row_bytes]);
                offset += plane.row_bytes;
            }
        }
        Ok(())
    }
}
