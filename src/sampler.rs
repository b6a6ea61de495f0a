use image::{GenericImageView, Rgba};
use palette::Srgb;

/// One pixel reduced to its straight RGB colour and an alpha-derived weight.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub color: Srgb<u8>,
    /// `alpha / 255`, always within `0.0..=1.0`.
    pub weight: f64,
}

impl Sample {
    /// Build a sample from straight (non-premultiplied) RGBA channels.
    ///
    /// The colour is passed through untouched; transparency only lowers the weight.
    #[inline]
    pub fn from_rgba([r, g, b, a]: [u8; 4]) -> Self {
        Self {
            color: Srgb::new(r, g, b),
            weight: a as f64 / 255.0,
        }
    }
}

/// A rectangular grid of straight RGBA8 pixels.
pub trait PixelSource {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Channels of the pixel at `(x, y)`, with `x < width` and `y < height`.
    fn rgba(&self, x: u32, y: u32) -> [u8; 4];
}

impl<I> PixelSource for I
where
    I: GenericImageView<Pixel = Rgba<u8>>,
{
    #[inline]
    fn width(&self) -> u32 {
        GenericImageView::width(self)
    }

    #[inline]
    fn height(&self) -> u32 {
        GenericImageView::height(self)
    }

    #[inline]
    fn rgba(&self, x: u32, y: u32) -> [u8; 4] {
        self.get_pixel(x, y).0
    }
}

/// Walk every pixel once in row-major order, yielding one [`Sample`] each.
///
/// The order decides which bucket is "first encountered" during clustering,
/// so it must stay row 0 left-to-right, then row 1, and so on.
pub fn samples<P: PixelSource + ?Sized>(source: &P) -> impl Iterator<Item = Sample> + '_ {
    let (w, h) = (source.width(), source.height());
    (0..h).flat_map(move |y| (0..w).map(move |x| Sample::from_rgba(source.rgba(x, y))))
}
