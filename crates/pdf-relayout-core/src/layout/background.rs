use image::RgbImage;

use crate::error::{Error, Result};
use crate::pdf::Rgb;
use super::consensus::consensus;

/// Infer the fill colour behind a block from the four corners of its crop.
///
/// Corners are voted on in the order top-left, top-right, bottom-left,
/// bottom-right, so four different corners resolve to the top-left one.
pub fn resolve_background(crop: &RgbImage) -> Result<Rgb> {
    let (width, height) = crop.dimensions();
    if width == 0 || height == 0 {
        return Err(Error::EmptyInput("background crop has zero area"));
    }

    let (right, bottom) = (width - 1, height - 1);
    let corners = [(0, 0), (right, 0), (0, bottom), (right, bottom)].map(|(x, y)| {
        let [r, g, b] = crop.get_pixel(x, y).0;
        Rgb(r, g, b).to_hex()
    });

    let winner = consensus(corners)?;
    Rgb::from_hex(&winner).ok_or(Error::EmptyInput("background sample is not a colour"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb as Pixel;

    fn crop_with_corners(corners: [[u8; 3]; 4]) -> RgbImage {
        let mut img = RgbImage::from_pixel(8, 4, Pixel([9, 9, 9]));
        img.put_pixel(0, 0, Pixel(corners[0]));
        img.put_pixel(7, 0, Pixel(corners[1]));
        img.put_pixel(0, 3, Pixel(corners[2]));
        img.put_pixel(7, 3, Pixel(corners[3]));
        img
    }

    #[test]
    fn test_identical_corners() {
        let crop = RgbImage::from_pixel(5, 5, Pixel([240, 230, 200]));
        assert_eq!(resolve_background(&crop).ok(), Some(Rgb(240, 230, 200)));
    }

    #[test]
    fn test_majority_wins() {
        let white = [255, 255, 255];
        let red = [200, 0, 0];
        let crop = crop_with_corners([red, white, white, white]);
        assert_eq!(resolve_background(&crop).ok(), Some(Rgb::WHITE));
    }

    #[test]
    fn test_all_different_picks_top_left() {
        let crop = crop_with_corners([[1, 2, 3], [4, 5, 6], [7, 8, 9], [10, 11, 12]]);
        assert_eq!(resolve_background(&crop).ok(), Some(Rgb(1, 2, 3)));
    }

    #[test]
    fn test_interior_is_ignored() {
        // Glyph pixels in the middle never vote
        let mut crop = RgbImage::from_pixel(10, 10, Pixel([255, 255, 255]));
        for x in 2..8 {
            for y in 2..8 {
                crop.put_pixel(x, y, Pixel([0, 0, 0]));
            }
        }
        assert_eq!(resolve_background(&crop).ok(), Some(Rgb::WHITE));
    }

    #[test]
    fn test_single_pixel_crop() {
        let crop = RgbImage::from_pixel(1, 1, Pixel([12, 34, 56]));
        assert_eq!(resolve_background(&crop).ok(), Some(Rgb(12, 34, 56)));
    }

    #[test]
    fn test_zero_area_crop() {
        assert!(matches!(
            resolve_background(&RgbImage::new(0, 0)),
            Err(Error::EmptyInput(_))
        ));
        assert!(matches!(
            resolve_background(&RgbImage::new(4, 0)),
            Err(Error::EmptyInput(_))
        ));
    }
}
