use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::pixels::PixelBuffer;
use crate::types::{Point, Rgb};

pub const DEFAULT_SAMPLE_COUNT: usize = 10;

/// Where in the haystack candidate top-left positions are taken from.
///
/// `max_width` / `max_height` bound the span relative to the origin, so a
/// match is always inside `[origin, origin + max)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanArea {
    pub x: u32,
    pub y: u32,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
}

impl ScanArea {
    pub fn full() -> Self {
        Self::default()
    }

    pub fn from(x: u32, y: u32) -> Self {
        Self { x, y, ..Self::default() }
    }

    pub fn limit(mut self, max_width: u32, max_height: u32) -> Self {
        self.max_width = Some(max_width);
        self.max_height = Some(max_height);
        self
    }

    /// Box of `2w+1` x `2h+1` candidate positions centred on `center`. The
    /// part that falls before the screen origin is cut off, never shifted.
    pub fn around(center: Point, w: u32, h: u32) -> Self {
        let (x, span_w) = clip_span(center.x as i64 - w as i64, 2 * w as i64 + 1);
        let (y, span_h) = clip_span(center.y as i64 - h as i64, 2 * h as i64 + 1);
        Self::from(x, y).limit(span_w, span_h)
    }
}

/// Clamp a 1-D range starting at `start` to non-negative coordinates.
fn clip_span(start: i64, span: i64) -> (u32, u32) {
    let clipped = span + start.min(0);
    (start.max(0) as u32, clipped.max(0) as u32)
}

/// Exact-color template matcher.
///
/// A handful of needle pixels are sampled first and compared at each
/// candidate position; only candidates that pass the samples get a full
/// pixel-by-pixel comparison. Candidates are visited column-major (x outer,
/// y inner) and the first verified one wins.
#[derive(Debug, Clone)]
pub struct Matcher {
    sample_count: usize,
    seed: u64,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_COUNT)
    }
}

impl Matcher {
    /// Matcher with a random seed picked once; repeated calls on the same
    /// inputs still sample the same pixels.
    pub fn new(sample_count: usize) -> Self {
        Self::with_seed(sample_count, rand::thread_rng().gen())
    }

    pub fn with_seed(sample_count: usize, seed: u64) -> Self {
        Self { sample_count, seed }
    }

    /// Find the first occurrence of `needle` in `haystack` inside `area`.
    pub fn find(&self, haystack: &PixelBuffer, needle: &PixelBuffer, area: ScanArea) -> Option<Point> {
        if needle.width() > haystack.width() || needle.height() > haystack.height() {
            return None;
        }

        // Last valid top-left is (W - w, H - h), so the exclusive bound is one past it
        let mut end_x = haystack.width() - needle.width() + 1;
        let mut end_y = haystack.height() - needle.height() + 1;
        if let Some(max_w) = area.max_width {
            end_x = end_x.min(area.x.saturating_add(max_w));
        }
        if let Some(max_h) = area.max_height {
            end_y = end_y.min(area.y.saturating_add(max_h));
        }

        let samples = self.samples(needle);

        for x in area.x..end_x {
            for y in area.y..end_y {
                let sampled = samples
                    .iter()
                    .all(|&(sx, sy, color)| haystack.pixel(x + sx, y + sy) == color);
                if sampled && verify(haystack, needle, x, y) {
                    return Some(Point::new(x as i32, y as i32));
                }
            }
        }
        None
    }

    /// Resume a column-major scan strictly after `last`: the rest of
    /// column `last.x` first, then every later column from the top.
    pub fn find_after(&self, haystack: &PixelBuffer, needle: &PixelBuffer, last: Point) -> Option<Point> {
        let x = last.x.max(0) as u32;
        let y = (last.y + 1).max(0) as u32;
        let rest_of_column = ScanArea {
            x,
            y,
            max_width: Some(1),
            max_height: None,
        };
        self.find(haystack, needle, rest_of_column)
            .or_else(|| self.find(haystack, needle, ScanArea::from(x + 1, 0)))
    }

    fn samples(&self, needle: &PixelBuffer) -> Vec<(u32, u32, Rgb)> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        (0..self.sample_count)
            .map(|_| {
                let sx = rng.gen_range(0..needle.width());
                let sy = rng.gen_range(0..needle.height());
                (sx, sy, needle.pixel(sx, sy))
            })
            .collect()
    }
}

fn verify(haystack: &PixelBuffer, needle: &PixelBuffer, x: u32, y: u32) -> bool {
    (0..needle.width()).all(|nx| {
        (0..needle.height()).all(|ny| haystack.pixel(x + nx, y + ny) == needle.pixel(nx, ny))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BG: Rgb = Rgb::new(0, 0, 0);

    /// 3x2 needle with distinct colors so partial overlaps never match
    fn needle() -> PixelBuffer {
        PixelBuffer::from_fn(3, 2, |x, y| Rgb::new(200, 10 + x as u8, 50 + y as u8)).unwrap()
    }

    fn screen_with(w: u32, h: u32, at: &[(u32, u32)]) -> PixelBuffer {
        let n = needle();
        PixelBuffer::from_fn(w, h, |x, y| {
            for &(px, py) in at {
                if x >= px && x < px + n.width() && y >= py && y < py + n.height() {
                    return n.pixel(x - px, y - py);
                }
            }
            BG
        })
        .unwrap()
    }

    #[test]
    fn finds_single_occurrence() {
        let hay = screen_with(40, 30, &[(17, 9)]);
        let m = Matcher::with_seed(10, 7);
        assert_eq!(m.find(&hay, &needle(), ScanArea::full()), Some(Point::new(17, 9)));
    }

    #[test]
    fn finds_occurrence_touching_bottom_right_edge() {
        let hay = screen_with(20, 10, &[(17, 8)]);
        let m = Matcher::with_seed(10, 1);
        assert_eq!(m.find(&hay, &needle(), ScanArea::full()), Some(Point::new(17, 8)));
    }

    #[test]
    fn needle_same_size_as_haystack() {
        let m = Matcher::with_seed(10, 3);
        assert_eq!(m.find(&needle(), &needle(), ScanArea::full()), Some(Point::new(0, 0)));
    }

    #[test]
    fn absent_needle_is_not_found() {
        // one pixel off from the needle everywhere it would line up
        let mut near = needle().to_rgb();
        let last = near.len() - 1;
        near[last] ^= 1;
        let almost = PixelBuffer::from_rgb(3, 2, &near).unwrap();
        let hay = PixelBuffer::from_fn(30, 20, |x, y| {
            if (5..8).contains(&x) && (5..7).contains(&y) {
                almost.pixel(x - 5, y - 5)
            } else {
                BG
            }
        })
        .unwrap();
        // no samples: every candidate goes straight to full verification
        let m = Matcher::with_seed(0, 11);
        assert_eq!(m.find(&hay, &needle(), ScanArea::full()), None);
    }

    #[test]
    fn oversized_needle_is_not_found() {
        let m = Matcher::default();
        let small = PixelBuffer::from_fn(2, 2, |_, _| BG).unwrap();
        assert_eq!(m.find(&small, &needle(), ScanArea::full()), None);
    }

    #[test]
    fn repeated_calls_are_deterministic() {
        let hay = screen_with(50, 50, &[(30, 4), (12, 40)]);
        let m = Matcher::new(DEFAULT_SAMPLE_COUNT);
        let first = m.find(&hay, &needle(), ScanArea::full());
        for _ in 0..5 {
            assert_eq!(m.find(&hay, &needle(), ScanArea::full()), first);
        }
        assert_eq!(first, Some(Point::new(12, 40)));
    }

    #[test]
    fn lower_column_wins_regardless_of_row() {
        let n = PixelBuffer::from_fn(1, 1, |_, _| Rgb::new(1, 2, 3)).unwrap();
        let hay = PixelBuffer::from_fn(10, 10, |x, y| {
            if (x, y) == (1, 5) || (x, y) == (2, 0) {
                Rgb::new(1, 2, 3)
            } else {
                BG
            }
        })
        .unwrap();
        let m = Matcher::with_seed(10, 0);
        assert_eq!(m.find(&hay, &n, ScanArea::full()), Some(Point::new(1, 5)));
    }

    #[test]
    fn limits_keep_result_inside_window() {
        let hay = screen_with(60, 40, &[(5, 5), (30, 20)]);
        let m = Matcher::with_seed(10, 5);
        let area = ScanArea::from(20, 10).limit(15, 15);
        assert_eq!(m.find(&hay, &needle(), area), Some(Point::new(30, 20)));

        // (30, 20) lies exactly on the exclusive edge
        let tight = ScanArea::from(20, 10).limit(10, 15);
        assert_eq!(m.find(&hay, &needle(), tight), None);
    }

    #[test]
    fn around_centers_on_pointer() {
        let area = ScanArea::around(Point::new(50, 3), 4, 5);
        assert_eq!(area, ScanArea::from(46, 0).limit(9, 9));
    }

    #[test]
    fn around_is_cut_at_origin_not_shifted() {
        let hay = screen_with(40, 40, &[(7, 0), (2, 30)]);
        let m = Matcher::with_seed(10, 2);
        let area = ScanArea::around(Point::new(1, 1), 3, 2);
        assert_eq!(area, ScanArea::from(0, 0).limit(5, 4));
        assert_eq!(m.find(&hay, &needle(), area), None);

        // pointer far off the left edge leaves nothing to scan
        let gone = ScanArea::around(Point::new(-20, 5), 3, 2);
        assert_eq!(gone.max_width, Some(0));
        assert_eq!(m.find(&hay, &needle(), gone), None);
    }

    #[test]
    fn find_after_walks_remaining_matches() {
        let hay = screen_with(40, 40, &[(10, 2), (10, 20), (25, 1)]);
        let m = Matcher::with_seed(10, 9);
        let n = needle();
        let first = m.find(&hay, &n, ScanArea::full()).unwrap();
        assert_eq!(first, Point::new(10, 2));
        let second = m.find_after(&hay, &n, first).unwrap();
        assert_eq!(second, Point::new(10, 20));
        let third = m.find_after(&hay, &n, second).unwrap();
        assert_eq!(third, Point::new(25, 1));
        assert_eq!(m.find_after(&hay, &n, third), None);
    }
}
