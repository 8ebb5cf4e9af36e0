//! Zero-mean normalised cross-correlation (OpenCV's `TM_CCOEFF_NORMED`) on luma planes.
//!
//! Window sums come from integral images so only the numerator costs
//! `template area` per position. Templates large enough to survive
//! downsampling are searched coarse-to-fine; when the coarse pass cannot be
//! trusted the whole frame is searched at full resolution.

use image::GrayImage;

use super::screen::ScreenPoint;

const MIN_COARSE_SIDE: u32 = 6;
const COARSE_CANDIDATES: usize = 8;
/// Refined score below which the coarse candidates are not trusted.
const COARSE_TRUST: f64 = 0.9;
const EPSILON: f64 = 1e-9;

/// Best placement of a template inside a frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateMatch {
    /// Top-left corner in frame coordinates
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Correlation in `-1.0..=1.0`
    pub score: f32,
}

impl TemplateMatch {
    pub fn center(&self) -> ScreenPoint {
        ScreenPoint::new(
            (self.x + self.width / 2) as i32,
            (self.y + self.height / 2) as i32,
        )
    }
}

struct Plane {
    width: u32,
    height: u32,
    data: Vec<f64>,
}

impl Plane {
    fn from_gray(image: &GrayImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            data: image.as_raw().iter().map(|&v| v as f64).collect(),
        }
    }

    /// Box-filter downsample by an integer factor.
    fn downsample(&self, factor: u32) -> Self {
        let width = self.width / factor;
        let height = self.height / factor;
        let area = (factor * factor) as f64;
        let mut data = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                let mut acc = 0.0;
                for dy in 0..factor {
                    let row = ((y * factor + dy) * self.width) as usize;
                    for dx in 0..factor {
                        acc += self.data[row + (x * factor + dx) as usize];
                    }
                }
                data.push(acc / area);
            }
        }
        Self {
            width,
            height,
            data,
        }
    }
}

struct Integral {
    stride: usize,
    sum: Vec<f64>,
    sq: Vec<f64>,
}

impl Integral {
    fn new(plane: &Plane) -> Self {
        let stride = plane.width as usize + 1;
        let rows = plane.height as usize + 1;
        let mut sum = vec![0.0; stride * rows];
        let mut sq = vec![0.0; stride * rows];
        for y in 0..plane.height as usize {
            let mut row_sum = 0.0;
            let mut row_sq = 0.0;
            for x in 0..plane.width as usize {
                let v = plane.data[y * plane.width as usize + x];
                row_sum += v;
                row_sq += v * v;
                sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row_sum;
                sq[(y + 1) * stride + x + 1] = sq[y * stride + x + 1] + row_sq;
            }
        }
        Self { stride, sum, sq }
    }

    fn window(&self, x: u32, y: u32, w: u32, h: u32) -> (f64, f64) {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        let s = self.stride;
        let pick = |t: &Vec<f64>| t[y1 * s + x1] - t[y0 * s + x1] - t[y1 * s + x0] + t[y0 * s + x0];
        (pick(&self.sum), pick(&self.sq))
    }
}

/// Template prepared for correlation: zero-mean values and their norm.
struct Prepared {
    width: u32,
    height: u32,
    centered: Vec<f64>,
    norm: f64,
}

impl Prepared {
    fn new(plane: &Plane) -> Self {
        let n = plane.data.len() as f64;
        let mean = plane.data.iter().sum::<f64>() / n;
        let centered: Vec<f64> = plane.data.iter().map(|v| v - mean).collect();
        let norm = centered.iter().map(|v| v * v).sum::<f64>().sqrt();
        Self {
            width: plane.width,
            height: plane.height,
            centered,
            norm,
        }
    }
}

fn score_at(frame: &Plane, integral: &Integral, tpl: &Prepared, x: u32, y: u32) -> f64 {
    if tpl.norm < EPSILON {
        return 0.0;
    }
    let n = (tpl.width * tpl.height) as f64;
    let (s, sq) = integral.window(x, y, tpl.width, tpl.height);
    let variance_term = sq - s * s / n;
    if variance_term < EPSILON {
        return 0.0;
    }
    let mut numerator = 0.0;
    for j in 0..tpl.height {
        let frame_row = ((y + j) * frame.width + x) as usize;
        let tpl_row = (j * tpl.width) as usize;
        for i in 0..tpl.width as usize {
            numerator += tpl.centered[tpl_row + i] * frame.data[frame_row + i];
        }
    }
    (numerator / (tpl.norm * variance_term.sqrt())).clamp(-1.0, 1.0)
}

/// Keeps the `limit` best positions, dropping near-duplicates of better ones.
fn push_candidate(best: &mut Vec<(f64, u32, u32)>, limit: usize, spread: u32, cand: (f64, u32, u32)) {
    let close = |a: &(f64, u32, u32)| a.1.abs_diff(cand.1) <= spread && a.2.abs_diff(cand.2) <= spread;
    if let Some(pos) = best.iter().position(close) {
        if best[pos].0 >= cand.0 {
            return;
        }
        best.remove(pos);
    }
    let idx = best.partition_point(|b| b.0 >= cand.0);
    if idx < limit {
        best.insert(idx, cand);
        best.truncate(limit);
    }
}

fn coarse_factor(width: u32, height: u32) -> u32 {
    let side = width.min(height);
    [8, 4, 2]
        .into_iter()
        .find(|f| side / f >= MIN_COARSE_SIDE && side >= 4 * MIN_COARSE_SIDE)
        .unwrap_or(1)
}

/// Finds the best placement of `template` in `frame`.
///
/// Returns `None` only when the template does not fit inside the frame.
pub fn match_template(frame: &GrayImage, template: &GrayImage) -> Option<TemplateMatch> {
    let (fw, fh) = frame.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > fw || th > fh {
        return None;
    }

    let frame_plane = Plane::from_gray(frame);
    let tpl_plane = Plane::from_gray(template);
    let integral = Integral::new(&frame_plane);
    let tpl = Prepared::new(&tpl_plane);

    let full = (0, 0, fw - tw, fh - th);
    let factor = coarse_factor(tw, th);
    if factor > 1 {
        if let Some(windows) = coarse_windows(&frame_plane, &tpl_plane, factor, fw - tw, fh - th) {
            let refined = best_in(&frame_plane, &integral, &tpl, &windows);
            if refined.is_some_and(|(score, _, _)| score >= COARSE_TRUST) {
                return refined.map(|best| to_match(best, tw, th));
            }
        }
    }
    best_in(&frame_plane, &integral, &tpl, &[full]).map(|best| to_match(best, tw, th))
}

/// Full-resolution windows around the best positions of a downsampled search.
/// `None` when the downsampled template has no texture left to correlate.
fn coarse_windows(
    frame: &Plane,
    template: &Plane,
    factor: u32,
    max_x: u32,
    max_y: u32,
) -> Option<Vec<(u32, u32, u32, u32)>> {
    let small_frame = frame.downsample(factor);
    let small_tpl = Prepared::new(&template.downsample(factor));
    if small_tpl.norm < EPSILON {
        return None;
    }
    let small_integral = Integral::new(&small_frame);
    let mut best = Vec::with_capacity(COARSE_CANDIDATES + 1);
    for y in 0..=(small_frame.height - small_tpl.height) {
        for x in 0..=(small_frame.width - small_tpl.width) {
            let score = score_at(&small_frame, &small_integral, &small_tpl, x, y);
            push_candidate(&mut best, COARSE_CANDIDATES, 1, (score, x, y));
        }
    }
    Some(
        best.into_iter()
            .map(|(_, x, y)| {
                let x0 = (x * factor).saturating_sub(factor).min(max_x);
                let y0 = (y * factor).saturating_sub(factor).min(max_y);
                let x1 = (x * factor + factor).min(max_x);
                let y1 = (y * factor + factor).min(max_y);
                (x0, y0, x1, y1)
            })
            .collect(),
    )
}

fn best_in(
    frame: &Plane,
    integral: &Integral,
    tpl: &Prepared,
    windows: &[(u32, u32, u32, u32)],
) -> Option<(f64, u32, u32)> {
    let mut best: Option<(f64, u32, u32)> = None;
    for &(x0, y0, x1, y1) in windows {
        for y in y0..=y1 {
            for x in x0..=x1 {
                let score = score_at(frame, integral, tpl, x, y);
                if best.map_or(true, |(b, _, _)| score > b) {
                    best = Some((score, x, y));
                }
            }
        }
    }
    best
}

fn to_match((score, x, y): (f64, u32, u32), width: u32, height: u32) -> TemplateMatch {
    TemplateMatch {
        x,
        y,
        width,
        height,
        score: score as f32,
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_finds_exact_patch_location() {
        let patch = noise_patch(20, 12, 7);
        let mut frame = flat_frame(200, 120, 90);
        paste(&mut frame, &patch, 131, 47);

        let found = match_template(&frame, &patch).unwrap();
        assert_eq!((found.x, found.y), (131, 47));
        assert!(found.score > 0.99, "score was {}", found.score);
        assert_eq!(found.center(), ScreenPoint::new(141, 53));
    }

    #[test]
    fn test_coarse_to_fine_for_large_templates() {
        let patch = noise_patch(64, 40, 3);
        let mut frame = noise_patch(400, 300, 11);
        paste(&mut frame, &patch, 203, 117);
        assert!(coarse_factor(64, 40) > 1);

        let found = match_template(&frame, &patch).unwrap();
        assert_eq!((found.x, found.y), (203, 117));
        assert!(found.score > 0.99);
    }

    #[test]
    fn test_absent_patch_scores_low() {
        let patch = noise_patch(20, 12, 7);
        let frame = noise_patch(160, 90, 99);
        let found = match_template(&frame, &patch).unwrap();
        assert!(found.score < 0.5, "unexpectedly high score {}", found.score);
    }

    #[test]
    fn test_template_larger_than_frame() {
        let patch = noise_patch(50, 50, 1);
        let frame = flat_frame(40, 40, 0);
        assert!(match_template(&frame, &patch).is_none());
    }

    #[test]
    fn test_flat_regions_do_not_match() {
        let flat = flat_frame(10, 10, 200);
        let frame = flat_frame(50, 50, 200);
        let found = match_template(&frame, &flat).unwrap();
        assert_eq!(found.score, 0.0);
    }

    #[test]
    fn test_fine_detail_lost_when_downsampled_is_still_found() {
        let checker = GrayImage::from_fn(48, 24, |x, y| {
            if (x + y) % 2 == 0 {
                image::Luma([0])
            } else {
                image::Luma([255])
            }
        });
        let mut frame = flat_frame(300, 200, 128);
        paste(&mut frame, &checker, 150, 80);
        assert!(coarse_factor(48, 24) > 1);

        let found = match_template(&frame, &checker).unwrap();
        assert_eq!((found.x, found.y), (150, 80));
        assert!(found.score > 0.99, "score was {}", found.score);
    }
}
