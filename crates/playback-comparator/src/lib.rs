//! Screenshot Comparator (C1).
//!
//! Pixel + structural similarity between a recorded and current capture,
//! diff-region extraction, and template search for locating a drifted
//! element in a larger frame. See `SPEC_FULL.md` §4.1.
#![warn(missing_docs)]

use playback_adapters::Frame;
use playback_types::BoundingBox;

/// Tuning for [`compare`] and [`quick_compare`].
#[derive(Clone, Copy, Debug)]
pub struct ComparatorConfig {
    /// Per-channel Euclidean distance below which two pixels are considered
    /// a match for the pixel-similarity pass.
    pub pixel_tau: f64,
    /// Similarity threshold at/above which `CompareResult::match_` is true.
    pub match_threshold: f64,
    /// Padding (pixels) added around a focus region before extraction.
    pub focus_padding: f64,
    /// Minimum contiguous mismatch-blob size to report as a diff region.
    pub noise_threshold: usize,
}

impl Default for ComparatorConfig {
    fn default() -> Self {
        Self {
            pixel_tau: 32.0,
            match_threshold: 0.85,
            focus_padding: 8.0,
            noise_threshold: 16,
        }
    }
}

/// Method used to produce a [`CompareResult`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareMethod {
    /// Full pixel + structural comparison over the focus region.
    FocusRegion,
    /// Cheaper single-pass comparison intended for the per-step hot path.
    Quick,
    /// Failure path: capture or decode error, no comparison performed.
    Inconclusive,
}

/// Result of comparing a recorded capture against a current one.
#[derive(Clone, Debug)]
pub struct CompareResult {
    /// Whether `similarity >= match_threshold`.
    pub is_match: bool,
    /// Combined similarity score in `[0, 1]`.
    pub similarity: f64,
    /// Axis-aligned regions of significant mismatch, in the focus region's
    /// own coordinate space.
    pub diff_regions: Vec<BoundingBox>,
    /// Whether the recorded element still appears to be rendered at all.
    pub element_visible: bool,
    /// Whether the element appears to have moved (a single large diff blob
    /// off-center from the recorded bounds).
    pub element_moved: bool,
    /// Best-guess corrected bounds if `element_moved`.
    pub new_bounds: Option<BoundingBox>,
    /// Confidence in this result, `[0, 1]`.
    pub confidence: f64,
    /// Which comparison path produced this result.
    pub method: CompareMethod,
}

impl CompareResult {
    fn inconclusive() -> Self {
        Self {
            is_match: false,
            similarity: 0.0,
            diff_regions: Vec::new(),
            element_visible: false,
            element_moved: false,
            new_bounds: None,
            confidence: 0.0,
            method: CompareMethod::Inconclusive,
        }
    }
}

fn luminance(px: [u8; 4]) -> f64 {
    0.299 * px[0] as f64 + 0.587 * px[1] as f64 + 0.114 * px[2] as f64
}

fn pixel_distance(a: [u8; 4], b: [u8; 4]) -> f64 {
    let dr = a[0] as f64 - b[0] as f64;
    let dg = a[1] as f64 - b[1] as f64;
    let db = a[2] as f64 - b[2] as f64;
    (dr * dr + dg * dg + db * db).sqrt()
}

/// Pixel-level similarity: fraction of co-located pixel pairs whose
/// per-channel Euclidean distance is within `tau`.
#[must_use]
pub fn pixel_similarity(a: &Frame, b: &Frame, tau: f64) -> f64 {
    let w = a.width.min(b.width);
    let h = a.height.min(b.height);
    if w == 0 || h == 0 {
        return 0.0;
    }
    let mut matches = 0usize;
    let total = w as usize * h as usize;
    for y in 0..h {
        for x in 0..w {
            let pa = a.pixel(x, y).unwrap_or([0, 0, 0, 0]);
            let pb = b.pixel(x, y).unwrap_or([0, 0, 0, 0]);
            if pixel_distance(pa, pb) <= tau {
                matches += 1;
            }
        }
    }
    matches as f64 / total as f64
}

/// Structural similarity over the overlapping region of two frames,
/// computed from luminance means/variances/covariance with the standard
/// SSIM stabilising constants (scaled to an 8-bit dynamic range).
#[must_use]
pub fn structural_similarity(a: &Frame, b: &Frame) -> f64 {
    let w = a.width.min(b.width);
    let h = a.height.min(b.height);
    if w == 0 || h == 0 {
        return 0.0;
    }
    let n = (w as usize * h as usize) as f64;
    let mut sum_a = 0.0;
    let mut sum_b = 0.0;
    let mut lum_a = Vec::with_capacity(n as usize);
    let mut lum_b = Vec::with_capacity(n as usize);
    for y in 0..h {
        for x in 0..w {
            let la = luminance(a.pixel(x, y).unwrap_or([0, 0, 0, 0]));
            let lb = luminance(b.pixel(x, y).unwrap_or([0, 0, 0, 0]));
            sum_a += la;
            sum_b += lb;
            lum_a.push(la);
            lum_b.push(lb);
        }
    }
    let mean_a = sum_a / n;
    let mean_b = sum_b / n;

    let mut var_a = 0.0;
    let mut var_b = 0.0;
    let mut covar = 0.0;
    for i in 0..lum_a.len() {
        let da = lum_a[i] - mean_a;
        let db = lum_b[i] - mean_b;
        var_a += da * da;
        var_b += db * db;
        covar += da * db;
    }
    var_a /= n;
    var_b /= n;
    covar /= n;

    // Standard SSIM stabilising constants for dynamic range L=255: (K1*L)^2, (K2*L)^2
    // with K1=0.01, K2=0.03.
    let l = 255.0_f64;
    let c1 = (0.01 * l).powi(2);
    let c2 = (0.03 * l).powi(2);

    let numerator = (2.0 * mean_a * mean_b + c1) * (2.0 * covar + c2);
    let denominator = (mean_a.powi(2) + mean_b.powi(2) + c1) * (var_a + var_b + c2);
    if denominator <= 0.0 {
        return 1.0;
    }
    (numerator / denominator).clamp(-1.0, 1.0).max(0.0)
}

fn mismatch_map(a: &Frame, b: &Frame, tau: f64) -> (Vec<bool>, u32, u32) {
    let w = a.width.min(b.width);
    let h = a.height.min(b.height);
    let mut map = vec![false; w as usize * h as usize];
    for y in 0..h {
        for x in 0..w {
            let pa = a.pixel(x, y).unwrap_or([0, 0, 0, 0]);
            let pb = b.pixel(x, y).unwrap_or([0, 0, 0, 0]);
            if pixel_distance(pa, pb) > tau {
                map[(y * w + x) as usize] = true;
            }
        }
    }
    (map, w, h)
}

/// Flood-fill the mismatch map into axis-aligned bounding blobs, discarding
/// any blob smaller than `noise_threshold` pixels.
fn diff_regions_from_map(map: &[bool], w: u32, h: u32, noise_threshold: usize) -> Vec<BoundingBox> {
    let mut visited = vec![false; map.len()];
    let mut regions = Vec::new();
    let idx = |x: u32, y: u32| (y * w + x) as usize;

    for y in 0..h {
        for x in 0..w {
            let i = idx(x, y);
            if visited[i] || !map[i] {
                continue;
            }
            // BFS flood fill.
            let mut stack = vec![(x, y)];
            visited[i] = true;
            let mut min_x = x;
            let mut max_x = x;
            let mut min_y = y;
            let mut max_y = y;
            let mut size = 0usize;
            while let Some((cx, cy)) = stack.pop() {
                size += 1;
                min_x = min_x.min(cx);
                max_x = max_x.max(cx);
                min_y = min_y.min(cy);
                max_y = max_y.max(cy);
                let neighbors = [
                    (cx.wrapping_sub(1), cy),
                    (cx + 1, cy),
                    (cx, cy.wrapping_sub(1)),
                    (cx, cy + 1),
                ];
                for (nx, ny) in neighbors {
                    if nx < w && ny < h {
                        let ni = idx(nx, ny);
                        if !visited[ni] && map[ni] {
                            visited[ni] = true;
                            stack.push((nx, ny));
                        }
                    }
                }
            }
            if size >= noise_threshold {
                regions.push(BoundingBox::new(
                    min_x as f64,
                    min_y as f64,
                    (max_x - min_x + 1) as f64,
                    (max_y - min_y + 1) as f64,
                ));
            }
        }
    }
    regions
}

/// Compare a recorded capture against a current one, optionally focused on
/// the recorded target's bounds. Never panics; capture/decode failures are
/// the caller's responsibility to avoid (this function only sees already
/// decoded [`Frame`]s) — absent data is treated as inconclusive.
#[must_use]
pub fn compare(
    recorded: Option<&Frame>,
    current: Option<&Frame>,
    focus: Option<BoundingBox>,
    cfg: ComparatorConfig,
) -> CompareResult {
    let (Some(recorded), Some(current)) = (recorded, current) else {
        return CompareResult::inconclusive();
    };

    let (rec_region, cur_region) = match focus {
        Some(bounds) => (
            recorded.extract_region(bounds, cfg.focus_padding),
            current.extract_region(bounds, cfg.focus_padding),
        ),
        None => (recorded.clone(), current.clone()),
    };

    let pixel = pixel_similarity(&rec_region, &cur_region, cfg.pixel_tau);
    let structural = structural_similarity(&rec_region, &cur_region);
    let similarity = (pixel + structural) / 2.0;
    let is_match = similarity >= cfg.match_threshold;

    let (map, w, h) = mismatch_map(&rec_region, &cur_region, cfg.pixel_tau);
    let diff_regions = diff_regions_from_map(&map, w, h, cfg.noise_threshold);

    let element_visible = !diff_regions
        .iter()
        .any(|r| r.area() >= 0.9 * (w as f64 * h as f64));
    // A single dominant diff blob suggests the element moved rather than
    // changed in place; report its bounds translated back into the focus
    // region's coordinate space.
    let element_moved = !is_match
        && diff_regions.len() == 1
        && diff_regions[0].area() >= 0.2 * (w as f64 * h as f64);
    let new_bounds = if element_moved {
        focus.map(|f| {
            let r = &diff_regions[0];
            BoundingBox::new(
                f.x - cfg.focus_padding + r.x,
                f.y - cfg.focus_padding + r.y,
                r.width,
                r.height,
            )
        })
    } else {
        None
    };

    let confidence = if is_match {
        similarity
    } else {
        (1.0 - similarity).min(similarity)
    };

    CompareResult {
        is_match,
        similarity,
        diff_regions,
        element_visible,
        element_moved,
        new_bounds,
        confidence,
        method: CompareMethod::FocusRegion,
    }
}

/// Cheaper comparison intended for the playback engine's per-step hot path
/// (§4.9 step 4): same math as [`compare`] but always treats the whole
/// frame as the region (no focus extraction overhead beyond what the
/// caller already captured).
#[must_use]
pub fn quick_compare(recorded: Option<&Frame>, current: Option<&Frame>, cfg: ComparatorConfig) -> CompareResult {
    let mut result = compare(recorded, current, None, cfg);
    result.method = CompareMethod::Quick;
    result
}

/// Slide `template` over `frame` at the given `stride`, scoring each
/// position by pixel-match fraction. Returns the best-scoring box (in
/// `frame`'s coordinate space) if its score is `>= 0.7`, else `None`.
#[must_use]
pub fn template_search(frame: &Frame, template: &Frame, stride: u32) -> Option<(BoundingBox, f64)> {
    if template.width == 0
        || template.height == 0
        || template.width > frame.width
        || template.height > frame.height
    {
        return None;
    }
    let stride = stride.max(1);
    let mut best_score = 0.0;
    let mut best_pos = (0u32, 0u32);

    let max_x = frame.width - template.width;
    let max_y = frame.height - template.height;
    let mut y = 0;
    while y <= max_y {
        let mut x = 0;
        while x <= max_x {
            let mut matches = 0usize;
            let total = template.width as usize * template.height as usize;
            for ty in 0..template.height {
                for tx in 0..template.width {
                    let fp = frame.pixel(x + tx, y + ty).unwrap_or([0, 0, 0, 0]);
                    let tp = template.pixel(tx, ty).unwrap_or([0, 0, 0, 0]);
                    if pixel_distance(fp, tp) <= 32.0 {
                        matches += 1;
                    }
                }
            }
            let score = matches as f64 / total as f64;
            if score > best_score {
                best_score = score;
                best_pos = (x, y);
            }
            x += stride;
        }
        y += stride;
    }

    if best_score >= 0.7 {
        Some((
            BoundingBox::new(
                best_pos.0 as f64,
                best_pos.1 as f64,
                template.width as f64,
                template.height as f64,
            ),
            best_score,
        ))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_frames_are_a_perfect_match() {
        let f = Frame::solid(16, 16, [100, 150, 200, 255]);
        let result = compare(Some(&f), Some(&f), None, ComparatorConfig::default());
        assert!(result.is_match);
        assert!((result.similarity - 1.0).abs() < 1e-9);
    }

    #[test]
    fn inverted_colors_do_not_match() {
        let a = Frame::solid(16, 16, [10, 10, 10, 255]);
        let b = Frame::solid(16, 16, [245, 245, 245, 255]);
        let result = compare(Some(&a), Some(&b), None, ComparatorConfig::default());
        assert!(!result.is_match);
    }

    #[test]
    fn missing_capture_is_inconclusive() {
        let result = compare(None, None, None, ComparatorConfig::default());
        assert_eq!(result.similarity, 0.0);
        assert!(!result.is_match);
        assert_eq!(result.method, CompareMethod::Inconclusive);
    }

    #[test]
    fn template_search_finds_exact_translation() {
        let mut pixels = vec![0u8; 40 * 40 * 4];
        for y in 10..20 {
            for x in 10..20 {
                let idx = (y * 40 + x) * 4;
                pixels[idx] = 255;
                pixels[idx + 1] = 0;
                pixels[idx + 2] = 0;
                pixels[idx + 3] = 255;
            }
        }
        let frame = Frame::new(pixels, 40, 40);
        let template = frame.extract_region(BoundingBox::new(10.0, 10.0, 10.0, 10.0), 0.0);
        let found = template_search(&frame, &template, 2).expect("template should be found");
        assert!((found.0.x - 10.0).abs() <= 2.0);
        assert!((found.0.y - 10.0).abs() <= 2.0);
        assert!(found.1 >= 0.99);
    }

    #[test]
    fn diff_regions_ignore_noise_below_threshold() {
        let mut cfg = ComparatorConfig::default();
        cfg.noise_threshold = 1000;
        let mut a_pixels = vec![0u8; 20 * 20 * 4];
        for p in a_pixels.chunks_mut(4) {
            p[3] = 255;
        }
        let mut b_pixels = a_pixels.clone();
        // Flip a single pixel: below noise threshold, should be ignored.
        b_pixels[0] = 255;
        let a = Frame::new(a_pixels, 20, 20);
        let b = Frame::new(b_pixels, 20, 20);
        let result = compare(Some(&a), Some(&b), None, cfg);
        assert!(result.diff_regions.is_empty());
    }
}
