use serde::{Deserialize, Serialize};

/// Length unit an assembler lays its pages out in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    Point,
    Mm,
}

impl UnitSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitSystem::Point => "pt",
            UnitSystem::Mm => "mm",
        }
    }

    /// Length of one unit in PDF points
    pub fn points_per_unit(&self) -> f64 {
        match self {
            UnitSystem::Point => 1.0,
            UnitSystem::Mm => 72.0 / 25.4,
        }
    }

    pub fn to_points(&self, v: f64) -> f64 {
        v * self.points_per_unit()
    }

    pub fn from_points(&self, pt: f64) -> f64 {
        pt / self.points_per_unit()
    }

    /// Converts a length expressed in `self` into `target` units.
    pub fn convert(&self, v: f64, target: UnitSystem) -> f64 {
        target.from_points(self.to_points(v))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn convert(&self, from: UnitSystem, to: UnitSystem) -> Size {
        Size {
            width: from.convert(self.width, to),
            height: from.convert(self.height, to),
        }
    }
}

/// Placement rectangle, origin at the page's lower-left corner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Size envelope for pages generated around a single image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageBounds {
    /// total padding (split evenly on both sides of each axis)
    pub padding: f64,
    pub max: Size,
    /// normally the organization's standard letter size
    pub min: Size,
}

impl PageBounds {
    pub fn convert(&self, from: UnitSystem, to: UnitSystem) -> PageBounds {
        PageBounds {
            padding: from.convert(self.padding, to),
            max: self.max.convert(from, to),
            min: self.min.convert(from, to),
        }
    }
}

/// Result of fitting an image: the page to create and where to draw on it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePlacement {
    pub page: Size,
    pub rect: Rect,
    pub scale: f64,
}

/// Computes a page that holds the whole image, shrinking it uniformly when the
/// padded image exceeds `bounds.max` and growing the page (not the image) up to
/// `bounds.min`. The image is always drawn in full and centered.
///
/// `width`/`height` must be positive.
pub fn fit_image(width: f64, height: f64, bounds: &PageBounds) -> ImagePlacement {
    let p = bounds.padding;

    let mut page_w = width + p;
    let mut page_h = height + p;

    if page_w > bounds.max.width || page_h > bounds.max.height {
        let s = ((bounds.max.width - p) / width).min((bounds.max.height - p) / height);
        page_w = width * s + p;
        page_h = height * s + p;
    }

    page_w = page_w.max(bounds.min.width);
    page_h = page_h.max(bounds.min.height);

    let scale = contain_scale(width, height, page_w - p, page_h - p);
    let draw_w = width * scale;
    let draw_h = height * scale;

    ImagePlacement {
        page: Size::new(page_w, page_h),
        rect: Rect {
            x: (page_w - draw_w) / 2.0,
            y: (page_h - draw_h) / 2.0,
            width: draw_w,
            height: draw_h,
        },
        scale,
    }
}

/// Largest uniform scale at which `width`×`height` fits inside the box.
pub fn contain_scale(width: f64, height: f64, box_w: f64, box_h: f64) -> f64 {
    (box_w / width).min(box_h / height)
}

/// Fits content into `area` (contain + center), without a page of its own.
pub fn fit_into(width: f64, height: f64, area: Rect) -> Rect {
    let s = contain_scale(width, height, area.width, area.height);
    let (w, h) = (width * s, height * s);
    Rect {
        x: area.x + (area.width - w) / 2.0,
        y: area.y + (area.height - h) / 2.0,
        width: w,
        height: h,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LETTER: Size = Size::new(612.0, 792.0);
    const TABLOID: Size = Size::new(792.0, 1224.0);

    fn bounds() -> PageBounds {
        PageBounds { padding: 40.0, max: TABLOID, min: LETTER }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.01
    }

    #[test]
    fn large_photo_is_shrunk_then_clamped_to_minimum_height() {
        let fit = fit_image(4000.0, 3000.0, &bounds());

        assert!(approx(fit.page.width, 792.0));
        assert!(approx(fit.page.height, 792.0));
        assert!(approx(fit.scale, 0.188));
        assert!(approx(fit.rect.width, 752.0));
        assert!(approx(fit.rect.height, 564.0));
        assert!(approx(fit.rect.x, 20.0));
        assert!(approx(fit.rect.y, 114.0));
    }

    #[test]
    fn small_image_is_centered_on_minimum_page() {
        let fit = fit_image(100.0, 50.0, &bounds());

        assert_eq!(fit.page, LETTER);
        // interior is 572x752, so the image is scaled to the interior width
        assert!(approx(fit.scale, 5.72));
        assert!(approx(fit.rect.x, 20.0));
        assert!(approx(fit.rect.y, (792.0 - 286.0) / 2.0));
    }

    #[test]
    fn image_within_envelope_keeps_tight_page() {
        let fit = fit_image(700.0, 1000.0, &bounds());

        assert!(approx(fit.page.width, 740.0));
        assert!(approx(fit.page.height, 1040.0));
        assert!(approx(fit.scale, 1.0));
    }

    #[test]
    fn draw_rect_never_leaves_the_page_interior() {
        let b = bounds();
        let sizes = [
            (1.0, 1.0),
            (1.0, 20000.0),
            (20000.0, 1.0),
            (612.0, 792.0),
            (3024.0, 4032.0),
            (12000.0, 9000.0),
            (571.0, 753.0),
        ];
        for (w, h) in sizes {
            let fit = fit_image(w, h, &b);
            let half = b.padding / 2.0;
            assert!(fit.page.width <= b.max.width + 1e-6 || fit.page.width == b.min.width);
            assert!(fit.page.height <= b.max.height + 1e-6 || fit.page.height == b.min.height);
            assert!(fit.rect.x >= half - 1e-6, "{w}x{h}");
            assert!(fit.rect.y >= half - 1e-6, "{w}x{h}");
            assert!(fit.rect.x + fit.rect.width <= fit.page.width - half + 1e-6);
            assert!(fit.rect.y + fit.rect.height <= fit.page.height - half + 1e-6);
            // aspect ratio preserved
            assert!((fit.rect.width / fit.rect.height - w / h).abs() / (w / h) < 1e-9);
        }
    }

    #[test]
    fn millimeter_geometry_matches_point_geometry() {
        let pt = fit_image(4000.0, 3000.0, &bounds());

        let mm_bounds = bounds().convert(UnitSystem::Point, UnitSystem::Mm);
        let w_mm = UnitSystem::Point.convert(4000.0, UnitSystem::Mm);
        let h_mm = UnitSystem::Point.convert(3000.0, UnitSystem::Mm);
        let mm = fit_image(w_mm, h_mm, &mm_bounds);

        assert!(approx(UnitSystem::Mm.to_points(mm.page.width), pt.page.width));
        assert!(approx(UnitSystem::Mm.to_points(mm.page.height), pt.page.height));
        assert!(approx(UnitSystem::Mm.to_points(mm.rect.y), pt.rect.y));
    }

    #[test]
    fn fit_into_centers_inside_area() {
        let area = Rect { x: 72.0, y: 656.0, width: 64.0, height: 64.0 };
        let r = fit_into(200.0, 100.0, area);
        assert!(approx(r.width, 64.0));
        assert!(approx(r.height, 32.0));
        assert!(approx(r.y, 672.0));
    }
}
