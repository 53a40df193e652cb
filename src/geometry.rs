//! Page geometry: boxes, named sizes, transformation matrices and the
//! scale-to-fit placement of a source page on a target page.

use lopdf::Object;

/// Points per millimetre (72 points = 1 inch = 25.4 mm).
const PT_PER_MM: f32 = 72.0 / 25.4;

/// A5 portrait width in points.
pub const A5_WIDTH: f32 = 419.53;
/// A5 portrait height in points.
pub const A5_HEIGHT: f32 = 595.28;

pub fn mm_to_pt(mm: f32) -> f32 {
    mm * PT_PER_MM
}

/// Named paper sizes, portrait orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSize {
    A3,
    A4,
    A5,
    A6,
    Letter,
    Legal,
}

impl PageSize {
    /// Portrait (width, height) in points.
    pub fn dimensions(&self) -> (f32, f32) {
        match self {
            PageSize::A3 => (841.89, 1190.55),
            PageSize::A4 => (595.28, 841.89),
            PageSize::A5 => (A5_WIDTH, A5_HEIGHT),
            PageSize::A6 => (297.64, 419.53),
            PageSize::Letter => (612.0, 792.0),
            PageSize::Legal => (612.0, 1008.0),
        }
    }

    /// (width, height) in points, swapped when `landscape` is set.
    pub fn oriented(&self, landscape: bool) -> (f32, f32) {
        let (w, h) = self.dimensions();
        if landscape {
            (h, w)
        } else {
            (w, h)
        }
    }
}

/// A normalized PDF rectangle (`llx <= urx`, `lly <= ury`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub llx: f32,
    pub lly: f32,
    pub urx: f32,
    pub ury: f32,
}

impl PageBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        PageBox {
            llx: x1.min(x2),
            lly: y1.min(y2),
            urx: x1.max(x2),
            ury: y1.max(y2),
        }
    }

    /// Parse a `[x1 y1 x2 y2]` array. Returns `None` unless all four entries are numbers.
    pub fn from_object(obj: &Object) -> Option<Self> {
        let arr = obj.as_array().ok()?;
        if arr.len() != 4 {
            return None;
        }
        let n: Vec<f32> = arr.iter().filter_map(extract_number).collect();
        if n.len() != 4 || n.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(PageBox::new(n[0], n[1], n[2], n[3]))
    }

    pub fn width(&self) -> f32 {
        self.urx - self.llx
    }

    pub fn height(&self) -> f32 {
        self.ury - self.lly
    }

    /// Overlap of two boxes, or `None` if they are disjoint.
    pub fn intersect(&self, other: &PageBox) -> Option<PageBox> {
        let llx = self.llx.max(other.llx);
        let lly = self.lly.max(other.lly);
        let urx = self.urx.min(other.urx);
        let ury = self.ury.min(other.ury);
        if urx <= llx || ury <= lly {
            return None;
        }
        Some(PageBox { llx, lly, urx, ury })
    }

    pub fn to_object(&self) -> Object {
        Object::Array(vec![
            Object::Real(self.llx),
            Object::Real(self.lly),
            Object::Real(self.urx),
            Object::Real(self.ury),
        ])
    }

    /// Bounding box of this rectangle after transformation by `m`.
    pub fn transformed(&self, m: &Matrix) -> PageBox {
        let corners = [
            m.transform_point(self.llx, self.lly),
            m.transform_point(self.urx, self.lly),
            m.transform_point(self.llx, self.ury),
            m.transform_point(self.urx, self.ury),
        ];
        let mut out = PageBox {
            llx: f32::INFINITY,
            lly: f32::INFINITY,
            urx: f32::NEG_INFINITY,
            ury: f32::NEG_INFINITY,
        };
        for (x, y) in corners {
            out.llx = out.llx.min(x);
            out.lly = out.lly.min(y);
            out.urx = out.urx.max(x);
            out.ury = out.ury.max(y);
        }
        out
    }
}

/// 2D transformation matrix [a, b, c, d, e, f]
/// Represents: | a b 0 |
///             | c d 0 |
///             | e f 1 |
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Matrix {
    pub fn identity() -> Self {
        Matrix {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: 0.0,
            f: 0.0,
        }
    }

    pub fn translate(tx: f32, ty: f32) -> Self {
        Matrix {
            e: tx,
            f: ty,
            ..Matrix::identity()
        }
    }

    pub fn scale(sx: f32, sy: f32) -> Self {
        Matrix {
            a: sx,
            d: sy,
            ..Matrix::identity()
        }
    }

    /// Maps an unrotated `width` x `height` page, origin at (0, 0), onto the
    /// upright view produced by a `/Rotate` of `degrees` (clockwise).
    pub fn page_rotation(degrees: u16, width: f32, height: f32) -> Self {
        match degrees {
            90 => Matrix {
                a: 0.0,
                b: -1.0,
                c: 1.0,
                d: 0.0,
                e: 0.0,
                f: width,
            },
            180 => Matrix {
                a: -1.0,
                b: 0.0,
                c: 0.0,
                d: -1.0,
                e: width,
                f: height,
            },
            270 => Matrix {
                a: 0.0,
                b: 1.0,
                c: -1.0,
                d: 0.0,
                e: height,
                f: 0.0,
            },
            _ => Matrix::identity(),
        }
    }

    /// Parse a `[a b c d e f]` array.
    pub fn from_object(obj: &Object) -> Option<Self> {
        let arr = obj.as_array().ok()?;
        if arr.len() != 6 {
            return None;
        }
        let n: Vec<f32> = arr.iter().filter_map(extract_number).collect();
        if n.len() != 6 {
            return None;
        }
        Some(Matrix {
            a: n[0],
            b: n[1],
            c: n[2],
            d: n[3],
            e: n[4],
            f: n[5],
        })
    }

    /// Concatenate another matrix: self * other
    pub fn concat(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    pub fn transform_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x * self.a + y * self.c + self.e,
            x * self.b + y * self.d + self.f,
        )
    }

    /// The six operands of a `cm` operator.
    pub fn to_operands(&self) -> String {
        [self.a, self.b, self.c, self.d, self.e, self.f]
            .iter()
            .map(|v| format_number(*v))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Where a scaled source page lands on the target page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub scale: f32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Uniform scale-to-fit of a `width` x `height` page into `target_width` x
/// `target_height`, centered. Returns `None` for empty or non-finite sizes.
pub fn fit_centered(
    width: f32,
    height: f32,
    target_width: f32,
    target_height: f32,
) -> Option<Placement> {
    if !(width > 0.0 && height > 0.0 && width.is_finite() && height.is_finite()) {
        return None;
    }
    let scale = (target_width / width).min(target_height / height);
    let scaled_width = width * scale;
    let scaled_height = height * scale;
    Some(Placement {
        scale,
        x: ((target_width - scaled_width) / 2.0).max(0.0),
        y: ((target_height - scaled_height) / 2.0).max(0.0),
        width: scaled_width,
        height: scaled_height,
    })
}

/// Matrix drawing a page's form space (`view` box, `rotate` degrees) at `placement`.
pub fn placement_matrix(view: &PageBox, rotate: u16, placement: &Placement) -> Matrix {
    Matrix::translate(-view.llx, -view.lly)
        .concat(&Matrix::page_rotation(rotate, view.width(), view.height()))
        .concat(&Matrix::scale(placement.scale, placement.scale))
        .concat(&Matrix::translate(placement.x, placement.y))
}

/// Normalize a `/Rotate` value to 0, 90, 180 or 270.
pub fn normalize_rotation(value: i64) -> u16 {
    let r = value.rem_euclid(360);
    // Non-multiples of 90 are invalid; round down like most viewers.
    (r - r % 90) as u16
}

pub fn extract_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Significant digits written for content stream numbers; about what an
/// `f32` carries.
const SIGNIFICANT_DIGITS: i32 = 7;

/// Compact decimal form for content streams ("1", "0.5", "-12.25").
///
/// Precision follows magnitude, so tiny scale factors keep their
/// significant digits instead of rounding to a fixed number of decimals.
pub fn format_number(value: f32) -> String {
    if value == 0.0 || !value.is_finite() {
        return "0".to_string();
    }
    let magnitude = value.abs().log10().floor() as i32;
    let decimals = (SIGNIFICANT_DIGITS - 1 - magnitude).clamp(0, 12) as usize;
    let s = format!("{:.*}", decimals, value);
    let s = if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s.as_str()
    };
    match s {
        "-0" | "" => "0".to_string(),
        _ => s.to_string(),
    }
}
