//! Shape engine: grammar gate, rasterization, ink cost, fingerprints.
//!
//! The engine turns a path description plus fill and stroke into a
//! [`RenderedShape`]: the normalized spec, its pixel coverage, and its
//! ink cost. Validation everywhere in the chain goes through
//! [`evaluate`], so every miner derives identical coverage and cost for
//! the same shape.

use serde::{Deserialize, Serialize};

use crate::config::CanvasSettings;
use crate::types::{md5_hex, ShapeHash};

pub mod path;
pub mod raster;

pub use raster::{Coverage, Pixel};

/// Maximum accepted length of a path string, in bytes.
pub const MAX_SHAPE_PATH_BYTES: usize = 128;

/// The fill/stroke value that means "draw nothing here".
pub const TRANSPARENT: &str = "transparent";

/// Errors produced while interpreting a shape description.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ShapeError {
    /// The path string does not conform to the grammar, or the fill
    /// rules are violated (open filled subpath, fully transparent shape).
    InvalidPath(String),
    /// The path string exceeds [`MAX_SHAPE_PATH_BYTES`].
    TooLong(String),
    /// A pen position lies outside the canvas rectangle.
    OutOfBounds,
}

impl std::fmt::Display for ShapeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShapeError::InvalidPath(s) => write!(f, "bad shape svg string [{s}]"),
            ShapeError::TooLong(s) => write!(f, "shape svg string too long [{s}]"),
            ShapeError::OutOfBounds => write!(f, "shape is outside the bounds of the canvas"),
        }
    }
}

impl std::error::Error for ShapeError {}

/// A shape as submitted by an art node: path description plus paint.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ShapeSpec {
    /// Normalized path string (single-space separated tokens).
    pub path: String,
    /// Fill paint; `"transparent"` for stroke-only shapes.
    pub fill: String,
    /// Stroke paint; `"transparent"` for fill-only shapes.
    pub stroke: String,
}

impl ShapeSpec {
    /// `true` when the interior is not painted.
    pub fn transparent_fill(&self) -> bool {
        self.fill == TRANSPARENT
    }

    /// The shape fingerprint: hex MD5 over the canonical encoding of
    /// (normalized path, fill, stroke).
    pub fn hash(&self) -> ShapeHash {
        let cfg = bincode::config::standard();
        let bytes = bincode::serde::encode_to_vec(self, cfg)
            .expect("shape specs should always be serializable");
        ShapeHash(md5_hex(&bytes))
    }

    /// Renders the shape as an SVG path element.
    pub fn svg_string(&self) -> String {
        format!(
            "<path d=\"{}\" stroke=\"{}\" fill=\"{}\"/>",
            self.path, self.stroke, self.fill
        )
    }
}

/// A fully evaluated shape: spec, coverage, and ink cost.
#[derive(Clone, Debug)]
pub struct RenderedShape {
    pub spec: ShapeSpec,
    pub coverage: Coverage,
    pub cost: u32,
}

impl RenderedShape {
    pub fn hash(&self) -> ShapeHash {
        self.spec.hash()
    }
}

/// Interprets a shape description against the canvas.
///
/// Checks, in order: path length, the all-transparent rejection, grammar,
/// bounds, and (for filled shapes) closure of every drawing subpath.
/// Returns the rendered shape with its coverage and cost.
pub fn evaluate(
    path_str: &str,
    fill: &str,
    stroke: &str,
    canvas: &CanvasSettings,
) -> Result<RenderedShape, ShapeError> {
    if path_str.len() > MAX_SHAPE_PATH_BYTES {
        return Err(ShapeError::TooLong(path_str.to_string()));
    }
    if fill == TRANSPARENT && stroke == TRANSPARENT {
        return Err(ShapeError::InvalidPath(path_str.to_string()));
    }

    let subpaths = path::parse(path_str)?;
    let filled = fill != TRANSPARENT;

    if filled {
        for sub in &subpaths {
            if sub.has_segments() && !sub.is_closed() {
                // Fill requires a closed polygon.
                return Err(ShapeError::InvalidPath(path_str.to_string()));
            }
        }
    }

    let coverage = raster::rasterize(&subpaths, canvas, filled)?;
    let cost = coverage.cost();

    let spec = ShapeSpec {
        path: path::normalize(path_str),
        fill: fill.to_string(),
        stroke: stroke.to_string(),
    };

    Ok(RenderedShape {
        spec,
        coverage,
        cost,
    })
}
