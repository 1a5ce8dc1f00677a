//! Rendering plots into image frames.

use std::fs;
use std::io;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use grid_bridge_protocol::Frame;

use crate::error::Result;

/// Something that can draw itself into a file.
pub trait PlotSurface {
    /// File extension the renderer expects, without the dot
    fn extension(&self) -> &str;

    fn render_to(&self, path: &Path) -> io::Result<()>;
}

/// SVG markup produced by a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvgDocument {
    markup: String,
}

impl SvgDocument {
    pub fn new<S: Into<String>>(markup: S) -> Self {
        Self {
            markup: markup.into(),
        }
    }
}

impl PlotSurface for SvgDocument {
    fn extension(&self) -> &str {
        "svg"
    }

    fn render_to(&self, path: &Path) -> io::Result<()> {
        fs::write(path, &self.markup)
    }
}

/// Render `surface` into a scratch file and wrap its bytes in an image frame.
///
/// The scratch directory is removed when this returns, on success or error.
pub fn capture_image(surface: &dyn PlotSurface) -> Result<Frame> {
    let scratch = tempfile::Builder::new().prefix("grid-bridge-").tempdir()?;
    let path = scratch.path().join(format!("plot.{}", surface.extension()));

    surface.render_to(&path)?;
    let bytes = fs::read(&path)?;
    tracing::debug!("captured {} byte image from {}", bytes.len(), path.display());

    Ok(Frame::Image(STANDARD.encode(bytes)))
}
