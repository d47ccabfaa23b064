use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::color::Color;
use crate::error::RunError;

/// Identifies one run so its response cannot be attributed to another request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RunId(pub u64);

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A request to evaluate `program` over a `grid_size` × `grid_size` grid.
///
/// The grid size is signed on the wire so that nonsense sizes arrive intact
/// and are rejected with a message instead of a parse failure.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RunRequest {
    pub program: String,
    pub grid_size: i64,
}

/// Packed RGBA pixels, row-major, `grid_size² × 4` bytes.
///
/// Not `Clone`: handing a buffer to a receiver moves it.
#[derive(Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    grid_size: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap raw bytes. Returns `None` when the length is not `grid_size² × 4`.
    pub fn new(grid_size: u32, data: Vec<u8>) -> Option<Self> {
        let side = grid_size as usize;
        (data.len() == side * side * 4).then_some(Self { grid_size, data })
    }

    pub fn grid_size(&self) -> u32 {
        self.grid_size
    }

    /// Color at `(x, y)`, or `None` outside the grid.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        if x >= self.grid_size || y >= self.grid_size {
            return None;
        }
        let offset = (y as usize * self.grid_size as usize + x as usize) * 4;
        match self.data.get(offset..offset + 4)? {
            &[r, g, b, a] => Some(Color { r, g, b, a }),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn into_image(self) -> Option<image::RgbaImage> {
        image::RgbaImage::from_raw(self.grid_size, self.grid_size, self.data)
    }
}

/// Outcome of one run: exactly one per request.
#[derive(Debug)]
pub enum RunResponse {
    Pixels(PixelBuffer),
    Error { message: String },
}

impl From<Result<PixelBuffer, RunError>> for RunResponse {
    fn from(result: Result<PixelBuffer, RunError>) -> Self {
        match result {
            Ok(buffer) => Self::Pixels(buffer),
            Err(e) => Self::Error { message: e.user_message() },
        }
    }
}

// ── JSON-line envelope ───────────────────────────────────────────

/// A run request as read from the JSON wire.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct WireRequest {
    pub id: RunId,
    pub program: String,
    pub grid_size: i64,
}

impl WireRequest {
    pub fn into_parts(self) -> (RunId, RunRequest) {
        (
            self.id,
            RunRequest {
                program: self.program,
                grid_size: self.grid_size,
            },
        )
    }
}

/// A run response as written to the JSON wire. The pixel buffer is base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "kind", rename_all = "camelCase")]
#[ts(export)]
pub enum WireResponse {
    Pixels {
        id: RunId,
        #[serde(rename = "gridSize")]
        grid_size: u32,
        buffer: String,
    },
    Error {
        id: RunId,
        message: String,
    },
}

impl WireResponse {
    pub fn new(id: RunId, response: RunResponse) -> Self {
        match response {
            RunResponse::Pixels(buffer) => Self::Pixels {
                id,
                grid_size: buffer.grid_size(),
                buffer: STANDARD.encode(buffer.as_bytes()),
            },
            RunResponse::Error { message } => Self::Error { id, message },
        }
    }

    pub fn id(&self) -> RunId {
        match self {
            Self::Pixels { id, .. } | Self::Error { id, .. } => *id,
        }
    }

    /// Decode back into a `RunResponse`. Malformed buffers become errors.
    pub fn into_response(self) -> RunResponse {
        match self {
            Self::Pixels { grid_size, buffer, .. } => {
                let decoded = STANDARD
                    .decode(buffer.as_bytes())
                    .ok()
                    .and_then(|data| PixelBuffer::new(grid_size, data));
                match decoded {
                    Some(buffer) => RunResponse::Pixels(buffer),
                    None => RunResponse::Error {
                        message: "Error: malformed pixel buffer".into(),
                    },
                }
            }
            Self::Error { message, .. } => RunResponse::Error { message },
        }
    }
}
