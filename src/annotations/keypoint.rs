use serde::{Deserialize, Serialize};
use std::fmt;

/// A single pose keypoint.
///
/// `x` and `y` are normalized to the original image like the owning box, `visibility` is the
/// raw score the model produced for the point.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub visibility: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, visibility: f32) -> Self {
        Keypoint { x, y, visibility }
    }
}

impl fmt::Display for Keypoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Keypoint {{ x: {}, y: {}, visibility: {} }}",
            self.x, self.y, self.visibility
        )
    }
}
