/// Geometry shared by everything that carries a center + extent box.
///
/// Detections produced by this crate describe a box by its center and its size, normalized to
/// the original image. This project uses the standard convention of the left side of the image
/// being x=0 and the top of the image being y=0, so `top() < bottom()` for any box with a
/// positive height.
pub trait BoundingBoxGeometry {
    fn center(&self) -> (f32, f32);
    fn extent(&self) -> (f32, f32);

    fn left(&self) -> f32 {
        self.center().0 - self.extent().0 / 2.0
    }

    fn top(&self) -> f32 {
        self.center().1 - self.extent().1 / 2.0
    }

    fn right(&self) -> f32 {
        self.center().0 + self.extent().0 / 2.0
    }

    fn bottom(&self) -> f32 {
        self.center().1 + self.extent().1 / 2.0
    }

    fn as_xyxy(&self) -> (f32, f32, f32, f32) {
        (self.left(), self.top(), self.right(), self.bottom())
    }

    fn area(&self) -> f32 {
        let (width, height) = self.extent();
        width * height
    }

    /// Overlap ratio in [0, 1]. A degenerate pair (zero union) has no overlap.
    fn intersection_over_union<U: BoundingBoxGeometry + ?Sized>(&self, other: &U) -> f32 {
        let (a_x1, a_y1, a_x2, a_y2) = self.as_xyxy();
        let (b_x1, b_y1, b_x2, b_y2) = other.as_xyxy();

        let inter_width = (a_x2.min(b_x2) - a_x1.max(b_x1)).max(0.0);
        let inter_height = (a_y2.min(b_y2) - a_y1.max(b_y1)).max(0.0);
        let intersection = inter_width * inter_height;

        let union = self.area() + other.area() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// Computes the IoU of two boxes.
pub fn iou<A, B>(a: &A, b: &B) -> f32
where
    A: BoundingBoxGeometry + ?Sized,
    B: BoundingBoxGeometry + ?Sized,
{
    a.intersection_over_union(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CenterBox(f32, f32, f32, f32);

    impl BoundingBoxGeometry for CenterBox {
        fn center(&self) -> (f32, f32) {
            (self.0, self.1)
        }

        fn extent(&self) -> (f32, f32) {
            (self.2, self.3)
        }
    }

    #[test]
    fn corners_from_center() {
        let b = CenterBox(0.5_f32, 0.5_f32, 0.2_f32, 0.4_f32);
        let (x1, y1, x2, y2) = b.as_xyxy();
        assert!((x1 - 0.4).abs() < 1e-6);
        assert!((y1 - 0.3).abs() < 1e-6);
        assert!((x2 - 0.6).abs() < 1e-6);
        assert!((y2 - 0.7).abs() < 1e-6);
    }

    #[test]
    fn iou_identical_boxes() {
        let a = CenterBox(0.5_f32, 0.5_f32, 0.4_f32, 0.4_f32);
        let b = CenterBox(0.5_f32, 0.5_f32, 0.4_f32, 0.4_f32);
        assert!((iou(&a, &b) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn iou_disjoint_boxes() {
        let a = CenterBox(0.1_f32, 0.1_f32, 0.1_f32, 0.1_f32);
        let b = CenterBox(0.9_f32, 0.9_f32, 0.1_f32, 0.1_f32);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn iou_partial_overlap() {
        let a = CenterBox(0.5_f32, 0.5_f32, 0.4_f32, 0.4_f32);
        let b = CenterBox(0.6_f32, 0.6_f32, 0.4_f32, 0.4_f32);
        let v = iou(&a, &b);
        assert!(v > 0.0 && v < 1.0);
        // 0.3 x 0.3 overlap over (0.16 + 0.16 - 0.09).
        assert!((v - 0.09 / 0.23).abs() < 1e-4);
    }

    #[test]
    fn iou_zero_area_box() {
        let a = CenterBox(0.5_f32, 0.5_f32, 0.0_f32, 0.4_f32);
        let b = CenterBox(0.5_f32, 0.5_f32, 0.4_f32, 0.4_f32);
        assert_eq!(iou(&a, &b), 0.0);

        let c = CenterBox(0.5_f32, 0.5_f32, 0.0_f32, 0.0_f32);
        assert_eq!(iou(&c, &c), 0.0);
    }
}
