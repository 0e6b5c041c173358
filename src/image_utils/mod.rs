pub mod annotate;
pub mod image_io;
pub mod letterbox;
pub mod rgba_view;
