pub mod layout;
pub mod print;
pub mod raster;

pub use layout::AgendaLayout;
pub use print::{render_document, PrintInput};
pub use raster::{capture, RasterImage, CAPTURE_SCALE};
