pub mod io;
pub mod report;
pub mod source;

pub use source::ImageDirectory;
