pub mod engine;
pub mod extract;
pub mod preprocess;
pub mod setup;

pub use engine::{OcrEngine, Tesseract};
pub use extract::{ExtractedRecord, RecordParser};
pub use preprocess::{grayscale, ImageEnhancer};
pub use setup::{locate_tesseract, TesseractPaths};
