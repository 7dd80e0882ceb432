pub mod document;
pub mod extractors;
pub mod fusion;
pub mod image;
pub mod ocr;
pub mod worker;

pub use document::{DocumentResolver, PageRasterizer, PopplerPdf, TextLayerSource};
pub use extractors::FieldParser;
pub use fusion::RecognitionFuser;
pub use image::ImageProcessor;
pub use ocr::{Recognizer, RecognizerOutput, TesseractRecognizer};
pub use worker::WorkerPool;
