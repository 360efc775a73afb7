//! Live recognition
//!
//! Hold-to-confirm prediction and the text sinks confirmed symbols go to.

pub mod engine;
pub mod output;

pub use engine::{argmax, predict, ConfirmedSymbol, Prediction, RecognitionEngine};
pub use output::{SymbolSink, TextBuffer, WriterSink, SYMBOL_SEPARATOR};
