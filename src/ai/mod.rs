//! Photo understanding through the hosted Gemini model.

pub mod extract;
pub mod gemini;
