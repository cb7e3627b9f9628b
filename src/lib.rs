//! Lesson Engine — interactive story lessons with model-written reflections.
//!
//! Presents an ordered sequence of narrative cards, collects short free-text
//! responses at designated inflection points, and turns those responses into
//! personalized reflective commentary via an external text-generation
//! endpoint, with resilient parsing and deterministic fallback synthesis.

pub mod catalog;
pub mod core;
pub mod generate;
pub mod schema;
pub mod sticker;
