pub mod aermod;
pub mod calpuff;
pub mod cursor;
pub mod impact;
pub mod pemtim;
pub mod rewriter;

pub use rewriter::{format_exponential, EmissionRewriter};
