//! Year-by-year projection of a retired household's finances under a
//! two-bucket (cash reserve + growth asset) withdrawal strategy.

pub mod api;
pub mod cli;
pub mod core;
pub mod persistence;
