pub mod ast;
#[cfg(feature = "cli")]
pub mod cli;
pub mod command;
pub mod error;
pub mod layout;
pub mod lexer;
pub mod parser;
pub mod render;
pub mod style;
pub mod text_metrics;

#[cfg(feature = "cli")]
pub use cli::run;
pub use error::{Error, Result};
