pub mod error;
pub mod handler;
pub mod lang;
pub mod python;
pub mod regex_handler;
pub mod registry;
pub mod ts_handler;

pub use error::{ParseError, Result};
pub use handler::{finalize, LanguageHandler, ParseOutput, RawRelation, RawSymbol};
pub use lang::{language_for_extension, normalize_kind, Language};
pub use registry::ParserRegistry;
