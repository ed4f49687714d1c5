pub mod api;
pub mod ast;
pub mod config;
pub mod convert;
pub mod error;
pub mod include;
pub mod lexer;
pub mod parser;
pub mod path;
pub mod resolver;
mod serialization;
pub mod value;

pub use api::{parse_document, parse_file, parse_file_with, parse_str, parse_with, ParseOptions};
pub use config::Config;
pub use convert::{ByteSize, FromValue};
pub use error::HoconError;
pub use path::ConfigPath;
pub use resolver::EnvSource;
pub use value::Value;
