//! Resolving `include` directives.
//!
//! The parser does not know where included text comes from; it asks an
//! [`Includer`] for an already parsed [`Document`] and splices it in.
//! [`FileIncluder`] reads files relative to the including file, and any
//! `Fn(&str) -> Result<Option<Document>, HoconError>` closure works too,
//! which is how tests serve includes from memory.

use crate::ast::Document;
use crate::error::HoconError;
use crate::parser::Parser;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread::{self, ThreadId};

/// Parsed include directives are shared through [`crate::ParseOptions`], so
/// an includer may serve several threads at once.
pub trait Includer: Send + Sync {
    /// Parses the document named `name`. `Ok(None)` means it does not exist.
    fn include(&self, name: &str) -> Result<Option<Document>, HoconError>;
}

impl<F> Includer for F
where
    F: Fn(&str) -> Result<Option<Document>, HoconError> + Send + Sync,
{
    fn include(&self, name: &str) -> Result<Option<Document>, HoconError> {
        self(name)
    }
}

/// Loads includes from the filesystem.
///
/// Relative names are looked up next to the file that contains the
/// directive, or in `base` for the top-level document. A name without an
/// extension also matches `<name>.conf`.
#[derive(Debug)]
pub struct FileIncluder {
    base: PathBuf,
    /// The top-level document, when there is one.
    root: Option<PathBuf>,
    /// Files being included on each thread, outermost first.
    open: Mutex<HashMap<ThreadId, Vec<PathBuf>>>,
}

impl FileIncluder {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            root: None,
            open: Mutex::new(HashMap::new()),
        }
    }

    /// An includer for the top-level document at `file`, so that including
    /// `file` again is reported as a cycle.
    pub(crate) fn for_file(file: &Path) -> Self {
        let base = file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            root: Some(canonical(file)),
            ..Self::new(base)
        }
    }

    /// The chain of files the calling thread is currently inside.
    fn chain(&self) -> Vec<PathBuf> {
        let open = self.open.lock();
        let chain = self
            .root
            .iter()
            .chain(open.get(&thread::current().id()).into_iter().flatten())
            .cloned()
            .collect();
        chain
    }

    fn enter(&self, file: PathBuf) {
        self.open
            .lock()
            .entry(thread::current().id())
            .or_default()
            .push(file);
    }

    fn leave(&self) {
        let mut open = self.open.lock();
        let id = thread::current().id();
        if let Some(stack) = open.get_mut(&id) {
            stack.pop();
            if stack.is_empty() {
                open.remove(&id);
            }
        }
    }

    fn locate(&self, chain: &[PathBuf], name: &str) -> Option<PathBuf> {
        let requested = Path::new(name);
        let candidate = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            let dir = chain
                .last()
                .and_then(|file| file.parent().map(Path::to_path_buf))
                .unwrap_or_else(|| self.base.clone());
            dir.join(requested)
        };

        if candidate.is_file() {
            return Some(candidate);
        }
        if candidate.extension().is_none() {
            let with_extension = candidate.with_extension("conf");
            if with_extension.is_file() {
                return Some(with_extension);
            }
        }
        None
    }
}

impl Includer for FileIncluder {
    fn include(&self, name: &str) -> Result<Option<Document>, HoconError> {
        let chain = self.chain();
        let Some(path) = self.locate(&chain, name) else {
            log::debug!("include `{name}` did not match any file");
            return Ok(None);
        };
        let key = canonical(&path);
        if chain.contains(&key) {
            return Err(cycle_error(&chain, &key));
        }

        let text = fs::read_to_string(&path).map_err(|err| HoconError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        log::debug!("including {}", path.display());

        self.enter(key);
        let parsed = Parser::new_with_name(&text, path.display().to_string())
            .and_then(|parser| parser.with_includer(self).parse_document());
        self.leave();
        parsed.map(Some)
    }
}

fn cycle_error(chain: &[PathBuf], path: &Path) -> HoconError {
    let mut cycle: Vec<String> = chain
        .iter()
        .map(|file| file.display().to_string())
        .collect();
    cycle.push(path.display().to_string());
    HoconError::IncludeCycle {
        cycle: cycle.join(" -> "),
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
