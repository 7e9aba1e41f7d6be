use std::path::{Path, PathBuf};

use dashmap::{DashMap, Entry};

#[salsa::input(debug)]
pub struct SourceFile {
    #[returns(ref)]
    pub path: PathBuf,
    #[returns(deref)]
    pub text: String,
}

impl SourceFile {
    /// Create a SourceFile from a path and in-memory text (convenience for CLI/tests).
    pub fn from_text(db: &dyn salsa::Database, path: impl AsRef<Path>, text: String) -> Self {
        Self::new(db, path.as_ref().to_path_buf(), text)
    }
}

#[salsa::db]
pub trait Db: salsa::Database {
    fn input(
        &self,
        path: std::path::PathBuf,
    ) -> Result<SourceFile, Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Default, Clone)]
#[salsa::db]
pub struct CompilerDatabaseImpl {
    storage: salsa::Storage<Self>,
    /// Cache of loaded source files, keyed by path.
    files: DashMap<PathBuf, SourceFile>,
}

#[salsa::db]
impl salsa::Database for CompilerDatabaseImpl {}

#[salsa::db]
impl Db for CompilerDatabaseImpl {
    fn input(
        &self,
        path: std::path::PathBuf,
    ) -> Result<SourceFile, Box<dyn std::error::Error + Send + Sync>> {
        let path = path.canonicalize()?;
        match self.files.entry(path.clone()) {
            Entry::Occupied(entry) => Ok(*entry.get()),
            Entry::Vacant(entry) => {
                let contents = std::fs::read_to_string(&path)?;
                let source_file = SourceFile::new(self, path, contents);
                Ok(*entry.insert(source_file))
            }
        }
    }
}
