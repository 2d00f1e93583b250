use std::collections::HashMap;

use url::Url;

/// Correspondence between notebook cells and the kernel files their code was
/// dumped to.
///
/// The two directions are only ever updated together, so every cell entry has
/// exactly one matching file entry and vice versa.
#[derive(Debug, Default)]
pub struct CellFileMap {
    file_to_cell: HashMap<String, Url>,
    cell_to_file: HashMap<String, String>,
}

impl CellFileMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `cell` was materialized as `file`, replacing any previous
    /// pairing of either side.
    pub fn insert(&mut self, cell: Url, file: String) {
        if let Some(old_file) = self.cell_to_file.remove(cell.as_str()) {
            self.file_to_cell.remove(&old_file);
        }
        if let Some(old_cell) = self.file_to_cell.remove(&file) {
            self.cell_to_file.remove(old_cell.as_str());
        }
        self.cell_to_file.insert(cell.as_str().to_owned(), file.clone());
        self.file_to_cell.insert(file, cell);
    }

    pub fn file_for_cell(&self, cell: &str) -> Option<&str> {
        self.cell_to_file.get(cell).map(String::as_str)
    }

    pub fn cell_for_file(&self, file: &str) -> Option<&Url> {
        self.file_to_cell.get(file)
    }

    pub fn contains_cell(&self, cell: &str) -> bool {
        self.cell_to_file.contains_key(cell)
    }

    pub fn len(&self) -> usize {
        self.cell_to_file.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cell_to_file.is_empty()
    }
}
