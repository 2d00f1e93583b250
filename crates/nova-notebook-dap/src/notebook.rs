//! Notebook documents and cell addresses.
//!
//! A cell address is the cell's URI. Its fragment encodes the cell's position
//! in the document as a fixed-width decimal (`00000003`), which goes stale
//! when cells are inserted, deleted or moved.

use url::Url;

/// Width of the zero-padded position fragment.
pub const POSITION_FRAGMENT_WIDTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotebookCell {
    pub uri: Url,
    pub text: String,
}

impl NotebookCell {
    pub fn new(uri: Url, text: impl Into<String>) -> Self {
        Self {
            uri,
            text: text.into(),
        }
    }
}

/// A notebook document owned by the editor.
pub trait NotebookDocument: Send + Sync {
    fn uri(&self) -> &Url;

    /// Snapshot of the document's cells in their current order.
    fn cells(&self) -> Vec<NotebookCell>;
}

/// Position encoded in the cell address fragment, if the fragment is purely numeric.
pub fn position_fragment(uri: &Url) -> Option<usize> {
    let fragment = uri.fragment()?;
    if fragment.is_empty() || !fragment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    fragment.parse().ok()
}

/// `uri` with its fragment rewritten to encode `index`.
pub fn with_position_fragment(uri: &Url, index: usize) -> Url {
    let mut fixed = uri.clone();
    fixed.set_fragment(Some(&format!(
        "{index:0width$}",
        width = POSITION_FRAGMENT_WIDTH
    )));
    fixed
}

/// Last path segment of the notebook the cell belongs to (`analysis.ipynb`).
pub fn cell_base_name(uri: &Url) -> &str {
    uri.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .unwrap_or_else(|| uri.path())
}

/// Human readable name for the cell at zero-based `index`: `analysis.ipynb, Cell 3`.
pub fn cell_display_name(uri: &Url, index: usize) -> String {
    format!("{}, Cell {}", cell_base_name(uri), index + 1)
}

/// Zero-based index of the cell whose address is exactly `address`.
pub fn cell_index(cells: &[NotebookCell], address: &str) -> Option<usize> {
    cells.iter().position(|cell| cell.uri.as_str() == address)
}

/// Whether `path` is a cell address under `scheme`.
pub fn is_cell_address(path: &str, scheme: &str) -> bool {
    Url::parse(path)
        .map(|uri| uri.scheme() == scheme)
        .unwrap_or(false)
}
