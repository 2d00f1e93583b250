use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::notebook::{position_fragment, with_position_fragment, NotebookDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn line(line: u32) -> Self {
        Self {
            start: Position { line, character: 0 },
            end: Position { line, character: 0 },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakpointLocation {
    pub uri: Url,
    pub range: Range,
}

/// A breakpoint persisted by the editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBreakpoint {
    pub location: BreakpointLocation,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hit_condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_message: Option<String>,
}

impl SourceBreakpoint {
    pub fn new(uri: Url, range: Range) -> Self {
        Self {
            location: BreakpointLocation { uri, range },
            enabled: true,
            condition: None,
            hit_condition: None,
            log_message: None,
        }
    }

    /// Same breakpoint anchored at `uri`.
    fn relocated(&self, uri: Url) -> Self {
        Self {
            location: BreakpointLocation {
                uri,
                range: self.location.range,
            },
            ..self.clone()
        }
    }
}

/// The editor's breakpoint storage.
///
/// Add and remove take whole batches so the editor refreshes its UI once.
pub trait BreakpointStore: Send + Sync {
    fn breakpoints(&self) -> Vec<SourceBreakpoint>;
    fn remove_breakpoints(&self, breakpoints: &[SourceBreakpoint]);
    fn add_breakpoints(&self, breakpoints: &[SourceBreakpoint]);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakpointRepair {
    pub removed: Vec<SourceBreakpoint>,
    pub added: Vec<SourceBreakpoint>,
}

impl BreakpointRepair {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// Where each cell's breakpoints currently live, for one open notebook.
///
/// Cell addresses are fixed while a notebook is open, so once a repair has
/// moved a cell's breakpoints they no longer sit at the cell's own address.
/// Later repairs match breakpoints against these anchors instead, which keeps
/// moved breakpoints from being picked up by the cell whose address they now
/// carry.
#[derive(Debug, Clone, Default)]
pub struct CellAnchors {
    anchors: HashMap<String, Url>,
}

impl CellAnchors {
    /// Address the breakpoints of `cell` are currently anchored at.
    pub fn anchor<'a>(&'a self, cell: &'a Url) -> &'a Url {
        self.anchors.get(cell.as_str()).unwrap_or(cell)
    }

    /// Move breakpoints so each cell's breakpoints sit at the address encoding
    /// its current position in `document`.
    ///
    /// Cells whose fragment is not a position are left alone. Nothing is sent
    /// to `store` when there is nothing to move.
    pub fn repair(
        &mut self,
        document: &dyn NotebookDocument,
        store: &dyn BreakpointStore,
    ) -> BreakpointRepair {
        let mut moves: HashMap<String, Url> = HashMap::new();
        let mut anchors: HashMap<String, Url> = HashMap::new();
        for (index, cell) in document.cells().into_iter().enumerate() {
            let Some(position) = position_fragment(&cell.uri) else {
                tracing::trace!(
                    target: "nova.notebook_dap.breakpoints",
                    cell = %cell.uri,
                    "cell address has no position fragment"
                );
                continue;
            };

            let target = if position == index {
                cell.uri.clone()
            } else {
                with_position_fragment(&cell.uri, index)
            };
            let current = self.anchor(&cell.uri);
            if *current != target {
                moves.insert(current.as_str().to_owned(), target.clone());
            }
            if target != cell.uri {
                anchors.insert(cell.uri.as_str().to_owned(), target);
            }
        }
        self.anchors = anchors;

        let mut repair = BreakpointRepair::default();
        if moves.is_empty() {
            return repair;
        }

        for breakpoint in store.breakpoints() {
            if let Some(target) = moves.get(breakpoint.location.uri.as_str()) {
                repair.added.push(breakpoint.relocated(target.clone()));
                repair.removed.push(breakpoint);
            }
        }

        if !repair.is_empty() {
            store.remove_breakpoints(&repair.removed);
            store.add_breakpoints(&repair.added);
            tracing::debug!(
                target: "nova.notebook_dap.breakpoints",
                document = %document.uri(),
                moved = repair.added.len(),
                "moved breakpoints to repaired cell addresses"
            );
        }

        repair
    }
}

/// One-shot repair of a notebook no earlier repair has touched.
///
/// Repeated repairs of the same open notebook must go through a retained
/// [`CellAnchors`]; see [`crate::SessionCoordinator::fix_breakpoints`].
pub fn fix_breakpoints(
    document: &dyn NotebookDocument,
    store: &dyn BreakpointStore,
) -> BreakpointRepair {
    CellAnchors::default().repair(document, store)
}
