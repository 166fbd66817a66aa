//! The tagged operation variant the Batch Coordinator queues.

use sheetgate_core::{Row, SheetGateError};
use std::collections::HashMap;

/// A single pending write, as submitted to `enqueue`.
#[derive(Debug, Clone)]
pub enum Operation {
    AddRow { row: Row },
    AddRows { rows: Vec<Row> },
    UpdateRow { row_id: String, fields: HashMap<String, String> },
    DeleteRow { row_id: String },
    SetHeader { headers: Vec<String> },
}

impl Operation {
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::AddRow { .. } => "addRow",
            Operation::AddRows { .. } => "addRows",
            Operation::UpdateRow { .. } => "updateRow",
            Operation::DeleteRow { .. } => "deleteRow",
            Operation::SetHeader { .. } => "setHeader",
        }
    }
}

/// The outcome of an applied operation, delivered through the future
/// returned by `enqueue`.
#[derive(Debug, Clone)]
pub enum OpResult {
    RowsAdded(usize),
    Updated,
    Deleted,
    HeaderSet,
}

pub type OpOutcome = Result<OpResult, SheetGateError>;

/// An operation sitting in a queue along with the channel its caller is
/// waiting on.
pub(crate) struct QueuedOp {
    pub op: Operation,
    pub result_tx: tokio::sync::oneshot::Sender<OpOutcome>,
}
