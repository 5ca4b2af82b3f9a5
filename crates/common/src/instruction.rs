//! Instruction set consumed by the coordinator
//!
//! Text parsing lives in the CLI; this is the typed record it produces.

use crate::{SiteId, TransactionId, Value, VariableId};
use serde::{Deserialize, Serialize};

/// One step of the input stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// `begin(T1)`
    Begin { txn: TransactionId },

    /// `beginRO(T1)`
    BeginReadOnly { txn: TransactionId },

    /// `R(T1,x3)`
    Read {
        txn: TransactionId,
        variable: VariableId,
    },

    /// `W(T1,x3,101)`
    Write {
        txn: TransactionId,
        variable: VariableId,
        value: Value,
    },

    /// `end(T1)`
    End { txn: TransactionId },

    /// `fail(2)`
    Fail { site: SiteId },

    /// `recover(2)`
    Recover { site: SiteId },

    /// `dump`, `dump(x3)`, `dump(2)`
    Dump(DumpScope),
}

impl Instruction {
    /// Transaction this instruction is addressed to, if any
    pub fn transaction(&self) -> Option<TransactionId> {
        match self {
            Instruction::Begin { txn }
            | Instruction::BeginReadOnly { txn }
            | Instruction::Read { txn, .. }
            | Instruction::Write { txn, .. }
            | Instruction::End { txn } => Some(*txn),
            Instruction::Fail { .. } | Instruction::Recover { .. } | Instruction::Dump(_) => None,
        }
    }

    /// The data operation carried by `R`/`W`
    pub fn operation(&self) -> Option<Operation> {
        match *self {
            Instruction::Read { variable, .. } => Some(Operation::Read { variable }),
            Instruction::Write {
                variable, value, ..
            } => Some(Operation::Write { variable, value }),
            _ => None,
        }
    }
}

/// What a dump reports on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DumpScope {
    All,
    Variable(VariableId),
    Site(SiteId),
}

/// A data operation, kept on the transaction while it waits in a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Read { variable: VariableId },
    Write { variable: VariableId, value: Value },
}

impl Operation {
    pub fn variable(&self) -> VariableId {
        match self {
            Operation::Read { variable } | Operation::Write { variable, .. } => *variable,
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Operation::Write { .. })
    }
}
