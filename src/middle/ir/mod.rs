//! IR (Intermediate Representation). Every instruction computes at most one
//! operation over at most two source operands, and every operand is a
//! symbolic name: an integer literal's text, a variable, a temporary
//! (`T<n>`), a label (`L<n>`), or a string constant symbol (`S<n>`).

use std::{collections::BTreeMap, sync::Arc};

use crate::index::simple_index;

pub use crate::frontend::ast::{PrintKind, VarType};

pub mod ast_lowering;
pub mod pool;
pub mod pretty_print;

simple_index! {
    /// Handle to a canonical instruction value in a [`pool::IrPool`]
    pub struct IrHandle;
}

/// The derived `Hash` mixes the variant tag before the fields, so two
/// instructions of different kinds never compare equal even when their
/// string fields coincide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Instruction {
    /// `var = left`, or `var = left op right` when an operator is present
    Assign {
        var: String,
        left: String,
        operator: Option<String>,
        right: Option<String>,
    },
    /// Unconditional transfer
    Jump { target: String },
    /// Jump target definition
    Label { name: String },
    /// `if (left op right) goto target`
    Compare {
        left: String,
        operator: String,
        right: String,
        target: String,
    },
    /// Emit an integer or a string
    Print { kind: PrintKind, value: String },
}

/// Everything lowering hands to the code generator. Created once per
/// compilation, consumed once.
///
/// The symbol tables are ordered maps: the generator walks them when laying
/// out storage and data sections, and emission must be byte-identical
/// across runs.
#[derive(Debug)]
pub struct GeneratedIr {
    pub pool: pool::IrPool,
    pub code: Vec<IrHandle>,
    pub identifiers: BTreeMap<String, VarType>,
    pub constants: BTreeMap<String, Vec<u8>>,
}

impl GeneratedIr {
    pub fn instructions(&self) -> impl Iterator<Item = Arc<Instruction>> + '_ {
        self.code.iter().map(|handle| self.pool.get(*handle))
    }
}
