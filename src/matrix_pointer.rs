//! Matrix Lookup Node
//!
//! [`MatrixPointer`] reads a shared [`Matrix`] at positions given by two
//! signals, one for the row and one for the column. Positions are normalized:
//! 0.0 is the first row/column and values approaching 1.0 reach the last one.
//! Out-of-range positions are clamped, never reported.

use crate::matrix::Matrix;
use crate::muladd::MulAdd;
use crate::node::{Node, TickContext};
use crate::server::{GraphError, NodeId};
use crate::signal::{BindError, Binding, Input, SignalSource};
use std::sync::Arc;

/// Bilinear matrix reader driven by row and column signals
pub struct MatrixPointer {
    matrix: Arc<Matrix>,
    row: SignalSource,
    col: SignalSource,
    mul_add: MulAdd,
}

impl MatrixPointer {
    pub fn new(
        matrix: Arc<Matrix>,
        row: impl Into<SignalSource>,
        col: impl Into<SignalSource>,
    ) -> Self {
        Self {
            matrix,
            row: row.into(),
            col: col.into(),
            mul_add: MulAdd::new(),
        }
    }

    pub fn matrix(&self) -> &Arc<Matrix> {
        &self.matrix
    }

    pub fn index_row(&self) -> SignalSource {
        self.row
    }

    pub fn index_col(&self) -> SignalSource {
        self.col
    }

    pub fn mul_add(&self) -> &MulAdd {
        &self.mul_add
    }

    pub fn set_matrix(&mut self, binding: impl Into<Binding>) -> Result<(), BindError> {
        self.matrix = binding.into().into_matrix("matrix")?;
        Ok(())
    }

    pub fn set_index_row(&mut self, binding: impl Into<Binding>) -> Result<(), BindError> {
        self.row = binding.into().into_signal("row")?;
        Ok(())
    }

    pub fn set_index_col(&mut self, binding: impl Into<Binding>) -> Result<(), BindError> {
        self.col = binding.into().into_signal("col")?;
        Ok(())
    }

    pub fn set_mul(&mut self, binding: impl Into<Binding>) -> Result<(), BindError> {
        self.mul_add.set_mul(binding)
    }

    pub fn set_add(&mut self, binding: impl Into<Binding>) -> Result<(), BindError> {
        self.mul_add.set_add(binding)
    }

    pub fn set_sub(&mut self, binding: impl Into<Binding>) -> Result<(), BindError> {
        self.mul_add.set_sub(binding)
    }

    pub fn set_div(&mut self, binding: impl Into<Binding>) -> Result<(), BindError> {
        self.mul_add.set_div(binding)
    }

    fn read_frames(&self, row: Input<'_>, col: Input<'_>, out: &mut [f64]) {
        let matrix = &*self.matrix;
        match (row, col) {
            (Input::Scalar(r), Input::Scalar(c)) => out.fill(matrix.interp(r, c)),
            (Input::Stream(rows), Input::Scalar(c)) => {
                for (o, &r) in out.iter_mut().zip(rows) {
                    *o = matrix.interp(r, c);
                }
            }
            (Input::Scalar(r), Input::Stream(cols)) => {
                for (o, &c) in out.iter_mut().zip(cols) {
                    *o = matrix.interp(r, c);
                }
            }
            (Input::Stream(rows), Input::Stream(cols)) => {
                for ((o, &r), &c) in out.iter_mut().zip(rows).zip(cols) {
                    *o = matrix.interp(r, c);
                }
            }
        }
    }
}

impl Node for MatrixPointer {
    fn compute(&mut self, ctx: &TickContext<'_>, out: &mut [f64]) -> Result<(), GraphError> {
        let row = ctx.read(&self.row)?;
        let col = ctx.read(&self.col)?;
        self.read_frames(row, col, out);
        self.mul_add.process(ctx, out)
    }

    fn upstream(&self) -> Vec<NodeId> {
        self.row
            .node()
            .into_iter()
            .chain(self.col.node())
            .chain(self.mul_add.upstream())
            .collect()
    }

    fn set_input(&mut self, name: &str, binding: Binding) -> Result<(), BindError> {
        match name {
            "matrix" => self.set_matrix(binding),
            "row" => self.set_index_row(binding),
            "col" => self.set_index_col(binding),
            _ => self.mul_add.set_input(name, binding),
        }
    }

    fn type_id(&self) -> &'static str {
        "matrix_pointer"
    }
}
