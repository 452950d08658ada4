//! Structured nonlinear program: a least-squares objective plus equality
//! and inequality constraints, each assembled from small dense blocks.
//!
//! ```text
//! minimize    sum_b ||r_b(z_b)||^2
//! subject to  c_b(z_b)  = 0    (equality blocks)
//!             g_b(z_b) >= 0    (inequality blocks)
//! ```
//!
//! Every block reads a handful of decision variables `z_b` (given by
//! global index) and returns a dense vector. Jacobians are taken by central
//! finite differences per block, so the global Jacobians are block-sparse
//! by construction.

use std::ops::Range;

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

/// Perturbation used for the central-difference block Jacobians.
pub const FD_STEP: f64 = 1e-6;

/// `max |v_i|`, zero for an empty vector.
pub fn inf_norm(v: &DVector<f64>) -> f64 {
    v.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()))
}

/// Block evaluation: local variable values in, block rows out.
pub type BlockFn = Box<dyn Fn(&DVector<f64>) -> DVector<f64> + Send + Sync>;

/// Role of a block in the program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// Least-squares residual rows.
    Residual,
    /// Rows constrained to zero.
    Equality,
    /// Rows constrained to be non-negative.
    Inequality,
}

pub struct NlpBlock {
    kind: BlockKind,
    label: String,
    vars: Vec<usize>,
    rows: usize,
    eval: BlockFn,
}

impl NlpBlock {
    pub const fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Global indices of the variables this block reads.
    pub fn vars(&self) -> &[usize] {
        &self.vars
    }

    pub const fn rows(&self) -> usize {
        self.rows
    }

    fn gather(&self, z: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(self.vars.len(), self.vars.iter().map(|&i| z[i]))
    }

    fn evaluate_local(&self, local: &DVector<f64>) -> DVector<f64> {
        (self.eval)(local)
    }

    /// Central-difference Jacobian with respect to the block's variables.
    fn jacobian_local(&self, local: &DVector<f64>) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(self.rows, local.len());
        let mut shifted = local.clone();
        for j in 0..local.len() {
            let h = FD_STEP * local[j].abs().max(1.0);
            shifted[j] = local[j] + h;
            let plus = self.evaluate_local(&shifted);
            shifted[j] = local[j] - h;
            let minus = self.evaluate_local(&shifted);
            shifted[j] = local[j];
            jac.set_column(j, &((plus - minus) / (2.0 * h)));
        }
        jac
    }
}

impl std::fmt::Debug for NlpBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NlpBlock")
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("vars", &self.vars.len())
            .field("rows", &self.rows)
            .finish_non_exhaustive()
    }
}

/// Values of every block at one point, stacked by kind in block order.
#[derive(Clone, Debug, PartialEq)]
pub struct NlpEvaluation {
    pub residuals: DVector<f64>,
    pub equalities: DVector<f64>,
    pub inequalities: DVector<f64>,
}

impl NlpEvaluation {
    /// `||r||^2`.
    pub fn cost(&self) -> f64 {
        self.residuals.norm_squared()
    }

    /// Largest equality residual or inequality shortfall.
    pub fn max_violation(&self) -> f64 {
        let eq = inf_norm(&self.equalities);
        let ineq = self
            .inequalities
            .iter()
            .fold(0.0_f64, |acc, &g| acc.max(-g));
        eq.max(ineq)
    }

    /// `||c||_1 + sum max(0, -g)`, the penalty term of the l1 merit.
    pub fn l1_violation(&self) -> f64 {
        self.l1_violation_above(0.0)
    }

    /// l1 violation counting only the part of each row beyond `threshold`.
    pub fn l1_violation_above(&self, threshold: f64) -> f64 {
        let eq: f64 = self.equalities.iter().map(|c| (c.abs() - threshold).max(0.0)).sum();
        let ineq: f64 = self.inequalities.iter().map(|&g| (-g - threshold).max(0.0)).sum();
        eq + ineq
    }

    pub fn is_finite(&self) -> bool {
        self.residuals
            .iter()
            .chain(self.equalities.iter())
            .chain(self.inequalities.iter())
            .all(|v| v.is_finite())
    }
}

/// Dense Jacobian of one block, positioned in the stacked rows of its kind.
#[derive(Clone, Debug)]
pub struct BlockJacobian {
    pub block: usize,
    pub kind: BlockKind,
    /// First row of this block within the rows of its kind.
    pub row_offset: usize,
    pub jac: DMatrix<f64>,
}

/// Values and block Jacobians at one point.
#[derive(Clone, Debug)]
pub struct Linearization {
    pub values: NlpEvaluation,
    pub jacobians: Vec<BlockJacobian>,
}

/// A least-squares NLP under construction or ready to solve.
#[derive(Debug, Default)]
pub struct Nlp {
    initial_guess: Vec<f64>,
    blocks: Vec<NlpBlock>,
    n_residuals: usize,
    n_equalities: usize,
    n_inequalities: usize,
}

impl Nlp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `values.len()` decision variables, returning their indices.
    pub fn add_variables(&mut self, values: &[f64]) -> Range<usize> {
        let start = self.initial_guess.len();
        self.initial_guess.extend_from_slice(values);
        start..self.initial_guess.len()
    }

    pub fn add_block(
        &mut self,
        kind: BlockKind,
        label: impl Into<String>,
        vars: Vec<usize>,
        rows: usize,
        eval: BlockFn,
    ) {
        match kind {
            BlockKind::Residual => self.n_residuals += rows,
            BlockKind::Equality => self.n_equalities += rows,
            BlockKind::Inequality => self.n_inequalities += rows,
        }
        self.blocks.push(NlpBlock {
            kind,
            label: label.into(),
            vars,
            rows,
            eval,
        });
    }

    pub fn add_residual(
        &mut self,
        label: impl Into<String>,
        vars: Vec<usize>,
        rows: usize,
        eval: impl Fn(&DVector<f64>) -> DVector<f64> + Send + Sync + 'static,
    ) {
        self.add_block(BlockKind::Residual, label, vars, rows, Box::new(eval));
    }

    pub fn add_equality(
        &mut self,
        label: impl Into<String>,
        vars: Vec<usize>,
        rows: usize,
        eval: impl Fn(&DVector<f64>) -> DVector<f64> + Send + Sync + 'static,
    ) {
        self.add_block(BlockKind::Equality, label, vars, rows, Box::new(eval));
    }

    pub fn add_inequality(
        &mut self,
        label: impl Into<String>,
        vars: Vec<usize>,
        rows: usize,
        eval: impl Fn(&DVector<f64>) -> DVector<f64> + Send + Sync + 'static,
    ) {
        self.add_block(BlockKind::Inequality, label, vars, rows, Box::new(eval));
    }

    pub fn n_variables(&self) -> usize {
        self.initial_guess.len()
    }

    pub const fn n_residuals(&self) -> usize {
        self.n_residuals
    }

    pub const fn n_equalities(&self) -> usize {
        self.n_equalities
    }

    pub const fn n_inequalities(&self) -> usize {
        self.n_inequalities
    }

    /// Equality plus inequality rows.
    pub const fn n_constraints(&self) -> usize {
        self.n_equalities + self.n_inequalities
    }

    pub fn blocks(&self) -> &[NlpBlock] {
        &self.blocks
    }

    pub fn initial_guess(&self) -> DVector<f64> {
        DVector::from_column_slice(&self.initial_guess)
    }

    /// Initial-guess values of a variable range.
    pub fn initial_values(&self, range: Range<usize>) -> &[f64] {
        &self.initial_guess[range]
    }

    /// Row offsets of each block within the rows of its kind.
    fn row_offsets(&self) -> Vec<usize> {
        let mut next = [0usize; 3];
        self.blocks
            .iter()
            .map(|b| {
                let slot = &mut next[b.kind as usize];
                let offset = *slot;
                *slot += b.rows;
                offset
            })
            .collect()
    }

    fn stack(&self, offsets: &[usize], parts: Vec<DVector<f64>>) -> NlpEvaluation {
        let mut values = NlpEvaluation {
            residuals: DVector::zeros(self.n_residuals),
            equalities: DVector::zeros(self.n_equalities),
            inequalities: DVector::zeros(self.n_inequalities),
        };
        for ((block, &offset), part) in self.blocks.iter().zip(offsets).zip(parts) {
            let target = match block.kind {
                BlockKind::Residual => &mut values.residuals,
                BlockKind::Equality => &mut values.equalities,
                BlockKind::Inequality => &mut values.inequalities,
            };
            target.rows_mut(offset, block.rows).copy_from(&part);
        }
        values
    }

    /// Evaluate every block at `z`.
    pub fn evaluate(&self, z: &DVector<f64>) -> NlpEvaluation {
        let parts: Vec<DVector<f64>> = self
            .blocks
            .par_iter()
            .map(|b| b.evaluate_local(&b.gather(z)))
            .collect();
        self.stack(&self.row_offsets(), parts)
    }

    /// Values and finite-difference block Jacobians at `z`.
    pub fn linearize(&self, z: &DVector<f64>) -> Linearization {
        let offsets = self.row_offsets();
        let (parts, jacs): (Vec<_>, Vec<_>) = self
            .blocks
            .par_iter()
            .map(|b| {
                let local = b.gather(z);
                (b.evaluate_local(&local), b.jacobian_local(&local))
            })
            .unzip();
        let jacobians = jacs
            .into_iter()
            .enumerate()
            .map(|(block, jac)| BlockJacobian {
                block,
                kind: self.blocks[block].kind,
                row_offset: offsets[block],
                jac,
            })
            .collect();
        Linearization {
            values: self.stack(&offsets, parts),
            jacobians,
        }
    }
}
