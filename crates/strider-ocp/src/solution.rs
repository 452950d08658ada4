//! Per-phase solution trajectories and their merge into one stride.

use nalgebra::{DMatrix, DVector};
use strider_core::ContactConfiguration;

use crate::nlp::inf_norm;

/// Node states and interval controls of one phase.
#[derive(Clone, Debug, PartialEq)]
pub struct PhaseSolution {
    pub index: usize,
    pub contact: ContactConfiguration,
    /// Absolute node times, `n + 1` entries.
    pub times: Vec<f64>,
    /// `nx x (n + 1)`.
    pub states: DMatrix<f64>,
    /// `nu x n`.
    pub controls: DMatrix<f64>,
}

impl PhaseSolution {
    pub fn n_intervals(&self) -> usize {
        self.controls.ncols()
    }

    pub fn state(&self, node: usize) -> DVector<f64> {
        self.states.column(node).into_owned()
    }

    pub fn control(&self, interval: usize) -> DVector<f64> {
        self.controls.column(interval).into_owned()
    }

    pub fn final_state(&self) -> DVector<f64> {
        self.state(self.states.ncols() - 1)
    }
}

/// One continuous trajectory across all phases.
#[derive(Clone, Debug, PartialEq)]
pub struct MergedTrajectory {
    pub times: Vec<f64>,
    /// One column per merged node.
    pub states: DMatrix<f64>,
    /// One entry per interval; widths follow each phase's control dimension.
    pub controls: Vec<DVector<f64>>,
    /// Phase that owns each interval.
    pub interval_phase: Vec<usize>,
}

impl MergedTrajectory {
    pub fn node_count(&self) -> usize {
        self.times.len()
    }
}

/// Solution of a multi-phase problem, phase by phase.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OcpSolution {
    phases: Vec<PhaseSolution>,
}

impl OcpSolution {
    pub const fn new(phases: Vec<PhaseSolution>) -> Self {
        Self { phases }
    }

    pub fn phases(&self) -> &[PhaseSolution] {
        &self.phases
    }

    pub fn initial_state(&self) -> Option<DVector<f64>> {
        self.phases.first().map(|p| p.state(0))
    }

    pub fn final_state(&self) -> Option<DVector<f64>> {
        self.phases.last().map(PhaseSolution::final_state)
    }

    /// Continuity gap `||x_start(i + 1) - x_end(i)||_inf` per boundary.
    pub fn boundary_gaps(&self) -> Vec<f64> {
        self.phases
            .windows(2)
            .map(|w| inf_norm(&(w[1].state(0) - w[0].final_state())))
            .collect()
    }

    /// Concatenate phases, keeping each shared boundary node once.
    ///
    /// The boundary node is taken from the earlier phase; phases must share
    /// a state dimension.
    pub fn merge_phases(&self) -> MergedTrajectory {
        let nx = self.phases.first().map_or(0, |p| p.states.nrows());
        let mut times = Vec::new();
        let mut columns: Vec<DVector<f64>> = Vec::new();
        let mut controls = Vec::new();
        let mut interval_phase = Vec::new();
        for (i, phase) in self.phases.iter().enumerate() {
            let skip = usize::from(i > 0);
            for node in skip..phase.states.ncols() {
                times.push(phase.times[node]);
                columns.push(phase.state(node));
            }
            for k in 0..phase.n_intervals() {
                controls.push(phase.control(k));
                interval_phase.push(phase.index);
            }
        }
        let states = if columns.is_empty() {
            DMatrix::zeros(nx, 0)
        } else {
            DMatrix::from_columns(&columns)
        };
        MergedTrajectory {
            times,
            states,
            controls,
            interval_phase,
        }
    }
}
