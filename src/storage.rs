//! The read-mostly physical-model snapshot (`StorageModel`) and the write-only
//! estimator arrays the core accumulates into.

use std::sync::atomic::{AtomicU64, Ordering};

/// Whether continuum (bound-free/free-free) processes are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuumStatus {
    /// Only electron scattering contributes to the continuum.
    Off,
    /// Bound-free and free-free processes are evaluated per shell.
    On,
}

/// A single additively-accumulated `f64`, since `std` has no atomic float type.
///
/// Implemented via the standard bit-reinterpretation + compare-exchange-loop technique:
/// the bit pattern of an `f64` round-trips losslessly through `AtomicU64`, and addition
/// is retried against whatever the current value is until the compare-exchange wins.
#[derive(Debug, Default)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    /// Constructs a new accumulator initialized to `value`.
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    /// Atomically adds `value` to the accumulator.
    pub fn fetch_add(&self, value: f64) {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let new = f64::from_bits(current) + value;
            match self.0.compare_exchange_weak(
                current,
                new.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Reads the current value.
    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

/// Macro-atom transition tables, present when `line_interaction_id >= 1`.
#[derive(Debug, Clone)]
pub struct MacroAtomData {
    /// Per-line upper macro-atom level activated on absorption, indexed by line id.
    pub line2macro_level_upper: Vec<usize>,
    /// First transition-table row for each macro-atom level.
    pub macro_block_references: Vec<usize>,
    /// Transition probabilities, flattened as `[shell * transition_probabilities_nd + t]`.
    pub transition_probabilities: Vec<f64>,
    /// Row stride of `transition_probabilities`.
    pub transition_probabilities_nd: usize,
    /// `-1` for a terminating (radiative) transition, else an internal transition id.
    pub transition_type: Vec<i32>,
    /// Destination macro-atom level for each transition.
    pub destination_level_id: Vec<usize>,
    /// Emission line id for each terminating transition.
    pub transition_line_id: Vec<usize>,
}

/// The read-mostly physical-model snapshot plus the write-only estimator arrays the
/// core accumulates into. Packets read `StorageModel` fields freely; they may only
/// write into the estimator arrays, and only additively.
pub struct StorageModel {
    /// Inner radius of each shell, ascending, `r_in[k] = r_out[k - 1]` for `k > 0`.
    pub r_in: Vec<f64>,
    /// Outer radius of each shell.
    pub r_out: Vec<f64>,
    /// Electron number density per shell.
    pub electron_density: Vec<f64>,
    /// `1 / electron_density`, precomputed for the continuum-off distance formula.
    pub inverse_electron_density: Vec<f64>,
    /// Electron temperature per shell.
    pub t_electrons: Vec<f64>,
    /// Time since explosion.
    pub time_explosion: f64,
    /// `1 / time_explosion`.
    pub inverse_time_explosion: f64,
    /// Thomson cross-section.
    pub sigma_thomson: f64,
    /// `1 / sigma_thomson`.
    pub inverse_sigma_thomson: f64,
    /// Inner-boundary albedo, used when `reflective_inner_boundary` is set.
    pub inner_boundary_albedo: f64,
    /// Whether the inner boundary reflects instead of absorbing.
    pub reflective_inner_boundary: bool,
    /// Whether continuum processes are active.
    pub continuum_status: ContinuumStatus,

    /// Line frequencies, descending (`line_list_nu[0]` is the bluest line).
    pub line_list_nu: Vec<f64>,
    /// Sobolev optical depth, flattened as `[shell * n_lines + line]`.
    pub tau_sobolev: Vec<f64>,
    /// `0`: resonant scatter only. `>= 1`: macro-atom redistribution.
    pub line_interaction_id: u8,
    /// Macro-atom tables, required when `line_interaction_id >= 1`.
    pub macro_atom: Option<MacroAtomData>,

    /// Continuum-edge frequencies, descending.
    pub continuum_list_nu: Vec<f64>,
    /// Per-edge bound-free cross-section normalization `sigma_bf_0[i]`.
    pub sigma_bf_0: Vec<f64>,
    /// Level populations, flattened as `[shell * n_edges + edge]`.
    pub l_pop: Vec<f64>,
    /// Level population ratios, flattened as `[shell * n_edges + edge]`.
    pub l_pop_r: Vec<f64>,

    /// Path-integrated intensity estimator, accumulated per shell.
    pub j_s: Vec<AtomicF64>,
    /// Frequency-weighted intensity estimator, accumulated per shell.
    pub nubar_s: Vec<AtomicF64>,
    /// Blue-wing intensity estimator, flattened as `[shell * n_lines + line]`.
    pub j_blues: Vec<AtomicF64>,
}

impl StorageModel {
    /// Number of shells.
    #[must_use]
    pub fn n_shells(&self) -> usize {
        self.r_in.len()
    }

    /// Number of lines.
    #[must_use]
    pub fn n_lines(&self) -> usize {
        self.line_list_nu.len()
    }

    /// Number of continuum edges.
    #[must_use]
    pub fn n_edges(&self) -> usize {
        self.continuum_list_nu.len()
    }

    /// Flat index into `tau_sobolev`/`j_blues` for `(shell, line)`.
    #[must_use]
    pub fn line_index(&self, shell: usize, line: usize) -> usize {
        shell * self.n_lines() + line
    }

    /// Flat index into `l_pop`/`l_pop_r` for `(shell, edge)`.
    #[must_use]
    pub fn edge_index(&self, shell: usize, edge: usize) -> usize {
        shell * self.n_edges() + edge
    }
}
