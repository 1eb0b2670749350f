//! Run-local configuration: everything a run needs that is neither part of the physical
//! model (`StorageModel`) nor per-packet state.

use serde::{Deserialize, Serialize};

/// Run-local scalars controlling virtual-packet variance reduction, parallelism, RNG
/// seeding, and the spectral windows used to bin the escaping radiation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Virtual packets spawned per real interaction. `0` disables virtual packets
    /// entirely.
    pub virtual_packet_flag: u32,
    /// Worker count. `1` runs the whole packet range on the calling thread.
    pub n_threads: usize,
    /// Base RNG seed; worker `w` seeds its generator with `seed + w`.
    pub seed: u64,
    /// Lower bound of the real-spectrum binning window.
    pub spectrum_start_nu: f64,
    /// Upper bound of the real-spectrum binning window.
    pub spectrum_end_nu: f64,
    /// Bin width of the real-spectrum binning window.
    pub spectrum_delta_nu: f64,
    /// Lower bound of the virtual-packet no-op precondition window.
    pub spectrum_virt_start_nu: f64,
    /// Upper bound of the virtual-packet no-op precondition window.
    pub spectrum_virt_end_nu: f64,
}

impl RunConfig {
    /// A single-threaded run with virtual packets disabled and an empty real-spectrum
    /// window (`0` bins) until [`Self::with_spectrum_window`] opts one in.
    #[must_use]
    pub fn single_threaded(seed: u64) -> Self {
        Self {
            virtual_packet_flag: 0,
            n_threads: 1,
            seed,
            spectrum_start_nu: 0.0,
            spectrum_end_nu: 0.0,
            spectrum_delta_nu: 1.0,
            spectrum_virt_start_nu: 0.0,
            spectrum_virt_end_nu: f64::INFINITY,
        }
    }

    /// Sets `virtual_packet_flag`.
    #[must_use]
    pub fn with_virtual_packet_flag(mut self, virtual_packet_flag: u32) -> Self {
        self.virtual_packet_flag = virtual_packet_flag;
        self
    }

    /// Sets `n_threads`.
    #[must_use]
    pub fn with_n_threads(mut self, n_threads: usize) -> Self {
        self.n_threads = n_threads.max(1);
        self
    }

    /// Sets the real-spectrum binning window.
    #[must_use]
    pub fn with_spectrum_window(mut self, start_nu: f64, end_nu: f64, delta_nu: f64) -> Self {
        self.spectrum_start_nu = start_nu;
        self.spectrum_end_nu = end_nu;
        self.spectrum_delta_nu = delta_nu;
        self
    }

    /// Sets the virtual-packet no-op precondition window.
    #[must_use]
    pub fn with_virtual_window(mut self, start_nu: f64, end_nu: f64) -> Self {
        self.spectrum_virt_start_nu = start_nu;
        self.spectrum_virt_end_nu = end_nu;
        self
    }

    /// Number of real-spectrum bins implied by the window and bin width.
    ///
    /// Falls back to `0` bins if the window is unset or degenerate (a non-finite or
    /// negative span), rather than letting a stray `f64::INFINITY` turn into
    /// `usize::MAX` via a saturating cast and blow up the spectrum allocation.
    #[must_use]
    pub fn n_spectrum_bins(&self) -> usize {
        let span = (self.spectrum_end_nu - self.spectrum_start_nu) / self.spectrum_delta_nu;
        if span.is_finite() && span > 0.0 {
            span.ceil() as usize
        } else {
            0
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::single_threaded(0)
    }
}
