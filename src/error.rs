//! Error types for the radiative-transfer kernel.

use thiserror::Error;

/// Catch-all error for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A search key fell outside the range covered by a monotone array. Surfaced by the
    /// raw [`crate::search::binary_search`]/[`crate::search::reverse_binary_search`]
    /// primitives; [`crate::search::line_search`] never returns this variant, since its
    /// two boundary branches already cover every key `reverse_binary_search` would
    /// otherwise reject.
    #[error("search key {key} outside array bounds [{lo}, {hi}]")]
    BoundsError {
        /// The value that was searched for.
        key: f64,
        /// Lower bound of the searched range, as found in the array.
        lo: f64,
        /// Upper bound of the searched range, as found in the array.
        hi: f64,
    },
    /// The co-moving frequency computed for a packet fell below the frequency of the
    /// line it was supposed to still be blueward of. This indicates an inconsistency in
    /// the input model (overlapping/misordered line list, or a packet state that
    /// violates the geometry invariants) rather than a transient numerical issue; the
    /// packet's transport cannot continue.
    #[error("comoving nu ({comov_nu}) less than nu_line ({nu_line}) in shell {shell_id}")]
    ComovNuLessThanNuLine {
        /// The packet's co-moving frequency at the point of failure.
        comov_nu: f64,
        /// The frequency of the line the packet was travelling towards.
        nu_line: f64,
        /// The packet's current shell.
        shell_id: usize,
    },
}

/// Convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
