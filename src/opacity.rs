//! Continuum opacity: electron (Thomson), bound-free, and free-free, plus the
//! distance-to-continuum sampling this feeds into.

use crate::geometry::doppler_factor;
use crate::packet::RPacket;
use crate::search::line_search;
use crate::storage::{ContinuumStatus, StorageModel};

/// Planck constant, erg s.
const H: f64 = 6.6260755e-27;
/// Boltzmann constant, erg / K.
const KB: f64 = 1.380658e-16;

/// Bound-free cross-section for edge `i` at co-moving frequency `comov_nu`.
#[must_use]
fn bf_cross_section(storage: &StorageModel, edge: usize, comov_nu: f64) -> f64 {
    let sigma0 = storage.sigma_bf_0[edge];
    sigma0 * (storage.continuum_list_nu[edge] / comov_nu).powi(3)
}

/// Computes the packet's bound-free opacity, filling in its cumulative
/// `chi_bf_tmp_partial` scratch buffer and recording the current continuum edge.
///
/// Returns `chi_bf = D * sum_{edge >= current} l_pop * sigma_bf * (1 - l_pop_r * exp(-h nu / kT))`.
fn calculate_chi_bf(packet: &mut RPacket, storage: &StorageModel) -> f64 {
    let doppler_factor = doppler_factor(packet, storage);
    let comov_nu = packet.nu * doppler_factor;
    let n_edges = storage.n_edges();

    let current_continuum_id = line_search(&storage.continuum_list_nu, comov_nu, n_edges);
    packet.current_continuum_id = current_continuum_id;

    let shell = packet.current_shell_id;
    let t_electron = storage.t_electrons[shell];
    let boltzmann_factor = (-(H * comov_nu) / KB / t_electron).exp();

    let mut bf_helper = 0.0;
    for edge in current_continuum_id..n_edges {
        let idx = storage.edge_index(shell, edge);
        let l_pop = storage.l_pop[idx];
        let l_pop_r = storage.l_pop_r[idx];
        bf_helper += l_pop * bf_cross_section(storage, edge, comov_nu) * (1.0 - l_pop_r * boltzmann_factor);
        packet.chi_bf_tmp_partial[edge] = bf_helper;
    }

    bf_helper * doppler_factor
}

/// The sampled continuum opacity channels for the current packet position.
#[derive(Debug, Clone, Copy)]
pub struct ContinuumOpacity {
    /// Thomson (electron-scattering) opacity.
    pub chi_e: f64,
    /// Bound-free opacity (`0` when continuum is off or the packet is virtual).
    pub chi_bf: f64,
    /// Free-free opacity (always `0` in the current model).
    pub chi_ff: f64,
    /// Total continuum opacity, `chi_e + chi_bf + chi_ff`.
    pub chi_continuum: f64,
    /// Distance to the next continuum event (`MISS_DISTANCE` for virtual packets).
    pub d_continuum: f64,
}

/// Computes the continuum opacities and distance-to-continuum for `packet`, writing the
/// cached values (and, when continuum is on, the bound-free scratch buffer) onto it.
pub fn compute_distance_to_continuum(packet: &mut RPacket, storage: &StorageModel) -> ContinuumOpacity {
    let shell = packet.current_shell_id;

    let opacity = match storage.continuum_status {
        ContinuumStatus::On => {
            let chi_bf = calculate_chi_bf(packet, storage);
            let chi_ff = 0.0;
            let chi_e = storage.electron_density[shell] * storage.sigma_thomson
                * doppler_factor(packet, storage);
            let chi_continuum = chi_bf + chi_ff + chi_e;
            let d_continuum = packet.tau_event / chi_continuum;

            if packet.is_virtual {
                ContinuumOpacity {
                    chi_e,
                    chi_bf: 0.0,
                    chi_ff: 0.0,
                    chi_continuum,
                    d_continuum: crate::geometry::MISS_DISTANCE,
                }
            } else {
                ContinuumOpacity {
                    chi_e,
                    chi_bf,
                    chi_ff,
                    chi_continuum,
                    d_continuum,
                }
            }
        }
        ContinuumStatus::Off => {
            let chi_e = storage.electron_density[shell] * storage.sigma_thomson;
            let d_continuum = storage.inverse_electron_density[shell]
                * storage.inverse_sigma_thomson
                * packet.tau_event;

            if packet.is_virtual {
                ContinuumOpacity {
                    chi_e,
                    chi_bf: 0.0,
                    chi_ff: 0.0,
                    chi_continuum: chi_e,
                    d_continuum: crate::geometry::MISS_DISTANCE,
                }
            } else {
                ContinuumOpacity {
                    chi_e,
                    chi_bf: 0.0,
                    chi_ff: 0.0,
                    chi_continuum: chi_e,
                    d_continuum,
                }
            }
        }
    };

    packet.chi_e = opacity.chi_e;
    packet.chi_bf = opacity.chi_bf;
    packet.chi_ff = opacity.chi_ff;
    packet.chi_continuum = opacity.chi_continuum;
    packet.d_continuum = opacity.d_continuum;

    opacity
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::AtomicF64;
    use float_cmp::assert_approx_eq;

    fn off_storage() -> StorageModel {
        StorageModel {
            r_in: vec![1.0],
            r_out: vec![2.0],
            electron_density: vec![1e8],
            inverse_electron_density: vec![1e-8],
            t_electrons: vec![10_000.0],
            time_explosion: 1e6,
            inverse_time_explosion: 1e-6,
            sigma_thomson: 6.65e-25,
            inverse_sigma_thomson: 1.0 / 6.65e-25,
            inner_boundary_albedo: 0.0,
            reflective_inner_boundary: false,
            continuum_status: ContinuumStatus::Off,
            line_list_nu: vec![],
            tau_sobolev: vec![],
            line_interaction_id: 0,
            macro_atom: None,
            continuum_list_nu: vec![],
            sigma_bf_0: vec![],
            l_pop: vec![],
            l_pop_r: vec![],
            j_s: vec![AtomicF64::new(0.0)],
            nubar_s: vec![AtomicF64::new(0.0)],
            j_blues: vec![],
        }
    }

    #[test]
    fn continuum_off_reduces_to_electron_scattering() {
        let storage = off_storage();
        let mut packet = RPacket::new(0, 1.5, 0.3, 1.0, 1.0, 0);
        packet.tau_event = 1.0;
        let opacity = compute_distance_to_continuum(&mut packet, &storage);
        assert_eq!(opacity.chi_bf, 0.0);
        assert_eq!(opacity.chi_ff, 0.0);
        assert_approx_eq!(
            f64,
            opacity.chi_e,
            storage.electron_density[0] * storage.sigma_thomson,
            epsilon = 1e-30
        );
        assert_eq!(opacity.chi_continuum, opacity.chi_e);
        let expected_d = storage.inverse_electron_density[0] * storage.inverse_sigma_thomson;
        assert_approx_eq!(f64, opacity.d_continuum, expected_d, epsilon = expected_d * 1e-9);
    }

    #[test]
    fn continuum_off_with_virtual_packet_still_disables_continuum_distance() {
        let storage = off_storage();
        let mut packet = RPacket::new(0, 1.5, 0.3, 1.0, 1.0, 0);
        packet.is_virtual = true;
        packet.tau_event = 1.0;
        let opacity = compute_distance_to_continuum(&mut packet, &storage);
        assert_eq!(opacity.d_continuum, crate::geometry::MISS_DISTANCE);
        assert!(opacity.chi_e > 0.0);
    }

    #[test]
    fn continuum_on_with_virtual_packet_disables_bf_and_ff_distance() {
        let mut storage = off_storage();
        storage.continuum_status = ContinuumStatus::On;
        storage.continuum_list_nu = vec![3.0, 2.0, 1.0];
        storage.sigma_bf_0 = vec![0.25e-15, 0.0, 2.0 * 0.25e-15];
        storage.l_pop = vec![1.0, 1.0, 1.0];
        storage.l_pop_r = vec![0.5, 0.5, 0.5];

        let mut packet = RPacket::new(0, 1.5, 0.3, 1.5, 1.0, 3);
        packet.is_virtual = true;
        packet.tau_event = 1.0;
        let opacity = compute_distance_to_continuum(&mut packet, &storage);
        assert_eq!(opacity.chi_bf, 0.0);
        assert_eq!(opacity.chi_ff, 0.0);
        assert_eq!(opacity.d_continuum, crate::geometry::MISS_DISTANCE);
    }

    #[test]
    fn continuum_on_accumulates_bf_partial_sums_monotonically() {
        let mut storage = off_storage();
        storage.continuum_status = ContinuumStatus::On;
        storage.continuum_list_nu = vec![3.0, 2.0, 1.0];
        storage.sigma_bf_0 = vec![0.25e-15, 0.0, 2.0 * 0.25e-15];
        storage.l_pop = vec![1.0, 1.0, 1.0];
        storage.l_pop_r = vec![0.5, 0.5, 0.5];

        let mut packet = RPacket::new(0, 1.5, 0.3, 1.5, 1.0, 3);
        packet.tau_event = 1.0;
        let opacity = compute_distance_to_continuum(&mut packet, &storage);
        assert!(opacity.chi_bf >= 0.0);
        for w in packet.chi_bf_tmp_partial.windows(2) {
            assert!(w[1] >= w[0] - 1e-20);
        }
    }
}
