//! The per-event handlers: Thomson scatter, line scatter, bound-free/free-free
//! absorption, and shell-boundary crossing.

use crate::geometry::{doppler_factor, increment_j_blue_estimator, move_packet};
use crate::macro_atom::macro_atom;
use crate::packet::{PacketStatus, RPacket};
use crate::rng::WorkerRng;
use crate::storage::StorageModel;
use crate::virtual_packet::{spawn_virtual_packets, SpectralWindow, VirtualMode, VirtualSpectrum};

/// Moves the packet across its current shell's boundary and resolves the resulting
/// interior-crossing, emission, reabsorption, or reflection outcome.
#[allow(clippy::too_many_arguments)]
pub fn cross_shell_boundary(
    packet: &mut RPacket,
    storage: &StorageModel,
    distance: f64,
    window: &SpectralWindow,
    spectrum: &VirtualSpectrum,
    rng: &mut WorkerRng,
) {
    move_packet(packet, storage, distance);

    if packet.is_virtual {
        packet.tau_event += packet.chi_continuum * distance;
    } else {
        packet.tau_event = rng.exp_tau();
    }

    let n_shells = storage.n_shells();
    let next = i64::from(packet.next_shell_id);
    let current = packet.current_shell_id;

    if (current < n_shells - 1 && next == 1) || (current > 0 && next == -1) {
        packet.current_shell_id = (current as i64 + next) as usize;
        packet.recently_crossed_boundary = packet.next_shell_id;
    } else if next == 1 {
        packet.status = PacketStatus::Emitted;
    } else if !storage.reflective_inner_boundary || rng.uniform() > storage.inner_boundary_albedo {
        packet.status = PacketStatus::Reabsorbed;
    } else {
        let old_doppler_factor = doppler_factor(packet, storage);
        let comov_nu = packet.nu * old_doppler_factor;
        let comov_energy = packet.energy * old_doppler_factor;
        packet.mu = rng.uniform();
        let inverse_doppler_factor = 1.0 / doppler_factor(packet, storage);
        packet.nu = comov_nu * inverse_doppler_factor;
        packet.energy = comov_energy * inverse_doppler_factor;
        packet.recently_crossed_boundary = 1;

        if packet.virtual_packet_flag > 0 {
            spawn_virtual_packets(packet, storage, window, spectrum, VirtualMode::Reflection, rng);
        }
    }
}

/// Isotropic electron (Thomson) scattering.
#[allow(clippy::too_many_arguments)]
pub fn thomson_scatter(
    packet: &mut RPacket,
    storage: &StorageModel,
    distance: f64,
    window: &SpectralWindow,
    spectrum: &VirtualSpectrum,
    rng: &mut WorkerRng,
) {
    let old_doppler_factor = move_packet(packet, storage, distance);
    let comov_nu = packet.nu * old_doppler_factor;
    let comov_energy = packet.energy * old_doppler_factor;
    packet.mu = 2.0 * rng.uniform() - 1.0;
    let inverse_doppler_factor = 1.0 / doppler_factor(packet, storage);
    packet.nu = comov_nu * inverse_doppler_factor;
    packet.energy = comov_energy * inverse_doppler_factor;
    packet.tau_event = rng.exp_tau();
    packet.recently_crossed_boundary = 0;
    packet.last_interaction.r#type = 1;

    if packet.virtual_packet_flag > 0 {
        spawn_virtual_packets(packet, storage, window, spectrum, VirtualMode::Scatter, rng);
    }
}

/// Bound-free absorption: selects the absorbing continuum edge, then routes the packet to
/// ionization loss or the thermal pool. Both outcomes currently leave the packet
/// `Reabsorbed`: there is no k-packet model to reroute a thermalized photon back into
/// emission yet.
pub fn bound_free_scatter(packet: &mut RPacket, storage: &StorageModel, rng: &mut WorkerRng) {
    let target = rng.uniform() * packet.chi_bf;
    let mut edge = packet.current_continuum_id;
    while packet.chi_bf_tmp_partial[edge] < target {
        edge += 1;
    }

    let _ionizes = rng.uniform() < storage.continuum_list_nu[edge] / packet.nu;
    packet.status = PacketStatus::Reabsorbed;
    packet.last_interaction.r#type = 3;
}

/// Free-free absorption. Always reabsorbs: no thermal-pool reroute exists yet.
pub fn free_free_scatter(packet: &mut RPacket) {
    packet.status = PacketStatus::Reabsorbed;
    packet.last_interaction.r#type = 4;
}

/// Line (Sobolev) scattering, with optional macro-atom redistribution.
#[allow(clippy::too_many_arguments)]
pub fn line_scatter(
    packet: &mut RPacket,
    storage: &StorageModel,
    distance: f64,
    window: &SpectralWindow,
    spectrum: &VirtualSpectrum,
    rng: &mut WorkerRng,
) {
    if !packet.is_virtual {
        increment_j_blue_estimator(packet, storage, distance, packet.next_line_id);
    }

    let shell = packet.current_shell_id;
    let tau_line = storage.tau_sobolev[storage.line_index(shell, packet.next_line_id)];
    let tau_continuum = packet.chi_continuum * distance;
    let tau_combined = tau_line + tau_continuum;

    packet.next_line_id += 1;
    if packet.next_line_id == storage.n_lines() {
        packet.last_line = true;
    }

    if packet.is_virtual {
        packet.tau_event += tau_line;
    } else if packet.tau_event < tau_combined {
        let old_doppler_factor = move_packet(packet, storage, distance);
        packet.mu = 2.0 * rng.uniform() - 1.0;
        let inverse_doppler_factor = 1.0 / doppler_factor(packet, storage);
        let comov_energy = packet.energy * old_doppler_factor;
        packet.energy = comov_energy * inverse_doppler_factor;

        packet.last_interaction.in_nu = packet.nu;
        packet.last_interaction.line_in_id = (packet.next_line_id - 1) as i64;
        packet.last_interaction.shell_id = shell as i64;
        packet.last_interaction.r#type = 2;

        let emission_line_id = if storage.line_interaction_id == 0 {
            packet.next_line_id - 1
        } else {
            let macro_atom_data = storage
                .macro_atom
                .as_ref()
                .expect("macro_atom tables required when line_interaction_id >= 1");
            macro_atom(packet, storage, macro_atom_data, rng)
        };
        packet.last_interaction.line_out_id = emission_line_id as i64;

        packet.nu = storage.line_list_nu[emission_line_id] * inverse_doppler_factor;
        packet.nu_line = storage.line_list_nu[emission_line_id];
        packet.next_line_id = emission_line_id + 1;
        packet.tau_event = rng.exp_tau();
        packet.recently_crossed_boundary = 0;

        if packet.virtual_packet_flag > 0 {
            let old_close_line = packet.close_line;
            packet.close_line = !packet.last_line
                && ((storage.line_list_nu[packet.next_line_id] - packet.nu_line).abs()
                    / packet.nu_line
                    < 1e-7);
            spawn_virtual_packets(packet, storage, window, spectrum, VirtualMode::Scatter, rng);
            packet.close_line = old_close_line;
        }
    } else {
        packet.tau_event -= tau_line;
    }

    if !packet.last_line
        && (storage.line_list_nu[packet.next_line_id] - packet.nu_line).abs() / packet.nu_line
            < 1e-7
    {
        packet.close_line = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{AtomicF64, ContinuumStatus};
    use float_cmp::assert_approx_eq;

    fn test_storage(n_shells: usize) -> StorageModel {
        StorageModel {
            r_in: (0..n_shells).map(|k| 1.0 + k as f64).collect(),
            r_out: (0..n_shells).map(|k| 2.0 + k as f64).collect(),
            electron_density: vec![1e8; n_shells],
            inverse_electron_density: vec![1e-8; n_shells],
            t_electrons: vec![10_000.0; n_shells],
            time_explosion: 1e6,
            inverse_time_explosion: 1e-6,
            sigma_thomson: 6.65e-25,
            inverse_sigma_thomson: 1.0 / 6.65e-25,
            inner_boundary_albedo: 0.0,
            reflective_inner_boundary: false,
            continuum_status: ContinuumStatus::Off,
            line_list_nu: vec![3.0, 2.0, 1.0],
            tau_sobolev: vec![0.0; 3 * n_shells],
            line_interaction_id: 0,
            macro_atom: None,
            continuum_list_nu: vec![],
            sigma_bf_0: vec![],
            l_pop: vec![],
            l_pop_r: vec![],
            j_s: (0..n_shells).map(|_| AtomicF64::new(0.0)).collect(),
            nubar_s: (0..n_shells).map(|_| AtomicF64::new(0.0)).collect(),
            j_blues: (0..3 * n_shells).map(|_| AtomicF64::new(0.0)).collect(),
        }
    }

    fn window() -> SpectralWindow {
        SpectralWindow {
            virt_start_nu: 0.0,
            virt_end_nu: 0.0,
            spec_start_nu: 0.0,
            spec_end_nu: 0.0,
            spec_delta_nu: 1.0,
        }
    }

    #[test]
    fn thomson_scatter_conserves_comoving_energy_and_resets_tau() {
        let storage = test_storage(1);
        let spectrum = VirtualSpectrum::new(1, 0);
        let mut packet = RPacket::new(0, 1.5, 0.3, 1.0, 2.0, 0);
        let mut rng = WorkerRng::new(7);

        let old_doppler = doppler_factor(&packet, &storage);
        let comov_energy_before = packet.energy * old_doppler;

        thomson_scatter(&mut packet, &storage, 0.05, &window(), &spectrum, &mut rng);

        let new_doppler = doppler_factor(&packet, &storage);
        let comov_energy_after = packet.energy * new_doppler;
        assert_approx_eq!(f64, comov_energy_after, comov_energy_before, epsilon = comov_energy_before * 1e-9);
        assert_eq!(packet.last_interaction.r#type, 1);
        assert_eq!(packet.recently_crossed_boundary, 0);
    }

    #[test]
    fn line_scatter_resonant_mode_re_emits_same_line() {
        let storage = test_storage(1);
        let spectrum = VirtualSpectrum::new(1, 0);
        let mut packet = RPacket::new(0, 1.5, 0.3, 3.0, 1.0, 0);
        packet.next_line_id = 0;
        packet.nu_line = storage.line_list_nu[0];
        packet.tau_event = 0.0; // forces absorption branch (tau_event < tau_combined)
        let mut rng = WorkerRng::new(11);

        line_scatter(&mut packet, &storage, 0.01, &window(), &spectrum, &mut rng);

        assert_eq!(packet.last_interaction.r#type, 2);
        assert_eq!(packet.last_interaction.line_out_id, 0);
        assert_eq!(packet.next_line_id, 1);
    }

    #[test]
    fn line_scatter_non_absorbing_branch_decrements_tau_and_advances_line() {
        let storage = test_storage(1);
        let spectrum = VirtualSpectrum::new(1, 0);
        let mut packet = RPacket::new(0, 1.5, 0.3, 3.0, 1.0, 0);
        packet.next_line_id = 0;
        packet.nu_line = storage.line_list_nu[0];
        packet.tau_event = 1e6; // forces the non-absorbing branch
        let mut rng = WorkerRng::new(3);

        let tau_before = packet.tau_event;
        line_scatter(&mut packet, &storage, 0.01, &window(), &spectrum, &mut rng);

        assert_eq!(packet.next_line_id, 1);
        assert!(packet.tau_event < tau_before);
        assert_eq!(packet.last_interaction.r#type, 0);
    }

    #[test]
    fn cross_shell_boundary_outward_at_outermost_shell_emits() {
        let storage = test_storage(1);
        let spectrum = VirtualSpectrum::new(1, 0);
        let mut packet = RPacket::new(0, 1.9, 1.0, 1.0, 1.0, 0);
        packet.next_shell_id = 1;
        let mut rng = WorkerRng::new(1);

        cross_shell_boundary(&mut packet, &storage, 0.1, &window(), &spectrum, &mut rng);
        assert_eq!(packet.status, PacketStatus::Emitted);
    }

    #[test]
    fn cross_shell_boundary_inward_non_reflective_reabsorbs() {
        let storage = test_storage(1);
        let spectrum = VirtualSpectrum::new(1, 0);
        let mut packet = RPacket::new(0, 1.1, -1.0, 1.0, 1.0, 0);
        packet.next_shell_id = -1;
        let mut rng = WorkerRng::new(2);

        cross_shell_boundary(&mut packet, &storage, 0.1, &window(), &spectrum, &mut rng);
        assert_eq!(packet.status, PacketStatus::Reabsorbed);
    }

    #[test]
    fn cross_shell_boundary_interior_crossing_updates_shell_id() {
        let storage = test_storage(2);
        let spectrum = VirtualSpectrum::new(1, 0);
        let mut packet = RPacket::new(0, 2.9, 1.0, 1.0, 1.0, 0);
        packet.current_shell_id = 0;
        packet.next_shell_id = 1;
        let mut rng = WorkerRng::new(5);

        cross_shell_boundary(&mut packet, &storage, 0.05, &window(), &spectrum, &mut rng);
        assert_eq!(packet.current_shell_id, 1);
        assert_eq!(packet.recently_crossed_boundary, 1);
        assert_eq!(packet.status, PacketStatus::InProcess);
    }

    #[test]
    fn free_free_scatter_always_reabsorbs() {
        let mut packet = RPacket::new(0, 1.5, 0.3, 1.0, 1.0, 0);
        free_free_scatter(&mut packet);
        assert_eq!(packet.status, PacketStatus::Reabsorbed);
    }
}
