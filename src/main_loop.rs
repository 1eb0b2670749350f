//! The run entry point: partitions packets across workers, runs each to completion, and
//! collects the emergent spectrum, estimators, and any transport failures.

use std::sync::Mutex;

use log::{debug, error};
use rayon::prelude::*;

use crate::config::RunConfig;
use crate::driver::run_one_packet;
use crate::error::Error;
use crate::geometry::doppler_factor;
use crate::packet::{LastInteraction, RPacket};
use crate::rng::WorkerRng;
use crate::search::line_search;
use crate::storage::StorageModel;
use crate::virtual_packet::{SpectralWindow, VirtualSpectrum};

/// Builds a packet from its collaborator-supplied initial state, locating its starting
/// position in the line list by the co-moving frequency at its initial `(r, mu)`.
fn init_packet(index: usize, init: PacketInit, storage: &StorageModel) -> RPacket {
    let mut packet = RPacket::new(index, init.r, init.mu, init.nu, init.energy, storage.n_edges());
    let comov_nu = packet.nu * doppler_factor(&packet, storage);
    let next_line_id = line_search(&storage.line_list_nu, comov_nu, storage.n_lines());
    packet.next_line_id = next_line_id;
    packet.last_line = next_line_id == storage.n_lines();
    packet
}

/// A collaborator-supplied packet's initial lab-frame state.
#[derive(Debug, Clone, Copy)]
pub struct PacketInit {
    /// Initial radius.
    pub r: f64,
    /// Initial direction cosine.
    pub mu: f64,
    /// Initial lab-frame frequency.
    pub nu: f64,
    /// Initial lab-frame energy.
    pub energy: f64,
}

/// A packet whose transport could not complete because its co-moving frequency fell below
/// the target line frequency (a geometric ordering violation in the input model).
#[derive(Debug)]
pub struct FailedPacket {
    /// Index of the packet in the input arrays.
    pub index: usize,
    /// The error that ended its transport.
    pub error: Error,
}

/// The result of a complete run: per-packet outputs, the virtual-packet spectrum, and any
/// packets whose transport failed.
pub struct RunOutputs {
    /// Emergent (or last-known) lab-frame frequency per packet.
    pub output_nu: Vec<f64>,
    /// Sign-encoded emergent energy per packet: positive if emitted, negative if
    /// reabsorbed, `0` for a failed packet.
    pub output_energy: Vec<f64>,
    /// Each packet's last-interaction record.
    pub last_interactions: Vec<LastInteraction>,
    /// The accumulated virtual-packet spectrum and record list.
    pub virtual_spectrum: VirtualSpectrum,
    /// Packets that failed transport rather than completing.
    pub failed_packets: Vec<FailedPacket>,
}

/// Runs every packet in `initial_packets` to completion against `storage`, partitioning the
/// index range into exactly `config.n_threads` contiguous chunks so that the mapping from
/// packet to RNG stream is determined solely by chunk index, not by whichever physical
/// thread a scheduler happens to run that chunk on.
#[must_use]
pub fn run_monte_carlo(storage: &StorageModel, config: &RunConfig, initial_packets: &[PacketInit]) -> RunOutputs {
    let n_packets = initial_packets.len();
    let n_threads = config.n_threads.max(1);
    let chunk_size = n_packets.div_ceil(n_threads).max(1);

    let mut output_nu = vec![0.0; n_packets];
    let mut output_energy = vec![0.0; n_packets];
    let mut last_interactions = vec![LastInteraction::none(); n_packets];
    let virtual_spectrum = VirtualSpectrum::new(config.n_spectrum_bins(), n_packets);
    let failed_packets = Mutex::new(Vec::new());

    let window = SpectralWindow {
        virt_start_nu: config.spectrum_virt_start_nu,
        virt_end_nu: config.spectrum_virt_end_nu,
        spec_start_nu: config.spectrum_start_nu,
        spec_end_nu: config.spectrum_end_nu,
        spec_delta_nu: config.spectrum_delta_nu,
    };

    debug!(
        "starting run: {n_packets} packets, {n_threads} workers, chunk size {chunk_size}, virtual_packet_flag={}",
        config.virtual_packet_flag
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .build()
        .expect("failed to build worker thread pool");

    pool.install(|| {
        initial_packets
            .par_chunks(chunk_size)
            .zip(output_nu.par_chunks_mut(chunk_size))
            .zip(output_energy.par_chunks_mut(chunk_size))
            .zip(last_interactions.par_chunks_mut(chunk_size))
            .enumerate()
            .for_each(|(worker_id, (((inits, nus), energies), interactions))| {
                let mut rng = WorkerRng::new(config.seed.wrapping_add(worker_id as u64));
                let base_index = worker_id * chunk_size;

                for (offset, init) in inits.iter().enumerate() {
                    let index = base_index + offset;
                    let mut packet = init_packet(index, *init, storage);
                    packet.virtual_packet_flag = config.virtual_packet_flag;

                    match run_one_packet(storage, &mut packet, &window, &virtual_spectrum, &mut rng) {
                        Ok(reabsorbed) => {
                            nus[offset] = packet.nu;
                            energies[offset] = if reabsorbed { -packet.energy } else { packet.energy };
                            interactions[offset] = packet.last_interaction;
                        }
                        Err(error) => {
                            error!("packet {index} failed transport: {error}");
                            nus[offset] = packet.nu;
                            energies[offset] = 0.0;
                            failed_packets.lock().unwrap().push(FailedPacket { index, error });
                        }
                    }
                }
            });
    });

    RunOutputs {
        output_nu,
        output_energy,
        last_interactions,
        virtual_spectrum,
        failed_packets: failed_packets.into_inner().expect("failed_packets mutex poisoned"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{AtomicF64, ContinuumStatus};
    use float_cmp::approx_eq;

    fn test_storage() -> StorageModel {
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
    fn every_packet_gets_a_finite_output_and_no_crash_on_empty_line_list() {
        let storage = test_storage();
        let config = RunConfig::single_threaded(123).with_spectrum_window(0.0, 10.0, 1.0);
        let packets: Vec<_> = (0..20)
            .map(|i| PacketInit {
                r: 1.5,
                mu: -1.0 + 2.0 * (i as f64) / 20.0,
                nu: 1.0,
                energy: 1.0,
            })
            .collect();

        let outputs = run_monte_carlo(&storage, &config, &packets);
        assert_eq!(outputs.output_nu.len(), 20);
        assert_eq!(outputs.output_energy.len(), 20);
        assert!(outputs.failed_packets.is_empty());
        for e in &outputs.output_energy {
            assert!(e.abs() <= 1.0 || approx_eq!(f64, e.abs(), 1.0, epsilon = 1e-9));
        }
    }

    #[test]
    fn multi_threaded_chunking_assigns_disjoint_output_indices() {
        let storage = test_storage();
        let config = RunConfig::single_threaded(7).with_n_threads(4);
        let packets: Vec<_> = (0..17)
            .map(|_| PacketInit {
                r: 1.5,
                mu: 0.5,
                nu: 1.0,
                energy: 2.0,
            })
            .collect();

        let outputs = run_monte_carlo(&storage, &config, &packets);
        assert_eq!(outputs.output_nu.len(), 17);
        assert!(outputs.output_energy.iter().all(|e| *e != 0.0 || !outputs.failed_packets.is_empty()));
    }

    #[test]
    fn reflective_inner_boundary_with_albedo_one_never_reabsorbs_at_the_inner_edge() {
        let mut storage = test_storage();
        storage.reflective_inner_boundary = true;
        storage.inner_boundary_albedo = 1.0;
        let config = RunConfig::single_threaded(55);
        let packets: Vec<_> = (0..10)
            .map(|i| PacketInit {
                r: 1.05,
                mu: -0.9 + 0.1 * (i as f64),
                nu: 1.0,
                energy: 1.0,
            })
            .collect();

        let outputs = run_monte_carlo(&storage, &config, &packets);
        assert!(outputs.output_energy.iter().all(|e| *e >= 0.0));
    }
}
