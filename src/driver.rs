//! Event selection and the single-packet event loop: the code path shared by real and
//! virtual packets alike.

use crate::error::Result;
use crate::geometry::{distance_to_boundary, distance_to_line};
use crate::interaction::{bound_free_scatter, cross_shell_boundary, free_free_scatter, line_scatter, thomson_scatter};
use crate::opacity::compute_distance_to_continuum;
use crate::packet::{PacketStatus, RPacket};
use crate::rng::WorkerRng;
use crate::storage::{ContinuumStatus, StorageModel};
use crate::virtual_packet::{SpectralWindow, VirtualSpectrum};

/// The event selected for a packet at its current position: whichever of
/// distance-to-line, distance-to-boundary, and distance-to-continuum is smallest, with the
/// continuum channel further resolved into its Thomson/bound-free/free-free sub-event.
enum Event {
    LineScatter,
    BoundaryCross,
    Thomson,
    BoundFree,
    FreeFree,
}

/// Refreshes `d_boundary`, `d_line`, and the continuum opacities/`d_continuum` on `packet`,
/// honoring the `close_line` short-circuit (an immediately-following close line resolves at
/// zero distance rather than being recomputed).
fn compute_distances(packet: &mut RPacket, storage: &StorageModel) -> Result<()> {
    if packet.close_line {
        packet.d_line = 0.0;
        packet.close_line = false;
    } else {
        packet.d_boundary = distance_to_boundary(packet, storage);
        packet.d_line = distance_to_line(packet, storage)?;
        compute_distance_to_continuum(packet, storage);
    }
    Ok(())
}

/// Picks the minimum-distance event, with line scatter winning ties against boundary and
/// continuum, and boundary winning ties against continuum. Continuum further resolves its
/// sub-channel by thresholding a draw against the normalized cumulative opacities.
fn select_event(packet: &RPacket, storage: &StorageModel, rng: &mut WorkerRng) -> (Event, f64) {
    let d_boundary = packet.d_boundary;
    let d_line = packet.d_line;
    let d_continuum = packet.d_continuum;

    if d_line <= d_boundary && d_line <= d_continuum {
        (Event::LineScatter, d_line)
    } else if d_boundary <= d_continuum {
        (Event::BoundaryCross, d_boundary)
    } else {
        let event = match storage.continuum_status {
            ContinuumStatus::Off => Event::Thomson,
            ContinuumStatus::On => {
                let z = rng.uniform();
                let norm_th = packet.chi_e / packet.chi_continuum;
                let norm_bf = packet.chi_bf / packet.chi_continuum;
                if z < norm_th {
                    Event::Thomson
                } else if z < norm_th + norm_bf {
                    Event::BoundFree
                } else {
                    Event::FreeFree
                }
            }
        };
        (event, d_continuum)
    }
}

/// Runs a packet (real or virtual) to completion: repeatedly selects and dispatches the
/// minimum-distance event until the packet leaves `InProcess`. Returns whether the packet
/// ended `Reabsorbed` (as opposed to `Emitted`).
///
/// For virtual packets, an early cutoff fires once `tau_event` exceeds `10`: the ray is
/// treated as optically thick and immediately emitted with `tau_event` pinned to `100`, and
/// on exit its energy is attenuated by `exp(-tau_event)`.
pub fn run_packet_loop(
    storage: &StorageModel,
    packet: &mut RPacket,
    is_virtual: bool,
    window: &SpectralWindow,
    spectrum: &VirtualSpectrum,
    rng: &mut WorkerRng,
) -> Result<bool> {
    packet.tau_event = 0.0;
    packet.nu_line = 0.0;
    packet.is_virtual = is_virtual;
    packet.status = PacketStatus::InProcess;
    if !is_virtual {
        packet.tau_event = rng.exp_tau();
    }

    while packet.status == PacketStatus::InProcess {
        if !packet.last_line {
            packet.nu_line = storage.line_list_nu[packet.next_line_id];
        }

        compute_distances(packet, storage)?;
        let (event, distance) = select_event(packet, storage, rng);

        match event {
            Event::LineScatter => line_scatter(packet, storage, distance, window, spectrum, rng),
            Event::BoundaryCross => cross_shell_boundary(packet, storage, distance, window, spectrum, rng),
            Event::Thomson => thomson_scatter(packet, storage, distance, window, spectrum, rng),
            Event::BoundFree => bound_free_scatter(packet, storage, rng),
            Event::FreeFree => free_free_scatter(packet),
        }

        if is_virtual && packet.tau_event > 10.0 {
            packet.tau_event = 100.0;
            packet.status = PacketStatus::Emitted;
        }
    }

    if is_virtual {
        packet.energy *= (-packet.tau_event).exp();
    }

    Ok(packet.status == PacketStatus::Reabsorbed)
}

/// Runs one real packet end to end: an initial-emission virtual pass (if virtual packets
/// are enabled), then the real transport loop. Returns whether the packet was ultimately
/// reabsorbed.
pub fn run_one_packet(
    storage: &StorageModel,
    packet: &mut RPacket,
    window: &SpectralWindow,
    spectrum: &VirtualSpectrum,
    rng: &mut WorkerRng,
) -> Result<bool> {
    if packet.virtual_packet_flag > 0 {
        crate::virtual_packet::spawn_virtual_packets(
            packet,
            storage,
            window,
            spectrum,
            crate::virtual_packet::VirtualMode::InitialEmission,
            rng,
        );
    }

    run_packet_loop(storage, packet, false, window, spectrum, rng)
}
