//! Virtual-packet ("peel-off") variance reduction: on each real interaction, spawn
//! deterministic shadow packets toward the observer to build a low-noise spectrum
//! estimator.

use std::sync::Mutex;

use crate::driver::run_packet_loop;
use crate::geometry::doppler_factor;
use crate::packet::RPacket;
use crate::rng::WorkerRng;
use crate::storage::{AtomicF64, StorageModel};

/// Selects the angle-weighting scheme a virtual-packet pass uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualMode {
    /// Spawned from an inner-boundary reflection.
    Reflection,
    /// The initial-emission pass run once per real packet before its real loop.
    InitialEmission,
    /// Spawned from a Thomson or line scatter.
    Scatter,
}

/// One recorded virtual-packet emission.
#[derive(Debug, Clone, Copy)]
pub struct VirtualRecord {
    /// Emergent lab-frame frequency.
    pub nu: f64,
    /// Weighted emergent energy.
    pub energy: f64,
    /// The frequency of whatever real interaction spawned this packet.
    pub last_interaction_in_nu: f64,
    /// The interaction type of whatever real interaction spawned this packet.
    pub last_interaction_type: i32,
    /// The line id the spawning interaction was entered at.
    pub last_line_interaction_in_id: i64,
    /// The line id the spawning interaction emerged at.
    pub last_line_interaction_out_id: i64,
}

/// Spectral window bounds relevant to virtual packets.
#[derive(Debug, Clone, Copy)]
pub struct SpectralWindow {
    /// Virtual packets with `nu` outside `(virt_start, virt_end)` are skipped entirely.
    pub virt_start_nu: f64,
    /// See [`Self::virt_start_nu`].
    pub virt_end_nu: f64,
    /// Emergent virtual packets with `nu` inside `(spec_start, spec_end)` are binned.
    pub spec_start_nu: f64,
    /// See [`Self::spec_start_nu`].
    pub spec_end_nu: f64,
    /// Bin width for [`VirtualSpectrum::spectrum_virt_nu`].
    pub spec_delta_nu: f64,
}

/// Growable storage for the virtual-packet spectrum: per-bin accumulated energy plus the
/// full per-packet record list.
pub struct VirtualSpectrum {
    /// Binned virtual-packet energy, accumulated additively.
    pub spectrum_virt_nu: Vec<AtomicF64>,
    /// Every virtual packet that landed inside the spectral window, in no particular
    /// cross-worker order. Appends (and the vector's amortized-growth reallocation) are
    /// serialized by the mutex, matching the single-critical-section-per-append
    /// contract.
    pub records: Mutex<Vec<VirtualRecord>>,
}

impl VirtualSpectrum {
    /// Creates spectrum storage with `n_bins` bins and an initial record capacity hint
    /// of `capacity_hint` (typically the packet count).
    #[must_use]
    pub fn new(n_bins: usize, capacity_hint: usize) -> Self {
        Self {
            spectrum_virt_nu: (0..n_bins).map(|_| AtomicF64::new(0.0)).collect(),
            records: Mutex::new(Vec::with_capacity(capacity_hint)),
        }
    }
}

/// Spawns `packet.virtual_packet_flag` peel-off packets from `packet`'s current state,
/// running each through the virtual single-packet loop and recording any that land in
/// the spectral window.
///
/// No-op unless `packet.nu` lies strictly inside `(window.virt_start_nu,
/// window.virt_end_nu)`.
#[allow(clippy::too_many_arguments)]
pub fn spawn_virtual_packets(
    packet: &RPacket,
    storage: &StorageModel,
    window: &SpectralWindow,
    spectrum: &VirtualSpectrum,
    mode: VirtualMode,
    rng: &mut WorkerRng,
) {
    if !(packet.nu > window.virt_start_nu && packet.nu < window.virt_end_nu) {
        return;
    }

    let v = packet.virtual_packet_flag;
    if v == 0 {
        return;
    }

    let r_in_0 = storage.r_in[0];
    let mu_min = if packet.r > r_in_0 {
        -(1.0 - (r_in_0 / packet.r).powi(2)).sqrt()
    } else {
        0.0
    };
    let mu_bin = (1.0 - mu_min) / f64::from(v);
    let old_doppler_factor = doppler_factor(packet, storage);

    for i in 0..v {
        let mut virt_packet = packet.clone();
        virt_packet.is_virtual = true;
        virt_packet.mu = mu_min + (f64::from(i) + rng.uniform()) * mu_bin;

        let weight = match mode {
            VirtualMode::Reflection => 1.0 / f64::from(v),
            VirtualMode::InitialEmission => 2.0 * virt_packet.mu / f64::from(v),
            VirtualMode::Scatter => (1.0 - mu_min) / 2.0 / f64::from(v),
        };

        let new_doppler_factor = doppler_factor(&virt_packet, storage);
        let doppler_ratio = old_doppler_factor / new_doppler_factor;
        virt_packet.energy = packet.energy * doppler_ratio;
        virt_packet.nu = packet.nu * doppler_ratio;

        // Propagation failures on a peel-off ray are not reported as failed packets:
        // the ray is a variance-reduction device, not a physical packet, so it is
        // simply dropped from the spectrum rather than counted as a transport failure.
        if run_packet_loop(storage, &mut virt_packet, true, window, spectrum, rng).is_err() {
            continue;
        }

        if virt_packet.nu > window.spec_start_nu && virt_packet.nu < window.spec_end_nu {
            let energy = virt_packet.energy * weight;
            let record = VirtualRecord {
                nu: virt_packet.nu,
                energy,
                last_interaction_in_nu: packet.last_interaction.in_nu,
                last_interaction_type: packet.last_interaction.r#type,
                last_line_interaction_in_id: packet.last_interaction.line_in_id,
                last_line_interaction_out_id: packet.last_interaction.line_out_id,
            };

            let bin = ((virt_packet.nu - window.spec_start_nu) / window.spec_delta_nu) as usize;
            if let Some(bin_estimator) = spectrum.spectrum_virt_nu.get(bin) {
                bin_estimator.fetch_add(energy);
            }
            spectrum.records.lock().unwrap().push(record);
        }
    }
}
