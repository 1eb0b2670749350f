//! The macro-atom transition walk: redistributes an absorbed line photon to an emission
//! line drawn from tabulated transition probabilities.

use crate::packet::RPacket;
use crate::rng::WorkerRng;
use crate::storage::{MacroAtomData, StorageModel};

/// Runs the macro-atom random walk for a packet that just absorbed a line photon,
/// returning the emission line id.
///
/// Invariant relied upon: for each macro-atom level, the tabulated transition
/// probabilities in its block sum to `1`, so the cumulative-sum scan below is
/// guaranteed to terminate.
pub fn macro_atom(packet: &RPacket, storage: &StorageModel, macro_atom: &MacroAtomData, rng: &mut WorkerRng) -> usize {
    let mut activate_level = macro_atom.line2macro_level_upper[packet.next_line_id - 1];

    loop {
        let event_random = rng.uniform();
        let mut i = macro_atom.macro_block_references[activate_level];
        let stride = macro_atom.transition_probabilities_nd;
        let row = packet.current_shell_id * stride;

        let mut p = macro_atom.transition_probabilities[row + i];
        while p <= event_random {
            i += 1;
            p += macro_atom.transition_probabilities[row + i];
        }

        let emit = macro_atom.transition_type[i];
        activate_level = macro_atom.destination_level_id[i];

        if emit == -1 {
            return macro_atom.transition_line_id[i];
        }
    }
}
