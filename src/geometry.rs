//! Distance-to-boundary, distance-to-line, and packet motion under homologous
//! expansion.

use log::error;

use crate::error::{Error, Result};
use crate::packet::RPacket;
use crate::storage::StorageModel;

/// Speed of light, cm/s.
pub const C: f64 = 2.998e10;
/// `1 / C`.
pub const INVERSE_C: f64 = 1.0 / C;
/// Sentinel "no intersection" distance, used in place of `+inf` to match the reference
/// model's sentinel-based branching while staying a finite, comparable `f64`.
pub const MISS_DISTANCE: f64 = 1e99;

/// Doppler factor `D = 1 - mu * r / (c * t_exp)` evaluated at the packet's current
/// position, used by callers to transform energy/frequency between the lab and
/// co-moving frames.
#[must_use]
pub fn doppler_factor(packet: &RPacket, storage: &StorageModel) -> f64 {
    1.0 - packet.mu * packet.r * storage.inverse_time_explosion * INVERSE_C
}

/// Computes the distance to the current shell's boundary and sets `packet.next_shell_id`
/// to `-1` (inward) or `+1` (outward) accordingly.
pub fn distance_to_boundary(packet: &mut RPacket, storage: &StorageModel) -> f64 {
    let r = packet.r;
    let mu = packet.mu;
    let r_outer = storage.r_out[packet.current_shell_id];
    let r_inner = storage.r_in[packet.current_shell_id];

    let d_outer = (r_outer * r_outer + (mu * mu - 1.0) * r * r).sqrt() - r * mu;

    if packet.recently_crossed_boundary == 1 {
        packet.next_shell_id = 1;
        return d_outer;
    }

    let discriminant = r_inner * r_inner + r * r * (mu * mu - 1.0);
    if discriminant < 0.0 {
        packet.next_shell_id = 1;
        return d_outer;
    }

    let d_inner = if mu < 0.0 {
        -r * mu - discriminant.sqrt()
    } else {
        MISS_DISTANCE
    };

    if d_inner < d_outer {
        packet.next_shell_id = -1;
        d_inner
    } else {
        packet.next_shell_id = 1;
        d_outer
    }
}

/// Computes the distance to the packet's next line interaction.
///
/// Returns [`Error::ComovNuLessThanNuLine`] if the co-moving frequency has fallen below
/// the target line's frequency: a geometric ordering violation that the packet cannot
/// recover from. Before propagating the error, logs the current, previous, and next
/// tabulated line frequencies, plus `r`, `mu`, `nu`, the Doppler factor, and the current
/// shell id, through the `log` facade at error level.
pub fn distance_to_line(packet: &RPacket, storage: &StorageModel) -> Result<f64> {
    if packet.last_line {
        return Ok(MISS_DISTANCE);
    }

    let doppler_factor = 1.0
        - packet.mu * packet.r * storage.inverse_time_explosion * INVERSE_C;
    let comov_nu = packet.nu * doppler_factor;
    let nu_line = packet.nu_line;

    if comov_nu < nu_line {
        let previous_nu_line = packet
            .next_line_id
            .checked_sub(1)
            .and_then(|i| storage.line_list_nu.get(i));
        let next_nu_line = storage.line_list_nu.get(packet.next_line_id + 1);

        error!(
            "comoving nu ({comov_nu}) less than nu_line ({nu_line}) in shell {shell_id}: \
             previous tabulated line={previous_nu_line:?}, current={nu_line}, \
             next tabulated line={next_nu_line:?}, r={r}, mu={mu}, nu={nu}, \
             doppler_factor={doppler_factor}",
            shell_id = packet.current_shell_id,
            r = packet.r,
            mu = packet.mu,
            nu = packet.nu,
        );

        return Err(Error::ComovNuLessThanNuLine {
            comov_nu,
            nu_line,
            shell_id: packet.current_shell_id,
        });
    }

    Ok(((comov_nu - nu_line) / packet.nu) * C * storage.time_explosion)
}

/// Moves `packet` a (non-negative) `distance` along its current direction, updating `r`
/// and `mu` exactly (`r' = sqrt(r^2 + d^2 + 2 r d mu)`, `mu' = (mu r + d) / r'`).
///
/// Returns the Doppler factor evaluated at the **old** position. For real (non-virtual)
/// packets, accumulates the path-integrated intensity estimators `j_s`/`nubar_s` for the
/// packet's current shell.
pub fn move_packet(packet: &mut RPacket, storage: &StorageModel, distance: f64) -> f64 {
    let doppler_factor = doppler_factor(packet, storage);

    if distance > 0.0 {
        let r = packet.r;
        let new_r = (r * r + distance * distance + 2.0 * r * distance * packet.mu).sqrt();
        packet.mu = (packet.mu * r + distance) / new_r;
        packet.r = new_r;

        if !packet.is_virtual {
            let comov_energy = packet.energy * doppler_factor;
            let comov_nu = packet.nu * doppler_factor;
            storage.j_s[packet.current_shell_id].fetch_add(comov_energy * distance);
            storage.nubar_s[packet.current_shell_id]
                .fetch_add(comov_energy * distance * comov_nu);
        }
    }

    packet.check_invariants();
    doppler_factor
}

/// Accumulates the blue-wing intensity estimator `j_blues[shell, line]` for a real
/// packet about to interact with `line_id` after travelling `d_line` from its current
/// (pre-move) position. The Doppler factor is recomputed at the interaction point, not
/// at the packet's pre-move position.
pub fn increment_j_blue_estimator(
    packet: &RPacket,
    storage: &StorageModel,
    d_line: f64,
    line_id: usize,
) {
    let r = packet.r;
    let r_interaction = (r * r + d_line * d_line + 2.0 * r * d_line * packet.mu).sqrt();
    let mu_interaction = (packet.mu * r + d_line) / r_interaction;
    let doppler_factor =
        1.0 - mu_interaction * r_interaction * storage.inverse_time_explosion * INVERSE_C;
    let comov_energy = packet.energy * doppler_factor;
    let idx = storage.line_index(packet.current_shell_id, line_id);
    storage.j_blues[idx].fetch_add(comov_energy / packet.nu);
}
