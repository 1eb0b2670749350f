//! The propagating energy packet (`RPacket`) and its status.

/// Lifecycle status of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketStatus {
    /// Still being transported.
    InProcess,
    /// Escaped through the outer boundary.
    Emitted,
    /// Absorbed, or lost through the inner boundary.
    Reabsorbed,
}

/// Records of a packet's most recent line/continuum interaction, used both for the
/// per-real-packet output and copied onto virtual-packet records when one is spawned.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastInteraction {
    /// Lab-frame frequency at the moment the interaction was entered.
    pub in_nu: f64,
    /// Interaction type: `0` none yet, `1` Thomson, `2` line, `3` bound-free, `4` free-free.
    pub r#type: i32,
    /// Line id the packet was travelling towards when it scattered (line interactions
    /// only).
    pub line_in_id: i64,
    /// Line id the packet emerged at after a line interaction.
    pub line_out_id: i64,
    /// Shell id in which the line interaction occurred.
    pub shell_id: i64,
}

impl LastInteraction {
    /// A record meaning "no interaction has happened yet": ids default to `-1` so they
    /// are visibly distinct from a real line index.
    #[must_use]
    pub fn none() -> Self {
        Self {
            in_nu: 0.0,
            r#type: 0,
            line_in_id: -1,
            line_out_id: -1,
            shell_id: -1,
        }
    }
}

/// A single Monte Carlo energy packet propagating through the shell-stratified
/// atmosphere.
///
/// Invariants (checked at construction and after every mutating operation in
/// `crate::geometry`/`crate::interaction`): `mu` in `[-1, 1]`; `nu > 0`; if `last_line`
/// then `next_line_id == n_lines`; `tau_event >= 0` at interaction boundaries.
#[derive(Debug, Clone)]
pub struct RPacket {
    /// Radius.
    pub r: f64,
    /// Direction cosine relative to the radial direction.
    pub mu: f64,
    /// Lab-frame frequency.
    pub nu: f64,
    /// Lab-frame energy.
    pub energy: f64,
    /// Current shell index.
    pub current_shell_id: usize,
    /// Next-shell hint: `-1` inward, `0` unset, `+1` outward.
    pub next_shell_id: i8,
    /// Index of the next line candidate in the (descending) line list.
    pub next_line_id: usize,
    /// Co-moving frequency of the line this packet is currently resonant with.
    pub nu_line: f64,
    /// No more redward lines remain.
    pub last_line: bool,
    /// The next line is within `1e-7` fractional separation of the current one.
    pub close_line: bool,
    /// Mirrors the last shell boundary this packet crossed (`0`, or `+1`/`-1`).
    pub recently_crossed_boundary: i8,
    /// Cached distance to the current shell's boundary.
    pub d_boundary: f64,
    /// Cached distance to the next line.
    pub d_line: f64,
    /// Cached distance to the next continuum event.
    pub d_continuum: f64,
    /// Cached Thomson opacity.
    pub chi_e: f64,
    /// Cached bound-free opacity.
    pub chi_bf: f64,
    /// Cached free-free opacity.
    pub chi_ff: f64,
    /// Cached total continuum opacity (`chi_e + chi_bf + chi_ff`).
    pub chi_continuum: f64,
    /// Accumulated optical depth since the last resolving event.
    pub tau_event: f64,
    /// Packet id, stable across virtual-packet clones spawned from it.
    pub id: usize,
    /// Whether this packet instance is itself a virtual (peel-off) packet.
    pub is_virtual: bool,
    /// Number of virtual packets to spawn per interaction (`0` disables virtual
    /// packets). Carried unchanged into clones.
    pub virtual_packet_flag: u32,
    /// Id of the continuum edge currently bracketing this packet's co-moving frequency.
    pub current_continuum_id: usize,
    /// Cumulative bound-free opacity per continuum edge, owned by this packet so that
    /// concurrent packets never share (and race on) the same scratch buffer.
    pub chi_bf_tmp_partial: Vec<f64>,
    /// Lifecycle status.
    pub status: PacketStatus,
    /// The packet's most recent interaction record.
    pub last_interaction: LastInteraction,
}

impl RPacket {
    /// Builds a new real packet from its initial lab-frame state.
    #[must_use]
    pub fn new(id: usize, r: f64, mu: f64, nu: f64, energy: f64, n_edges: usize) -> Self {
        debug_assert!((-1.0..=1.0).contains(&mu));
        debug_assert!(nu > 0.0);
        debug_assert!(energy >= 0.0);
        Self {
            r,
            mu,
            nu,
            energy,
            current_shell_id: 0,
            next_shell_id: 0,
            next_line_id: 0,
            nu_line: 0.0,
            last_line: false,
            close_line: false,
            recently_crossed_boundary: 0,
            d_boundary: 0.0,
            d_line: 0.0,
            d_continuum: 0.0,
            chi_e: 0.0,
            chi_bf: 0.0,
            chi_ff: 0.0,
            chi_continuum: 0.0,
            tau_event: 0.0,
            id,
            is_virtual: false,
            virtual_packet_flag: 0,
            current_continuum_id: 0,
            chi_bf_tmp_partial: vec![0.0; n_edges],
            status: PacketStatus::InProcess,
            last_interaction: LastInteraction::none(),
        }
    }

    /// Checks the invariants that must hold at every function boundary.
    pub fn check_invariants(&self) {
        debug_assert!(
            (-1.0..=1.0).contains(&self.mu),
            "mu out of range: {}",
            self.mu
        );
        debug_assert!(self.r >= 0.0, "r negative: {}", self.r);
        debug_assert!(self.nu > 0.0, "nu non-positive: {}", self.nu);
        debug_assert!(self.energy >= 0.0, "energy negative: {}", self.energy);
    }
}
