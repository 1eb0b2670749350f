#![warn(clippy::all, clippy::cargo, clippy::nursery, clippy::pedantic)]
#![warn(missing_docs)]

//! Monte Carlo radiative transfer kernel for a 1D, homologously expanding, spherically
//! symmetric supernova atmosphere. Propagates energy packets through line (Sobolev),
//! Thomson, bound-free, and free-free interactions, with virtual-packet variance
//! reduction, and collects the emergent spectrum and radiation-field estimators consumed
//! by an outer plasma-state solver.

pub mod config;
pub mod driver;
pub mod error;
pub mod geometry;
pub mod interaction;
pub mod macro_atom;
pub mod main_loop;
pub mod opacity;
pub mod packet;
pub mod rng;
pub mod search;
pub mod storage;
pub mod virtual_packet;

pub use config::RunConfig;
pub use error::{Error, Result};
pub use main_loop::{run_monte_carlo, FailedPacket, PacketInit, RunOutputs};
pub use packet::RPacket;
pub use storage::StorageModel;
