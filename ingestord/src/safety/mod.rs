//! Safety Probes: stateless predicates gating whether a folder is safe to
//! move this pass.

pub mod fuzzy;
pub mod newsgroup_probe;
pub mod peer_probe;
pub mod settle;

pub use newsgroup_probe::{NewsgroupProbe, NewsgroupProbeConfig};
pub use peer_probe::{PeerProbe, PeerProbeConfig};
pub use settle::is_settled;
