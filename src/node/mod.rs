//! Ring nodes: identity, protocol messages and the per-node state machine.
//!
//! Nodes never read each other's state. Everything they learn arrives
//! in their inbox, and everything they do leaves through their outbox.
//!
//! # Module structure
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`id`] | [`NodeId`] newtype |
//! | [`message`] | [`Message`], [`NetworkReport`], [`Envelope`] |
//! | [`detector`] | [`FailureDetector`] |
//! | [`agent`] | [`RingNode`], [`Action`], [`Router`] |

pub mod agent;
pub mod detector;
pub mod id;
pub mod message;

pub use agent::{Action, NodeState, Outgoing, RingNode, Router};
pub use detector::{DetectorAction, DetectorState, FailureDetector};
pub use id::NodeId;
pub use message::{Envelope, Message, NetworkReport};
