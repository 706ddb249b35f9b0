//! The animal game: dynamic rooms of moving targets, wagers resolved against
//! them, skills, bullets, and the shared jackpot.
//!
//! - [`room`] owns the per-room tick state machine and sharding
//! - [`generator`] samples kinds, paths and speeds
//! - [`resolver`] turns one bet into a payout decision
//! - [`bullets`] tracks fired, wallet-debited shot handles
//! - [`handler`] binds the 1801..1815 message ids to all of the above

pub mod bullets;
pub mod generator;
pub mod handler;
pub mod paths;
pub mod resolver;
pub mod room;
pub mod types;
