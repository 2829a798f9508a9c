//! Channel negotiation and payload routing for the radio gateway.
//!
//! The [`Router`] is the single owner of the client registry, the channel
//! tables and the transform registry. Two producers feed it: the radio poll
//! loop (raw frames) and the bus consumer (deliveries). It emits encrypted
//! [`OutboundFrame`](gateway_wire::OutboundFrame)s for the radio transmitter
//! and publishes decoded sensor messages on the bus.
//!
//! ## Message kinds
//!
//! | kind          | direction      | handling                                         |
//! |---------------|----------------|--------------------------------------------------|
//! | `REGISTER`    | node → gateway | assign/resolve node id, clear channels, reply ack |
//! | `PUB_CHANNEL` | node → gateway | bind `(node, channel)` to a routing key           |
//! | `SUB_CHANNEL` | node → gateway | subscribe `(node, channel)` to a routing key      |
//! | `PUB`         | both           | node payload → bus, or bus message → node         |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod error;
pub mod router;
pub mod stats;

pub use channel::{ChannelDeclaration, ChannelId, ChannelTable, PublishBinding, SubscriptionBinding};
pub use error::RouteError;
pub use router::{Router, RouterConfig, IDENTITY_SIZE};
pub use stats::RouterStats;
