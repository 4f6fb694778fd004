//! Snapshot transport for external dashboards.
//!
//! Layered strictly on top of the published snapshot: the server only ever
//! broadcasts [`DisplayData`](crate::DisplayData) copies and forwards client
//! refresh requests to the publisher. Capture and aggregation never touch a
//! socket.

pub mod protocol;
pub mod server;
