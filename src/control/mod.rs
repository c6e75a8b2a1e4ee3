// src/control/mod.rs

//! Control channel between a remote driver and the agent.
//!
//! - [`frame`]: `[u32 BE length][u8 code][payload]` framing.
//! - [`packet`]: typed packets per command code.
//! - [`dispatch`]: code -> handler routing; driver commands become
//!   scheduled commands on the agent.
//! - [`server`]: TCP accept loop.
//! - [`heartbeat`]: driver-side liveness loop with bounded reconnects.

pub mod dispatch;
pub mod frame;
pub mod heartbeat;
pub mod packet;
pub mod server;
pub mod state;

pub use dispatch::{Dispatcher, HeartbeatHandler, InjectHandler, PacketHandler};
pub use frame::{read_frame, write_frame, Frame, MAX_FRAME_LEN};
pub use heartbeat::{ConnectionState, HeartbeatLink, HeartbeatLoop, LinkFuture, TcpLink};
pub use packet::{ChangeTraceMethod, Packet, ReloadClass};
pub use server::{bind, handle_connection, serve};
pub use state::{RunResults, TraceTable, TracedMethod};
