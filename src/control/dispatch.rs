// src/control/dispatch.rs

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::command::{Command, UnitSource};
use crate::control::frame::Frame;
use crate::control::packet::{
    Packet, CHANGE_TRACE_METHOD, CLEAR_RUN_RESULT, HEARTBEAT_REQUEST, HEARTBEAT_RESPONSE,
    RELOAD_CLASS,
};
use crate::control::state::{RunResults, TraceTable, TracedMethod};
use crate::engine::Agent;
use crate::errors::{HotswapError, Result};
use crate::types::{LoaderScope, UnitId};

/// Handles decoded packets of the codes it is registered for.
pub trait PacketHandler: Send + Sync + 'static {
    /// Returns the packet to send back, if any.
    fn handle(&self, packet: Packet) -> Result<Option<Packet>>;
}

/// Answers heartbeat requests.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeartbeatHandler;

impl PacketHandler for HeartbeatHandler {
    fn handle(&self, packet: Packet) -> Result<Option<Packet>> {
        match packet {
            Packet::HeartbeatRequest => Ok(Some(Packet::HeartbeatResponse)),
            _ => Ok(None),
        }
    }
}

/// Turns driver packets into commands on an [`Agent`].
pub struct InjectHandler {
    agent: Arc<Agent>,
    traces: Arc<TraceTable>,
    results: Arc<RunResults>,
}

impl fmt::Debug for InjectHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectHandler")
            .field("traces", &self.traces)
            .field("results", &self.results)
            .finish_non_exhaustive()
    }
}

impl InjectHandler {
    pub fn new(agent: Arc<Agent>, traces: Arc<TraceTable>, results: Arc<RunResults>) -> Self {
        Self {
            agent,
            traces,
            results,
        }
    }
}

impl PacketHandler for InjectHandler {
    fn handle(&self, packet: Packet) -> Result<Option<Packet>> {
        match packet {
            Packet::ChangeTraceMethod(body) => {
                let name = format!("trace:{}#{}", body.class_name, body.method_name);
                let traces = Arc::clone(&self.traces);
                let method = TracedMethod {
                    class_name: body.class_name,
                    method_name: body.method_name,
                    method_description: body.method_description,
                };
                let trace = body.trace;
                self.agent.inject(
                    Command::task(name, move || {
                        traces.set(method.clone(), trace);
                        Ok(())
                    }),
                    Duration::ZERO,
                );
            }
            Packet::ClearRunResult { field } => {
                let results = Arc::clone(&self.results);
                let name = format!("clear-run-result:{field}");
                self.agent.inject(
                    Command::task(name, move || {
                        let cleared = results.clear(&field);
                        debug!(field = %field, cleared, "cleared run results");
                        Ok(())
                    }),
                    Duration::ZERO,
                );
            }
            Packet::ReloadClass(body) => {
                let unit = UnitId::new(body.loader.as_deref().map(LoaderScope::new), body.class_name);
                info!(unit = %unit, path = %body.path, "reload requested by driver");
                let command = Command::redefine(unit, UnitSource::File(PathBuf::from(body.path)));
                self.agent.inject(command, self.agent.options().debounce);
            }
            Packet::HeartbeatRequest | Packet::HeartbeatResponse => {}
        }
        Ok(None)
    }
}

/// Routes frames to handlers by command code.
pub struct Dispatcher {
    handlers: HashMap<u8, Arc<dyn PacketHandler>>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut codes: Vec<u8> = self.handlers.keys().copied().collect();
        codes.sort_unstable();
        f.debug_struct("Dispatcher").field("codes", &codes).finish()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// A dispatcher that answers heartbeats and nothing else.
    pub fn new() -> Self {
        let mut dispatcher = Self {
            handlers: HashMap::new(),
        };
        let heartbeat: Arc<dyn PacketHandler> = Arc::new(HeartbeatHandler);
        dispatcher.register(HEARTBEAT_REQUEST, Arc::clone(&heartbeat));
        dispatcher.register(HEARTBEAT_RESPONSE, heartbeat);
        dispatcher
    }

    /// Heartbeats plus every driver command routed into `agent`.
    pub fn for_agent(agent: Arc<Agent>, traces: Arc<TraceTable>, results: Arc<RunResults>) -> Self {
        let mut dispatcher = Self::new();
        let inject: Arc<dyn PacketHandler> = Arc::new(InjectHandler::new(agent, traces, results));
        for code in [CHANGE_TRACE_METHOD, CLEAR_RUN_RESULT, RELOAD_CLASS] {
            dispatcher.register(code, Arc::clone(&inject));
        }
        dispatcher
    }

    /// Register `handler` for `code`, replacing any previous one.
    pub fn register(&mut self, code: u8, handler: Arc<dyn PacketHandler>) {
        self.handlers.insert(code, handler);
    }

    pub fn handles(&self, code: u8) -> bool {
        self.handlers.contains_key(&code)
    }

    pub fn dispatch(&self, frame: &Frame) -> Result<Option<Frame>> {
        let Some(handler) = self.handlers.get(&frame.code) else {
            return Err(HotswapError::Protocol(format!(
                "no handler for command code {}",
                frame.code
            )));
        };
        let packet = Packet::from_frame(frame)?;
        debug!(code = frame.code, "dispatching packet");
        match handler.handle(packet)? {
            Some(response) => Ok(Some(response.to_frame()?)),
            None => Ok(None),
        }
    }
}
