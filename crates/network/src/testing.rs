//! Scripted in-memory transport for unit tests

use crate::config::SessionConfig;
use crate::session::Session;
use crate::transport::Transport;
use std::cell::Cell;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;
use ut2query_core::{QueryError, Result};

/// What the remote does after each send
#[derive(Debug, Clone)]
pub enum Step {
    /// No response within the timeout
    Drop,
    /// One response
    Reply(Vec<u8>),
    /// Socket-level failure
    Fail,
}

impl Step {
    pub fn reply(data: &[u8]) -> Self {
        Step::Reply(data.to_vec())
    }
}

/// Plays back one [`Step`] per receive; an empty script drops everything
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    pub script: VecDeque<Step>,
    pub sent: Vec<Vec<u8>>,
    closes: Rc<Cell<u32>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Step>) -> Self {
        Self {
            script: script.into(),
            ..Default::default()
        }
    }

    pub fn close_counter(&self) -> Rc<Cell<u32>> {
        Rc::clone(&self.closes)
    }
}

impl Transport for ScriptedTransport {
    fn connect(_remote: SocketAddr, _config: &SessionConfig) -> Result<Self> {
        Ok(Self::default())
    }

    fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.sent.push(payload.to_vec());
        Ok(())
    }

    fn recv_timeout(&mut self, _timeout: Duration) -> Result<Option<Vec<u8>>> {
        match self.script.pop_front() {
            Some(Step::Reply(data)) => Ok(Some(data)),
            Some(Step::Fail) => Err(QueryError::Connection("scripted failure".to_string())),
            Some(Step::Drop) | None => Ok(None),
        }
    }

    fn close(&mut self) {
        self.closes.set(self.closes.get() + 1);
    }
}

pub fn remote() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 28902))
}

pub fn session_with(script: Vec<Step>, max_attempts: u32) -> Session<ScriptedTransport> {
    let config = SessionConfig::new(Duration::from_millis(10), max_attempts);
    Session::with_transport(ScriptedTransport::new(script), remote(), config)
}
