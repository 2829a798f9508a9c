//! In-memory radio for tests and dry runs

use crate::driver::{RadioConfig, RadioDriver};
use crate::RadioError;
use async_trait::async_trait;
use gateway_wire::{RadioAddress, RawFrame};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Driver call recorded by [`MemoryRadio`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioOp {
    /// `configure`
    Configure(RadioConfig),
    /// `write_ack_payload`
    AckPayload(u8, Vec<u8>),
    /// `open_reading_pipe`
    OpenReadingPipe(u8, RadioAddress),
    /// `open_writing_pipe`
    OpenWritingPipe(RadioAddress),
    /// `write`
    Write(RadioAddress, RawFrame),
    /// `start_listening`
    StartListening,
    /// `stop_listening`
    StopListening,
}

#[derive(Debug)]
struct State {
    inbox: VecDeque<RawFrame>,
    ops: Vec<RadioOp>,
    writing: Option<RadioAddress>,
    listening: bool,
    acknowledge: bool,
}

/// Radio backed by shared memory.
///
/// Clones share state, so a test keeps one handle to inject frames and
/// inspect driver calls while the link owns another.
#[derive(Debug, Clone)]
pub struct MemoryRadio {
    state: Arc<Mutex<State>>,
}

impl MemoryRadio {
    /// Create a radio whose writes are all acknowledged
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                inbox: VecDeque::new(),
                ops: Vec::new(),
                writing: None,
                listening: false,
                acknowledge: true,
            })),
        }
    }

    /// Queue a frame as if it had been received over the air
    pub fn push_inbound(&self, frame: RawFrame) {
        self.state().inbox.push_back(frame);
    }

    /// Make subsequent writes succeed or fail
    pub fn set_acknowledge(&self, acknowledge: bool) {
        self.state().acknowledge = acknowledge;
    }

    /// Every driver call so far
    pub fn ops(&self) -> Vec<RadioOp> {
        self.state().ops.clone()
    }

    /// Frames written so far with their destinations
    pub fn sent(&self) -> Vec<(RadioAddress, RawFrame)> {
        self.state()
            .ops
            .iter()
            .filter_map(|op| match op {
                RadioOp::Write(address, frame) => Some((*address, *frame)),
                _ => None,
            })
            .collect()
    }

    /// Whether the radio is in receive mode
    pub fn is_listening(&self) -> bool {
        self.state().listening
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryRadio {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RadioDriver for MemoryRadio {
    async fn configure(&mut self, config: &RadioConfig) -> Result<(), RadioError> {
        self.state().ops.push(RadioOp::Configure(config.clone()));
        Ok(())
    }

    async fn available(&mut self) -> Result<bool, RadioError> {
        Ok(!self.state().inbox.is_empty())
    }

    async fn read(&mut self) -> Result<RawFrame, RadioError> {
        self.state().inbox.pop_front().ok_or(RadioError::NoFrame)
    }

    async fn write(&mut self, frame: &RawFrame) -> Result<bool, RadioError> {
        let mut state = self.state();
        let address = state
            .writing
            .ok_or_else(|| RadioError::Bridge("no writing pipe open".to_string()))?;
        state.ops.push(RadioOp::Write(address, *frame));
        Ok(state.acknowledge)
    }

    async fn write_ack_payload(&mut self, pipe: u8, payload: &[u8]) -> Result<(), RadioError> {
        self.state()
            .ops
            .push(RadioOp::AckPayload(pipe, payload.to_vec()));
        Ok(())
    }

    async fn open_reading_pipe(
        &mut self,
        pipe: u8,
        address: RadioAddress,
    ) -> Result<(), RadioError> {
        self.state().ops.push(RadioOp::OpenReadingPipe(pipe, address));
        Ok(())
    }

    async fn open_writing_pipe(&mut self, address: RadioAddress) -> Result<(), RadioError> {
        let mut state = self.state();
        state.writing = Some(address);
        state.ops.push(RadioOp::OpenWritingPipe(address));
        Ok(())
    }

    async fn start_listening(&mut self) -> Result<(), RadioError> {
        let mut state = self.state();
        state.listening = true;
        state.ops.push(RadioOp::StartListening);
        Ok(())
    }

    async fn stop_listening(&mut self) -> Result<(), RadioError> {
        let mut state = self.state();
        state.listening = false;
        state.ops.push(RadioOp::StopListening);
        Ok(())
    }
}
