//! The scheduler's bookkeeping for one admitted objective: its session
//! id, the control handle used to pause/resume/cancel it, and whether a
//! worker task is currently driving it versus sitting paused.

use store::SessionId;

use crate::r#loop::SessionControl;

pub struct ActiveSession {
    pub session_id: SessionId,
    pub control: SessionControl,
    pub running: bool,
}

impl ActiveSession {
    pub fn new(session_id: SessionId, control: SessionControl) -> Self {
        Self { session_id, control, running: true }
    }
}
