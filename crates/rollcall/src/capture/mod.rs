//! Face-liveness attendance capture.
//!
//! [`CaptureMachine`] is the pure transition function; [`CaptureFlow`] drives
//! it against real devices and the API.

mod flow;
mod machine;

pub use flow::{
    CaptureDevices, CaptureFlow, FlowObserver, FlowOutcome, FlowSettings, NoopObserver,
    UserAction,
};
pub use machine::{
    AdvancePolicy, CaptureMachine, CaptureSession, FlowEffect, FlowEvent, MachineSettings,
    ScreenState, progress_fraction,
};
