//! Async driver for the capture state machine.
//!
//! Runs machine effects against the camera, locator, permission gate, and
//! API. Every await is raced against the screen's cancel signal. Once the
//! screen is gone, nothing is captured and no late result reaches the machine.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, watch};
use tracing::Instrument;

use rollcall_common::{AttendanceSubmission, CapturedChallenge, RollCallError};

use super::machine::{
    CaptureMachine, CaptureSession, FlowEffect, FlowEvent, MachineSettings, ScreenState,
};
use crate::api::AttendanceApi;
use crate::device::{Camera, LocationAccuracy, Locator, PermissionGate};
use crate::imaging::FrameEncoder;

/// Input from the student
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    /// Begin (or continue to) the next challenge
    Start,
    /// Extra shutter press
    CaptureNow,
    /// Start over after an error
    Retry,
    /// Close the screen from the error state
    Dismiss,
}

/// How a capture screen ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    Submitted { message: String },
    Cancelled,
    Abandoned { error: RollCallError },
}

/// Receives state changes for display. All methods default to no-ops.
pub trait FlowObserver: Send + Sync {
    fn on_state(&self, _state: &ScreenState, _session: Option<&CaptureSession>) {}

    fn on_tick(&self, _remaining: u32) {}

    /// A new capture attempt began (screen opened or retried)
    fn on_attempt(&self, _attempt_id: &str) {}

    fn on_navigate(&self) {}
}

/// Observer that ignores everything
pub struct NoopObserver;

impl FlowObserver for NoopObserver {}

/// Device handles the flow needs exclusive use of while it runs
#[derive(Clone)]
pub struct CaptureDevices {
    pub camera: Arc<dyn Camera>,
    pub locator: Arc<dyn Locator>,
    pub permissions: Arc<dyn PermissionGate>,
}

/// Everything tunable about a capture attempt
#[derive(Debug, Clone, Copy)]
pub struct FlowSettings {
    pub machine: MachineSettings,
    pub encoder: FrameEncoder,
    pub accuracy: LocationAccuracy,
    pub submit_timeout: Duration,
}

/// Outcome of running one effect
enum Step {
    Event(FlowEvent),
    Continue,
    Cancelled,
    Navigate,
}

/// One capture screen, from permissions to navigation
pub struct CaptureFlow {
    api: Arc<dyn AttendanceApi>,
    devices: CaptureDevices,
    settings: FlowSettings,
    machine: CaptureMachine,
    observer: Arc<dyn FlowObserver>,
}

impl CaptureFlow {
    pub fn new(
        api: Arc<dyn AttendanceApi>,
        devices: CaptureDevices,
        settings: FlowSettings,
        class_id: impl Into<String>,
    ) -> Self {
        Self {
            api,
            devices,
            machine: CaptureMachine::new(class_id, settings.machine),
            settings,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn FlowObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Drive the screen until it navigates away, is dismissed, or is cancelled.
    ///
    /// `actions` closing counts as leaving the screen. Dismiss is honoured
    /// during countdowns and advance delays; other input is held until the
    /// screen is idle again.
    pub async fn run(
        mut self,
        mut actions: mpsc::Receiver<UserAction>,
        mut cancel: watch::Receiver<bool>,
    ) -> FlowOutcome {
        let screen = tracing::info_span!("capture", class_id = %self.machine.class_id());

        async move {
            tracing::info!("Capture screen opened");
            let mut held: VecDeque<UserAction> = VecDeque::new();
            let mut attempt = self.start_attempt();
            let mut queue: VecDeque<FlowEffect> = attempt.in_scope(|| self.machine.begin()).into();
            self.publish();

            loop {
                if let Some(effect) = queue.pop_front() {
                    let step = if effect.is_timer() {
                        self.perform_timer(effect, &mut actions, &mut held, &mut cancel)
                            .instrument(attempt.clone())
                            .await
                    } else {
                        self.perform(effect, &mut cancel)
                            .instrument(attempt.clone())
                            .await
                    };
                    match step {
                        Step::Event(event) => {
                            queue.extend(attempt.in_scope(|| self.machine.handle(event)));
                            self.publish();
                        }
                        Step::Continue => {}
                        Step::Cancelled => return self.shutdown().await,
                        Step::Navigate => return self.navigate(),
                    }
                    continue;
                }

                // Nothing scheduled: the screen is waiting on the student
                let action = match held.pop_front() {
                    Some(action) => Some(action),
                    None => tokio::select! {
                        biased;
                        _ = cancelled(&mut cancel) => None,
                        action = actions.recv() => action,
                    },
                };

                let event = match action {
                    Some(UserAction::Start) => FlowEvent::StartRequested,
                    Some(UserAction::CaptureNow) => FlowEvent::CaptureRequested,
                    Some(UserAction::Retry) => {
                        if matches!(self.machine.state(), ScreenState::Error { .. }) {
                            attempt = self.start_attempt();
                        }
                        FlowEvent::Retry
                    }
                    Some(UserAction::Dismiss) => {
                        if let ScreenState::Error { error } = self.machine.state() {
                            let error = error.clone();
                            tracing::info!(error = %error, "Capture screen dismissed after error");
                            return FlowOutcome::Abandoned { error };
                        }
                        return self.shutdown().await;
                    }
                    None => return self.shutdown().await,
                };

                queue.extend(attempt.in_scope(|| self.machine.handle(event)));
                self.publish();
            }
        }
        .instrument(screen)
        .await
    }

    /// Fresh attempt id and span; called on open and on every retry
    fn start_attempt(&self) -> tracing::Span {
        let attempt_id = format!("att-{:08x}", rand::rng().random::<u32>());
        self.observer.on_attempt(&attempt_id);
        let span = tracing::info_span!("attempt", attempt_id = %attempt_id);
        span.in_scope(|| tracing::debug!("Capture attempt started"));
        span
    }

    /// Run a countdown tick or advance delay while still listening for Dismiss
    async fn perform_timer(
        &mut self,
        effect: FlowEffect,
        actions: &mut mpsc::Receiver<UserAction>,
        held: &mut VecDeque<UserAction>,
        cancel: &mut watch::Receiver<bool>,
    ) -> Step {
        let timer = self.perform(effect, cancel);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                biased;
                step = &mut timer => return step,
                action = actions.recv() => match action {
                    Some(UserAction::Dismiss) | None => {
                        tracing::info!("Capture screen dismissed mid-attempt");
                        return Step::Cancelled;
                    }
                    Some(other) => held.push_back(other),
                },
            }
        }
    }

    fn publish(&self) {
        self.observer
            .on_state(self.machine.state(), self.machine.session());
    }

    async fn shutdown(&mut self) -> FlowOutcome {
        for effect in self.machine.cancel() {
            if effect == FlowEffect::ReleaseCamera {
                self.devices.camera.release().await;
            }
        }
        tracing::info!("Capture screen closed");
        FlowOutcome::Cancelled
    }

    fn navigate(&self) -> FlowOutcome {
        self.observer.on_navigate();
        match self.machine.state() {
            ScreenState::Success { message } => FlowOutcome::Submitted {
                message: message.clone(),
            },
            // NavigateAway is only emitted from Success
            other => FlowOutcome::Abandoned {
                error: RollCallError::Api(format!("navigated away from {}", other.name())),
            },
        }
    }

    async fn perform(&mut self, effect: FlowEffect, cancel: &mut watch::Receiver<bool>) -> Step {
        match effect {
            FlowEffect::RequestPermissions => {
                let permissions = self.devices.permissions.clone();
                let request = async move {
                    let camera = permissions.request_camera().await;
                    let location = permissions.request_location().await;
                    FlowEvent::PermissionsResolved { camera, location }
                };
                guarded(cancel, request).await
            }
            FlowEffect::FetchChallenges => {
                let api = self.api.clone();
                guarded(cancel, async move {
                    FlowEvent::ChallengesLoaded(api.liveness_challenges().await)
                })
                .await
            }
            FlowEffect::TickFeedback { remaining } => {
                self.observer.on_tick(remaining);
                Step::Continue
            }
            FlowEffect::ScheduleTick(interval) => {
                guarded(cancel, async move {
                    tokio::time::sleep(interval).await;
                    FlowEvent::Tick
                })
                .await
            }
            FlowEffect::ScheduleAdvance(delay) => {
                guarded(cancel, async move {
                    tokio::time::sleep(delay).await;
                    FlowEvent::StartRequested
                })
                .await
            }
            FlowEffect::Capture => {
                let camera = self.devices.camera.clone();
                let encoder = self.settings.encoder;
                guarded(cancel, async move {
                    FlowEvent::CaptureFinished(capture_frame(camera, encoder).await)
                })
                .await
            }
            FlowEffect::ReleaseCamera => {
                self.devices.camera.release().await;
                Step::Continue
            }
            FlowEffect::Submit { class_id, images } => {
                let submit = self.submit(class_id, images);
                guarded(cancel, submit).await
            }
            FlowEffect::NavigateAway(delay) => {
                // Attendance is already recorded; leaving early still counts
                tokio::select! {
                    biased;
                    _ = cancelled(cancel) => {}
                    _ = tokio::time::sleep(delay) => {}
                }
                Step::Navigate
            }
        }
    }

    fn submit(
        &self,
        class_id: String,
        images: Vec<CapturedChallenge>,
    ) -> impl Future<Output = FlowEvent> + Send + 'static {
        let api = self.api.clone();
        let locator = self.devices.locator.clone();
        let accuracy = self.settings.accuracy;
        let timeout = self.settings.submit_timeout;

        async move {
            let coordinates = match locator.current_position(accuracy).await {
                Ok(coordinates) => coordinates,
                Err(err) => return FlowEvent::SubmissionFinished(Err(err)),
            };

            let submission = AttendanceSubmission {
                class_id,
                student_coordinates: coordinates,
                challenge_images: images,
            };

            let result = match tokio::time::timeout(timeout, api.submit_attendance(&submission)).await
            {
                Ok(result) => result,
                Err(_) => Err(RollCallError::Timeout(format!(
                    "attendance submission took longer than {}s",
                    timeout.as_secs()
                ))),
            };
            FlowEvent::SubmissionFinished(result)
        }
    }
}

/// Take one still and turn it into upload text
async fn capture_frame(
    camera: Arc<dyn Camera>,
    encoder: FrameEncoder,
) -> rollcall_common::Result<String> {
    let raw = camera.capture().await?;
    tokio::task::spawn_blocking(move || encoder.encode(&raw))
        .await
        .map_err(|e| RollCallError::CaptureFailed(format!("Frame processing aborted: {e}")))?
}

/// Resolves once the screen has been cancelled; never if the sender is gone
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|gone| *gone).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Run `work` unless the screen goes away first
async fn guarded<F>(cancel: &mut watch::Receiver<bool>, work: F) -> Step
where
    F: Future<Output = FlowEvent>,
{
    tokio::select! {
        biased;
        _ = cancelled(cancel) => Step::Cancelled,
        event = work => Step::Event(event),
    }
}
