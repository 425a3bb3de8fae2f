//! Capture state machine.
//!
//! Pure: every change goes through [`CaptureMachine::handle`], which returns
//! the side effects the driver must perform. No I/O, no clocks.

use std::time::Duration;

use rollcall_common::{
    Challenge, ChallengeResponse, CapturedChallenge, Result, RollCallError, SubmissionResponse,
};

/// What the capture screen is showing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenState {
    /// Asking for permissions and loading challenges
    Initializing,
    /// Waiting to start the current challenge
    Ready,
    /// Counting down to the next still
    Countdown { remaining: u32 },
    /// A capture is in flight
    Capturing,
    /// Frames captured, submission in flight
    Submitting,
    /// Attendance recorded
    Success { message: String },
    /// Attempt failed; retry restarts from `Initializing`
    Error { error: RollCallError },
}

impl ScreenState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Countdown { .. } => "countdown",
            Self::Capturing => "capturing",
            Self::Submitting => "submitting",
            Self::Success { .. } => "success",
            Self::Error { .. } => "error",
        }
    }
}

/// How the flow moves on after a challenge is recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvancePolicy {
    /// Wait for the student to tap "Continue"
    Manual,
    /// Start the next countdown on its own after `delay`
    Automatic { delay: Duration },
}

/// Timing knobs for the machine
#[derive(Debug, Clone, Copy)]
pub struct MachineSettings {
    pub countdown_secs: u32,
    pub tick_interval: Duration,
    pub advance: AdvancePolicy,
    pub navigate_delay: Duration,
}

/// Inputs to the machine
#[derive(Debug, Clone)]
pub enum FlowEvent {
    PermissionsResolved { camera: bool, location: bool },
    ChallengesLoaded(Result<ChallengeResponse>),
    /// Student tapped start, or the auto-advance timer fired
    StartRequested,
    Tick,
    /// Extra shutter trigger; ignored while a capture is pending
    CaptureRequested,
    CaptureFinished(Result<String>),
    SubmissionFinished(Result<SubmissionResponse>),
    Retry,
}

impl FlowEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PermissionsResolved { .. } => "permissions_resolved",
            Self::ChallengesLoaded(_) => "challenges_loaded",
            Self::StartRequested => "start_requested",
            Self::Tick => "tick",
            Self::CaptureRequested => "capture_requested",
            Self::CaptureFinished(_) => "capture_finished",
            Self::SubmissionFinished(_) => "submission_finished",
            Self::Retry => "retry",
        }
    }
}

/// Work the driver must do on the machine's behalf
#[derive(Debug, Clone, PartialEq)]
pub enum FlowEffect {
    RequestPermissions,
    FetchChallenges,
    /// Countdown feedback (haptics / display)
    TickFeedback { remaining: u32 },
    ScheduleTick(Duration),
    Capture,
    ScheduleAdvance(Duration),
    ReleaseCamera,
    Submit {
        class_id: String,
        images: Vec<CapturedChallenge>,
    },
    NavigateAway(Duration),
}

impl FlowEffect {
    /// Pure waits the student may interrupt
    pub fn is_timer(&self) -> bool {
        matches!(self, Self::ScheduleTick(_) | Self::ScheduleAdvance(_))
    }
}

/// Challenges and frames for one verification attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureSession {
    challenges: Vec<Challenge>,
    current_index: usize,
    captured: Vec<CapturedChallenge>,
}

impl CaptureSession {
    pub fn new(challenges: Vec<Challenge>) -> Self {
        Self {
            challenges,
            current_index: 0,
            captured: Vec::new(),
        }
    }

    pub fn challenges(&self) -> &[Challenge] {
        &self.challenges
    }

    /// Number of completed challenges
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn captured(&self) -> &[CapturedChallenge] {
        &self.captured
    }

    /// Challenge the student is working on, if any remain
    pub fn current_challenge(&self) -> Option<&Challenge> {
        self.challenges.get(self.current_index)
    }

    pub fn is_complete(&self) -> bool {
        !self.challenges.is_empty() && self.current_index >= self.challenges.len()
    }

    /// Step progress `(current_index + 1) / total`, clamped to [0, 1]
    pub fn progress(&self) -> f64 {
        if self.challenges.is_empty() {
            return 0.0;
        }
        progress_fraction((self.current_index + 1) as f64, self.challenges.len() as f64)
    }

    fn record(&mut self, image: String) {
        if let Some(challenge) = self.challenges.get(self.current_index) {
            self.captured.push(CapturedChallenge {
                challenge_type: challenge.kind.to_string(),
                image,
            });
            self.current_index += 1;
        }
    }
}

/// `numerator / denominator` clamped to [0, 1]; NaN reads as 0
pub fn progress_fraction(numerator: f64, denominator: f64) -> f64 {
    let ratio = numerator / denominator;
    if ratio.is_nan() { 0.0 } else { ratio.clamp(0.0, 1.0) }
}

/// The attendance capture state machine
#[derive(Debug, Clone)]
pub struct CaptureMachine {
    class_id: String,
    settings: MachineSettings,
    state: ScreenState,
    session: Option<CaptureSession>,
    capture_in_flight: bool,
    submit_in_flight: bool,
    cancelled: bool,
}

impl CaptureMachine {
    pub fn new(class_id: impl Into<String>, settings: MachineSettings) -> Self {
        Self {
            class_id: class_id.into(),
            settings,
            state: ScreenState::Initializing,
            session: None,
            capture_in_flight: false,
            submit_in_flight: false,
            cancelled: false,
        }
    }

    pub fn class_id(&self) -> &str {
        &self.class_id
    }

    pub fn state(&self) -> &ScreenState {
        &self.state
    }

    pub fn session(&self) -> Option<&CaptureSession> {
        self.session.as_ref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Effects to run when the screen first opens
    pub fn begin(&mut self) -> Vec<FlowEffect> {
        self.reset();
        vec![FlowEffect::RequestPermissions]
    }

    /// Screen left: ignore everything from now on
    pub fn cancel(&mut self) -> Vec<FlowEffect> {
        if self.cancelled {
            return Vec::new();
        }
        self.cancelled = true;
        self.capture_in_flight = false;
        self.submit_in_flight = false;
        self.session = None;
        vec![FlowEffect::ReleaseCamera]
    }

    /// Apply one event. Events that don't fit the current state are dropped.
    pub fn handle(&mut self, event: FlowEvent) -> Vec<FlowEffect> {
        if self.cancelled {
            tracing::debug!(event = event.name(), "Event after cancel ignored");
            return Vec::new();
        }

        let from = self.state.name();
        let effects = match (self.state.clone(), event) {
            (ScreenState::Initializing, FlowEvent::PermissionsResolved { camera, location }) => {
                self.on_permissions(camera, location)
            }
            (ScreenState::Initializing, FlowEvent::ChallengesLoaded(result)) => {
                self.on_challenges(result)
            }
            (ScreenState::Ready, FlowEvent::StartRequested) => self.enter_countdown(),
            (ScreenState::Countdown { remaining }, FlowEvent::Tick) => {
                let remaining = remaining.saturating_sub(1);
                if remaining == 0 {
                    self.enter_capturing()
                } else {
                    self.state = ScreenState::Countdown { remaining };
                    vec![
                        FlowEffect::TickFeedback { remaining },
                        FlowEffect::ScheduleTick(self.settings.tick_interval),
                    ]
                }
            }
            (ScreenState::Capturing, FlowEvent::CaptureRequested) => {
                if self.capture_in_flight {
                    tracing::debug!("Capture already in flight, trigger ignored");
                    Vec::new()
                } else {
                    self.capture_in_flight = true;
                    vec![FlowEffect::Capture]
                }
            }
            (ScreenState::Capturing, FlowEvent::CaptureFinished(result)) if self.capture_in_flight => {
                self.capture_in_flight = false;
                self.on_capture(result)
            }
            (ScreenState::Submitting, FlowEvent::SubmissionFinished(result))
                if self.submit_in_flight =>
            {
                self.submit_in_flight = false;
                self.on_submission(result)
            }
            (ScreenState::Error { .. }, FlowEvent::Retry) => {
                tracing::info!(class_id = %self.class_id, "Retrying capture attempt");
                self.begin()
            }
            (state, event) => {
                tracing::trace!(
                    state = state.name(),
                    event = event.name(),
                    "Event ignored in current state"
                );
                Vec::new()
            }
        };

        if from != self.state.name() {
            tracing::debug!(from, to = self.state.name(), "Capture state changed");
        }

        effects
    }

    fn reset(&mut self) {
        self.state = ScreenState::Initializing;
        self.session = None;
        self.capture_in_flight = false;
        self.submit_in_flight = false;
    }

    fn fail(&mut self, error: RollCallError) -> Vec<FlowEffect> {
        tracing::warn!(class_id = %self.class_id, error = %error, "Capture attempt failed");
        self.session = None;
        self.capture_in_flight = false;
        self.submit_in_flight = false;
        self.state = ScreenState::Error { error };
        vec![FlowEffect::ReleaseCamera]
    }

    fn on_permissions(&mut self, camera: bool, location: bool) -> Vec<FlowEffect> {
        let missing = match (camera, location) {
            (true, true) => return vec![FlowEffect::FetchChallenges],
            (false, true) => "camera access is required",
            (true, false) => "location access is required",
            (false, false) => "camera and location access are required",
        };
        self.fail(RollCallError::PermissionDenied(missing.to_string()))
    }

    fn on_challenges(&mut self, result: Result<ChallengeResponse>) -> Vec<FlowEffect> {
        match result {
            Ok(response) if response.success && !response.challenges.is_empty() => {
                tracing::info!(
                    class_id = %self.class_id,
                    challenges = response.challenges.len(),
                    "Liveness challenges loaded"
                );
                self.session = Some(CaptureSession::new(response.challenges));
                self.state = ScreenState::Ready;
                Vec::new()
            }
            Ok(response) => {
                let reason = response
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "No liveness challenges were issued".to_string());
                self.fail(RollCallError::ChallengeFetchFailed(reason))
            }
            Err(err @ (RollCallError::Unauthorized(_) | RollCallError::Timeout(_))) => self.fail(err),
            Err(err) => self.fail(RollCallError::ChallengeFetchFailed(err.user_message())),
        }
    }

    fn enter_countdown(&mut self) -> Vec<FlowEffect> {
        let remaining = self.settings.countdown_secs;
        if remaining == 0 {
            return self.enter_capturing();
        }
        self.state = ScreenState::Countdown { remaining };
        vec![
            FlowEffect::TickFeedback { remaining },
            FlowEffect::ScheduleTick(self.settings.tick_interval),
        ]
    }

    fn enter_capturing(&mut self) -> Vec<FlowEffect> {
        self.state = ScreenState::Capturing;
        self.capture_in_flight = true;
        vec![FlowEffect::Capture]
    }

    fn on_capture(&mut self, result: Result<String>) -> Vec<FlowEffect> {
        let image = match result {
            Ok(image) => image,
            Err(RollCallError::CaptureFailed(reason)) => {
                return self.fail(RollCallError::CaptureFailed(reason));
            }
            Err(other) => return self.fail(RollCallError::CaptureFailed(other.to_string())),
        };

        let Some(session) = self.session.as_mut() else {
            return self.fail(RollCallError::CaptureFailed("No active capture session".into()));
        };
        session.record(image);

        if session.is_complete() {
            let images = session.captured.clone();
            tracing::info!(class_id = %self.class_id, frames = images.len(), "All challenges captured");
            self.state = ScreenState::Submitting;
            self.submit_in_flight = true;
            return vec![
                FlowEffect::ReleaseCamera,
                FlowEffect::Submit {
                    class_id: self.class_id.clone(),
                    images,
                },
            ];
        }

        self.state = ScreenState::Ready;
        match self.settings.advance {
            AdvancePolicy::Automatic { delay } => vec![FlowEffect::ScheduleAdvance(delay)],
            AdvancePolicy::Manual => Vec::new(),
        }
    }

    fn on_submission(&mut self, result: Result<SubmissionResponse>) -> Vec<FlowEffect> {
        match result {
            Ok(SubmissionResponse {
                success: true,
                message,
            }) => {
                let message = message.unwrap_or_else(|| "Attendance marked".to_string());
                tracing::info!(class_id = %self.class_id, message = %message, "Attendance recorded");
                self.session = None;
                self.state = ScreenState::Success { message };
                vec![FlowEffect::NavigateAway(self.settings.navigate_delay)]
            }
            Ok(SubmissionResponse { message, .. }) => self.fail(RollCallError::SubmissionRejected(
                message.unwrap_or_else(|| "Attendance could not be verified".to_string()),
            )),
            Err(RollCallError::Api(message)) => {
                self.fail(RollCallError::SubmissionRejected(message))
            }
            Err(other) => self.fail(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_common::ChallengeType;

    fn settings(advance: AdvancePolicy) -> MachineSettings {
        MachineSettings {
            countdown_secs: 3,
            tick_interval: Duration::from_secs(1),
            advance,
            navigate_delay: Duration::from_secs(2),
        }
    }

    fn challenges(kinds: &[ChallengeType]) -> ChallengeResponse {
        ChallengeResponse {
            success: true,
            challenges: kinds.iter().map(|k| Challenge::new(*k, "")).collect(),
            message: None,
        }
    }

    /// Machine sitting in `Ready` with the given challenges
    fn ready(kinds: &[ChallengeType], advance: AdvancePolicy) -> CaptureMachine {
        let mut machine = CaptureMachine::new("class-1", settings(advance));
        assert_eq!(machine.begin(), vec![FlowEffect::RequestPermissions]);
        assert_eq!(
            machine.handle(FlowEvent::PermissionsResolved { camera: true, location: true }),
            vec![FlowEffect::FetchChallenges]
        );
        assert!(machine.handle(FlowEvent::ChallengesLoaded(Ok(challenges(kinds)))).is_empty());
        assert_eq!(machine.state(), &ScreenState::Ready);
        machine
    }

    /// Start and tick the countdown down to the capture request
    fn count_down(machine: &mut CaptureMachine) {
        let effects = machine.handle(FlowEvent::StartRequested);
        assert_eq!(effects[0], FlowEffect::TickFeedback { remaining: 3 });
        assert_eq!(
            machine.handle(FlowEvent::Tick)[0],
            FlowEffect::TickFeedback { remaining: 2 }
        );
        assert_eq!(
            machine.handle(FlowEvent::Tick)[0],
            FlowEffect::TickFeedback { remaining: 1 }
        );
        assert_eq!(machine.handle(FlowEvent::Tick), vec![FlowEffect::Capture]);
        assert_eq!(machine.state(), &ScreenState::Capturing);
    }

    #[test]
    fn n_captures_reach_submitting_with_n_frames() {
        for n in 1..=ChallengeType::ALL.len() {
            let kinds = &ChallengeType::ALL[..n];
            let mut machine = ready(kinds, AdvancePolicy::Manual);

            for i in 0..n {
                count_down(&mut machine);
                let effects = machine.handle(FlowEvent::CaptureFinished(Ok(format!("img-{i}"))));
                let session = machine.session().unwrap();
                assert_eq!(session.current_index(), session.captured().len());

                if i + 1 < n {
                    assert!(effects.is_empty());
                    assert_eq!(machine.state(), &ScreenState::Ready);
                } else {
                    assert_eq!(effects[0], FlowEffect::ReleaseCamera);
                    assert!(matches!(&effects[1], FlowEffect::Submit { images, .. } if images.len() == n));
                }
            }

            assert_eq!(machine.state(), &ScreenState::Submitting);
            assert_eq!(machine.session().unwrap().captured().len(), n);
        }
    }

    #[test]
    fn captured_frames_keep_challenge_order_and_types() {
        let mut machine = ready(&[ChallengeType::Smile, ChallengeType::TurnLeft], AdvancePolicy::Manual);
        count_down(&mut machine);
        machine.handle(FlowEvent::CaptureFinished(Ok("a".into())));
        count_down(&mut machine);
        let effects = machine.handle(FlowEvent::CaptureFinished(Ok("b".into())));

        let FlowEffect::Submit { class_id, images } = &effects[1] else {
            panic!("expected submit, got {effects:?}");
        };
        assert_eq!(class_id, "class-1");
        assert_eq!(images[0].challenge_type, "smile");
        assert_eq!(images[0].image, "a");
        assert_eq!(images[1].challenge_type, "turn_left");
    }

    #[test]
    fn second_trigger_during_capture_is_a_noop() {
        let mut machine = ready(&[ChallengeType::Smile, ChallengeType::Neutral], AdvancePolicy::Manual);
        count_down(&mut machine);

        assert!(machine.handle(FlowEvent::CaptureRequested).is_empty());
        assert!(machine.handle(FlowEvent::CaptureRequested).is_empty());

        machine.handle(FlowEvent::CaptureFinished(Ok("only".into())));
        // a late duplicate completion must not append again
        machine.handle(FlowEvent::CaptureFinished(Ok("dup".into())));

        let session = machine.session().unwrap();
        assert_eq!(session.captured().len(), 1);
        assert_eq!(session.current_index(), 1);
    }

    #[test]
    fn automatic_policy_schedules_next_countdown() {
        let delay = Duration::from_millis(1000);
        let mut machine = ready(
            &[ChallengeType::Smile, ChallengeType::LookUp],
            AdvancePolicy::Automatic { delay },
        );
        count_down(&mut machine);
        let effects = machine.handle(FlowEvent::CaptureFinished(Ok("a".into())));
        assert_eq!(effects, vec![FlowEffect::ScheduleAdvance(delay)]);

        // a manual tap racing the timer only starts one countdown
        assert!(!machine.handle(FlowEvent::StartRequested).is_empty());
        assert!(machine.handle(FlowEvent::StartRequested).is_empty());
    }

    #[test]
    fn empty_challenge_list_is_an_error_not_ready() {
        let mut machine = CaptureMachine::new("class-1", settings(AdvancePolicy::Manual));
        machine.begin();
        machine.handle(FlowEvent::PermissionsResolved { camera: true, location: true });
        let effects = machine.handle(FlowEvent::ChallengesLoaded(Ok(ChallengeResponse {
            success: true,
            challenges: vec![],
            message: None,
        })));

        assert_eq!(effects, vec![FlowEffect::ReleaseCamera]);
        assert!(matches!(
            machine.state(),
            ScreenState::Error { error: RollCallError::ChallengeFetchFailed(_) }
        ));
        assert!(machine.session().is_none());
    }

    #[test]
    fn missing_permission_is_permission_denied() {
        let mut machine = CaptureMachine::new("class-1", settings(AdvancePolicy::Manual));
        machine.begin();
        machine.handle(FlowEvent::PermissionsResolved { camera: true, location: false });
        assert!(matches!(
            machine.state(),
            ScreenState::Error { error: RollCallError::PermissionDenied(msg) } if msg.contains("location")
        ));
    }

    #[test]
    fn capture_failure_appends_nothing() {
        let mut machine = ready(&[ChallengeType::Smile], AdvancePolicy::Manual);
        count_down(&mut machine);
        machine.handle(FlowEvent::CaptureFinished(Err(RollCallError::CaptureFailed(
            "camera unavailable".into(),
        ))));
        assert_eq!(
            machine.state(),
            &ScreenState::Error {
                error: RollCallError::CaptureFailed("camera unavailable".into())
            }
        );
        assert!(machine.session().is_none());
    }

    #[test]
    fn rejected_submission_surfaces_server_message_and_discards_frames() {
        let mut machine = ready(&[ChallengeType::Smile], AdvancePolicy::Manual);
        count_down(&mut machine);
        machine.handle(FlowEvent::CaptureFinished(Ok("a".into())));
        machine.handle(FlowEvent::SubmissionFinished(Ok(SubmissionResponse {
            success: false,
            message: Some("face mismatch".into()),
        })));

        match machine.state() {
            ScreenState::Error { error } => assert_eq!(error.user_message(), "face mismatch"),
            other => panic!("expected error, got {other:?}"),
        }
        assert!(machine.session().is_none());
    }

    #[test]
    fn success_schedules_navigation_and_clears_frames() {
        let mut machine = ready(&[ChallengeType::Smile], AdvancePolicy::Manual);
        count_down(&mut machine);
        machine.handle(FlowEvent::CaptureFinished(Ok("a".into())));
        let effects = machine.handle(FlowEvent::SubmissionFinished(Ok(SubmissionResponse {
            success: true,
            message: None,
        })));

        assert_eq!(effects, vec![FlowEffect::NavigateAway(Duration::from_secs(2))]);
        assert!(matches!(machine.state(), ScreenState::Success { .. }));
        assert!(machine.session().is_none());

        // duplicate completion does nothing
        assert!(
            machine
                .handle(FlowEvent::SubmissionFinished(Ok(SubmissionResponse {
                    success: true,
                    message: None,
                })))
                .is_empty()
        );
    }

    #[test]
    fn retry_restarts_from_initializing() {
        let mut machine = ready(&[ChallengeType::Smile], AdvancePolicy::Manual);
        count_down(&mut machine);
        machine.handle(FlowEvent::CaptureFinished(Err(RollCallError::CaptureFailed("x".into()))));

        assert_eq!(machine.handle(FlowEvent::Retry), vec![FlowEffect::RequestPermissions]);
        assert_eq!(machine.state(), &ScreenState::Initializing);
        assert!(machine.session().is_none());
    }

    #[test]
    fn cancel_ignores_late_results() {
        let mut machine = ready(&[ChallengeType::Smile], AdvancePolicy::Manual);
        count_down(&mut machine);
        assert_eq!(machine.cancel(), vec![FlowEffect::ReleaseCamera]);
        assert!(machine.handle(FlowEvent::CaptureFinished(Ok("late".into()))).is_empty());
        assert!(machine.session().is_none());
        assert!(machine.cancel().is_empty());
    }

    #[test]
    fn progress_is_clamped_and_nan_safe() {
        assert_eq!(progress_fraction(1.0, 2.0), 0.5);
        assert_eq!(progress_fraction(5.0, 2.0), 1.0);
        assert_eq!(progress_fraction(-1.0, 2.0), 0.0);
        assert_eq!(progress_fraction(0.0, 0.0), 0.0);
        assert_eq!(progress_fraction(f64::NAN, 3.0), 0.0);

        let mut session = CaptureSession::new(vec![
            Challenge::new(ChallengeType::Smile, ""),
            Challenge::new(ChallengeType::Neutral, ""),
        ]);
        assert_eq!(session.progress(), 0.5);
        session.record("a".into());
        session.record("b".into());
        assert_eq!(session.progress(), 1.0);
        assert_eq!(CaptureSession::default().progress(), 0.0);
    }
}
