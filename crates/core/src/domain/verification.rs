use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::warn;

use crate::ports::OtpService;

pub const OTP_LENGTH: usize = 4;
pub const DEFAULT_RESEND_COOLDOWN_SECS: u32 = 30;

const SEND_FAILED: &str = "Failed to send OTP";
const INVALID_OTP: &str = "Invalid OTP";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPhase {
    #[default]
    Idle,
    Sent,
    Verified,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("Mobile number missing")]
    MobileMissing,
    #[error("{0}")]
    SendFailed(String),
    #[error("resend available in {remaining_secs}s")]
    CooldownActive { remaining_secs: u32 },
    #[error("Request an OTP first")]
    CodeNotSent,
    #[error("Enter 4-digit OTP")]
    IncompleteCode,
    #[error("{0}")]
    Rejected(String),
    #[error("OTP slot {0} does not exist")]
    SlotOutOfRange(usize),
    #[error("mobile number is already verified")]
    AlreadyVerified,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyOutcome {
    /// Code not complete yet; nothing was sent.
    Pending,
    Verified,
    AlreadyVerified,
}

/// Read-only view of the gate for rendering and reports.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VerificationState {
    pub phase: OtpPhase,
    pub sent: bool,
    pub verified: bool,
    pub digits: Vec<String>,
    pub resend_remaining_secs: u32,
    pub can_resend: bool,
    pub error: Option<String>,
}

/// Once-per-second resend countdown backed by a tokio task.
///
/// The task is aborted on [`ResendTimer::stop`], on restart and on drop, so a
/// countdown never outlives the verification attempt it belongs to.
#[derive(Debug, Default)]
pub struct ResendTimer {
    remaining: Arc<AtomicU32>,
    task: Option<JoinHandle<()>>,
}

impl ResendTimer {
    pub fn start(&mut self, seconds: u32) {
        self.stop();
        self.remaining.store(seconds, Ordering::SeqCst);
        if seconds == 0 {
            return;
        }

        let remaining = Arc::clone(&self.remaining);
        self.task = Some(tokio::spawn(async move {
            let period = Duration::from_secs(1);
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                let left = remaining.load(Ordering::SeqCst).saturating_sub(1);
                remaining.store(left, Ordering::SeqCst);
                if left == 0 {
                    break;
                }
            }
        }));
    }

    /// Cancels the countdown task, keeping the last observed value.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn reset(&mut self) {
        self.stop();
        self.remaining.store(0, Ordering::SeqCst);
    }

    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|task| !task.is_finished()).unwrap_or(false)
    }
}

impl Drop for ResendTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// OTP request/verify sub-machine: `Idle -> Sent -> Verified`.
pub struct VerificationGate {
    otp: Arc<dyn OtpService>,
    cooldown_secs: u32,
    phase: OtpPhase,
    digits: [Option<char>; OTP_LENGTH],
    error: Option<String>,
    verified_mobile: Option<String>,
    timer: ResendTimer,
}

impl VerificationGate {
    pub fn new(otp: Arc<dyn OtpService>, cooldown_secs: u32) -> Self {
        Self {
            otp,
            cooldown_secs,
            phase: OtpPhase::Idle,
            digits: [None; OTP_LENGTH],
            error: None,
            verified_mobile: None,
            timer: ResendTimer::default(),
        }
    }

    pub fn phase(&self) -> OtpPhase {
        self.phase
    }

    pub fn is_verified(&self) -> bool {
        self.phase == OtpPhase::Verified
    }

    /// Verification is bound to the exact mobile value it was issued for.
    pub fn is_verified_for(&self, mobile: &str) -> bool {
        self.is_verified() && self.verified_mobile.as_deref() == Some(mobile)
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn code(&self) -> String {
        self.digits.iter().flatten().collect()
    }

    pub fn resend_remaining(&self) -> u32 {
        self.timer.remaining()
    }

    pub fn timer_running(&self) -> bool {
        self.timer.is_running()
    }

    pub fn state(&self) -> VerificationState {
        let remaining = self.timer.remaining();
        VerificationState {
            phase: self.phase,
            sent: self.phase != OtpPhase::Idle,
            verified: self.is_verified(),
            digits: self.digits.iter().map(|d| d.map(String::from).unwrap_or_default()).collect(),
            resend_remaining_secs: remaining,
            can_resend: self.phase == OtpPhase::Sent && remaining == 0,
            error: self.error.clone(),
        }
    }

    /// Requests a fresh code. Clears any partially entered digits first.
    pub async fn send(&mut self, mobile: &str) -> Result<(), VerificationError> {
        if self.is_verified() {
            return Err(VerificationError::AlreadyVerified);
        }
        self.digits = [None; OTP_LENGTH];
        self.error = None;
        self.phase = OtpPhase::Idle;
        self.timer.reset();

        if mobile.trim().is_empty() {
            return self.fail(VerificationError::MobileMissing);
        }

        let otp = Arc::clone(&self.otp);
        match otp.send_otp(mobile).await {
            Ok(reply) if reply.accepted => {
                self.phase = OtpPhase::Sent;
                self.timer.start(self.cooldown_secs);
                Ok(())
            }
            Ok(reply) => self.fail(VerificationError::SendFailed(
                reply.message.unwrap_or_else(|| SEND_FAILED.to_owned()),
            )),
            Err(error) => {
                warn!(event_name = "otp.send.unreachable", error = %error, "OTP send failed");
                self.fail(VerificationError::SendFailed(SEND_FAILED.to_owned()))
            }
        }
    }

    pub async fn resend(&mut self, mobile: &str) -> Result<(), VerificationError> {
        if self.is_verified() {
            return Err(VerificationError::AlreadyVerified);
        }
        let remaining = self.timer.remaining();
        if remaining > 0 {
            return Err(VerificationError::CooldownActive { remaining_secs: remaining });
        }
        self.send(mobile).await
    }

    /// Fills one slot; completing the last slot submits the code.
    pub async fn enter_digit(
        &mut self,
        mobile: &str,
        index: usize,
        raw: &str,
    ) -> Result<VerifyOutcome, VerificationError> {
        if index >= OTP_LENGTH {
            return Err(VerificationError::SlotOutOfRange(index));
        }
        self.digits[index] = raw.chars().find(char::is_ascii_digit);

        if index == OTP_LENGTH - 1 && self.is_complete() {
            self.submit(mobile).await
        } else {
            Ok(VerifyOutcome::Pending)
        }
    }

    pub fn clear_digit(&mut self, index: usize) -> Result<(), VerificationError> {
        let slot = self.digits.get_mut(index).ok_or(VerificationError::SlotOutOfRange(index))?;
        *slot = None;
        Ok(())
    }

    /// Spreads pasted digits over the slots; a full code is submitted immediately.
    pub async fn paste(
        &mut self,
        mobile: &str,
        text: &str,
    ) -> Result<VerifyOutcome, VerificationError> {
        let pasted: Vec<char> = text.chars().filter(char::is_ascii_digit).take(OTP_LENGTH).collect();
        if pasted.is_empty() {
            return Ok(VerifyOutcome::Pending);
        }
        for (index, slot) in self.digits.iter_mut().enumerate() {
            *slot = pasted.get(index).copied();
        }

        if pasted.len() == OTP_LENGTH {
            self.submit(mobile).await
        } else {
            Ok(VerifyOutcome::Pending)
        }
    }

    /// The exclusive borrow keeps a second submit out while one awaits the
    /// backend; the resend timer task never touches the code slots.
    pub async fn submit(&mut self, mobile: &str) -> Result<VerifyOutcome, VerificationError> {
        if self.is_verified() {
            return Ok(VerifyOutcome::AlreadyVerified);
        }
        self.error = None;

        let code = self.code();
        if code.len() != OTP_LENGTH {
            return self.fail(VerificationError::IncompleteCode);
        }
        if self.phase != OtpPhase::Sent {
            return self.fail(VerificationError::CodeNotSent);
        }

        let otp = Arc::clone(&self.otp);
        match otp.verify_otp(mobile, &code).await {
            Ok(reply) if reply.accepted => {
                self.mark_verified(mobile);
                Ok(VerifyOutcome::Verified)
            }
            Ok(reply) => self.fail(VerificationError::Rejected(
                reply.message.unwrap_or_else(|| INVALID_OTP.to_owned()),
            )),
            Err(error) => {
                warn!(event_name = "otp.verify.unreachable", error = %error, "OTP verify failed");
                self.fail(VerificationError::Rejected(INVALID_OTP.to_owned()))
            }
        }
    }

    /// Accepts `mobile` as verified without a network round trip.
    pub fn mark_verified(&mut self, mobile: &str) {
        self.phase = OtpPhase::Verified;
        self.verified_mobile = Some(mobile.to_owned());
        self.digits = [None; OTP_LENGTH];
        self.error = None;
        self.timer.stop();
    }

    /// Shows a message in the OTP prompt without changing the phase.
    pub fn surface_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn reset(&mut self) {
        self.phase = OtpPhase::Idle;
        self.digits = [None; OTP_LENGTH];
        self.error = None;
        self.verified_mobile = None;
        self.timer.reset();
    }

    fn is_complete(&self) -> bool {
        self.digits.iter().all(Option::is_some)
    }

    fn fail<T>(&mut self, error: VerificationError) -> Result<T, VerificationError> {
        self.error = Some(error.to_string());
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::{sleep, timeout};

    use super::{
        OtpPhase, ResendTimer, VerificationError, VerificationGate, VerifyOutcome,
        DEFAULT_RESEND_COOLDOWN_SECS,
    };
    use crate::ports::memory::ScriptedOtpService;

    const MOBILE: &str = "9123456789";

    fn gate(otp: &Arc<ScriptedOtpService>) -> VerificationGate {
        VerificationGate::new(otp.clone(), DEFAULT_RESEND_COOLDOWN_SECS)
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_decrements_once_per_second() {
        let mut timer = ResendTimer::default();
        timer.start(30);
        sleep(Duration::from_millis(5_500)).await;

        assert_eq!(timer.remaining(), 25);
        assert!(timer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_countdown_no_longer_moves() {
        let mut timer = ResendTimer::default();
        timer.start(30);
        sleep(Duration::from_millis(2_500)).await;
        timer.stop();
        sleep(Duration::from_secs(10)).await;

        assert_eq!(timer.remaining(), 28);
        assert!(!timer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_ends_at_zero() {
        let mut timer = ResendTimer::default();
        timer.start(3);
        sleep(Duration::from_secs(10)).await;
        assert_eq!(timer.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fourth_digit_triggers_verification() {
        let otp = Arc::new(ScriptedOtpService::accepting("1234"));
        let mut gate = gate(&otp);
        gate.send(MOBILE).await.expect("send");

        for (index, digit) in ["1", "2", "3"].into_iter().enumerate() {
            let outcome = gate.enter_digit(MOBILE, index, digit).await.expect("digit");
            assert_eq!(outcome, VerifyOutcome::Pending);
        }
        assert_eq!(otp.verify_calls(), 0);

        let outcome = gate.enter_digit(MOBILE, 3, "4").await.expect("auto submit");
        assert_eq!(outcome, VerifyOutcome::Verified);
        assert_eq!(otp.verify_calls(), 1);
        assert!(gate.is_verified_for(MOBILE));
        assert!(!gate.timer_running());
    }

    #[tokio::test(start_paused = true)]
    async fn full_paste_submits_and_partial_paste_waits() {
        let otp = Arc::new(ScriptedOtpService::accepting("1234"));
        let mut gate = gate(&otp);
        gate.send(MOBILE).await.expect("send");

        assert_eq!(gate.paste(MOBILE, "12").await, Ok(VerifyOutcome::Pending));
        assert_eq!(otp.verify_calls(), 0);

        assert_eq!(gate.paste(MOBILE, "code: 1-2-3-4").await, Ok(VerifyOutcome::Verified));
        assert_eq!(otp.verify_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn short_code_fails_locally() {
        let otp = Arc::new(ScriptedOtpService::accepting("1234"));
        let mut gate = gate(&otp);
        gate.send(MOBILE).await.expect("send");
        gate.enter_digit(MOBILE, 0, "1").await.expect("digit");

        assert_eq!(gate.submit(MOBILE).await, Err(VerificationError::IncompleteCode));
        assert_eq!(gate.error(), Some("Enter 4-digit OTP"));
        assert_eq!(otp.verify_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_code_surfaces_error_and_stays_sent() {
        let otp = Arc::new(ScriptedOtpService::accepting("1234"));
        let mut gate = gate(&otp);
        gate.send(MOBILE).await.expect("send");

        let result = gate.paste(MOBILE, "9999").await;
        assert_eq!(result, Err(VerificationError::Rejected("Invalid OTP".to_owned())));
        assert_eq!(gate.phase(), OtpPhase::Sent);
        assert_eq!(gate.error(), Some("Invalid OTP"));
    }

    #[tokio::test(start_paused = true)]
    async fn submit_after_verification_does_not_call_backend_again() {
        let otp = Arc::new(ScriptedOtpService::accepting("1234"));
        let mut gate = gate(&otp);
        gate.send(MOBILE).await.expect("send");
        gate.paste(MOBILE, "1234").await.expect("verified");

        assert_eq!(gate.submit(MOBILE).await, Ok(VerifyOutcome::AlreadyVerified));
        assert_eq!(otp.verify_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_submit_can_be_retried() {
        let otp =
            Arc::new(ScriptedOtpService::accepting("1234").with_latency(Duration::from_secs(5)));
        let mut gate = gate(&otp);
        gate.send(MOBILE).await.expect("send");
        gate.paste(MOBILE, "123").await.expect("partial");

        let dropped = timeout(Duration::from_secs(1), gate.enter_digit(MOBILE, 3, "4")).await;
        assert!(dropped.is_err(), "slow backend should time out");

        assert_eq!(gate.submit(MOBILE).await, Ok(VerifyOutcome::Verified));
        assert_eq!(otp.verify_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn resend_is_refused_during_cooldown() {
        let otp = Arc::new(ScriptedOtpService::accepting("1234"));
        let mut gate = gate(&otp);
        gate.send(MOBILE).await.expect("send");
        sleep(Duration::from_secs(10)).await;

        assert_eq!(
            gate.resend(MOBILE).await,
            Err(VerificationError::CooldownActive { remaining_secs: 20 })
        );
        assert!(!gate.state().can_resend);

        sleep(Duration::from_secs(21)).await;
        assert!(gate.state().can_resend);
        gate.resend(MOBILE).await.expect("resend after cooldown");
        assert_eq!(otp.send_calls(), 2);
        assert_eq!(gate.resend_remaining(), DEFAULT_RESEND_COOLDOWN_SECS);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_digits_phase_and_countdown() {
        let otp = Arc::new(ScriptedOtpService::accepting("1234"));
        let mut gate = gate(&otp);
        gate.send(MOBILE).await.expect("send");
        gate.paste(MOBILE, "12").await.expect("partial");

        gate.reset();
        let state = gate.state();
        assert_eq!(state.phase, OtpPhase::Idle);
        assert!(state.digits.iter().all(String::is_empty));
        assert_eq!(state.resend_remaining_secs, 0);
        assert!(!gate.timer_running());
    }

    #[tokio::test]
    async fn send_reports_missing_mobile_and_backend_failures() {
        let otp = Arc::new(ScriptedOtpService::accepting("1234").unreachable());
        let mut gate = gate(&otp);

        assert_eq!(gate.send("  ").await, Err(VerificationError::MobileMissing));
        assert_eq!(gate.error(), Some("Mobile number missing"));

        assert_eq!(
            gate.send(MOBILE).await,
            Err(VerificationError::SendFailed("Failed to send OTP".to_owned()))
        );
        assert_eq!(gate.phase(), OtpPhase::Idle);
    }

    #[tokio::test]
    async fn rejected_send_keeps_backend_message() {
        let otp = Arc::new(ScriptedOtpService::accepting("1234").rejecting_sends());
        let mut gate = gate(&otp);

        assert_eq!(
            gate.send(MOBILE).await,
            Err(VerificationError::SendFailed("OTP quota exceeded".to_owned()))
        );
    }

    #[tokio::test]
    async fn code_requires_a_sent_otp() {
        let otp = Arc::new(ScriptedOtpService::accepting("1234"));
        let mut gate = gate(&otp);

        assert_eq!(gate.paste(MOBILE, "1234").await, Err(VerificationError::CodeNotSent));
        assert_eq!(otp.verify_calls(), 0);
    }
}
