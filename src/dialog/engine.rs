use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::channel::{DialogChannel, Input};
use super::content;
use super::state::{is_hangup, is_leave_echo, route_command, Command, DialogState};
use crate::cancel::{CallToken, CancelReason};
use crate::error::{DialogError, HangupOrigin, SpeakError};
use crate::scaling::{ScaleOutcome, Scaler};
use crate::session::{CallRegistry, CallSession};

/// Longest we wait on a closing prompt (apology, parting, time is up)
const CLOSING_PROMPT_GRACE: Duration = Duration::from_secs(5);

/// Which dialog variant runs on a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogMode {
    /// Spoken root menu over AudioSocket
    #[default]
    Menu,
    /// DTMF number entry that scales once and ends
    Digits,
}

impl DialogMode {
    pub fn entry_state(&self) -> DialogState {
        match self {
            DialogMode::Menu => DialogState::RootMenu,
            DialogMode::Digits => DialogState::AwaitingDigits,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DialogSettings {
    pub mode: DialogMode,
    /// Unmatched inputs tolerated in a row before giving up
    pub max_retries: u32,
    /// Largest replica count the dialog will scale to
    pub max_replicas: u32,
}

impl Default for DialogSettings {
    fn default() -> Self {
        Self {
            mode: DialogMode::Menu,
            max_retries: 3,
            max_replicas: 10,
        }
    }
}

/// How a dialog ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum DialogOutcome {
    /// The dialog reached its end state
    Completed,
    Hangup(HangupOrigin),
    Cancelled(CancelReason),
}

/// Per-call dialog state machine.
///
/// A single loop drives one state at a time; every state either names the
/// next one or ends the call. The call token is checked around every step,
/// so a hangup or deadline interrupts whatever the dialog is waiting on.
pub struct DialogEngine<C> {
    channel: C,
    scaler: Arc<dyn Scaler>,
    session: CallSession,
    settings: DialogSettings,
    registry: Option<CallRegistry>,
}

impl<C: DialogChannel> DialogEngine<C> {
    pub fn new(
        channel: C,
        scaler: Arc<dyn Scaler>,
        session: CallSession,
        settings: DialogSettings,
    ) -> Self {
        Self {
            channel,
            scaler,
            session,
            settings,
            registry: None,
        }
    }

    /// Publish state changes of this call to `registry`.
    pub fn with_registry(mut self, registry: CallRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn session(&self) -> &CallSession {
        &self.session
    }

    pub fn into_channel(self) -> C {
        self.channel
    }

    /// Run the dialog until it ends, the caller leaves or `token` trips.
    ///
    /// Fatal errors are returned after their apology has been spoken.
    pub async fn run(&mut self, token: &CallToken) -> Result<DialogOutcome, DialogError> {
        info!(call_id = %self.session.id, mode = ?self.settings.mode, "Dialog started");

        let mut next = Some(self.settings.mode.entry_state());

        if self.settings.mode == DialogMode::Menu {
            let greeted = tokio::select! {
                reason = token.cancelled() => return self.cancelled(reason).await,
                greeted = self.say(content::GREETING) => greeted,
            };
            if let Err(e) = greeted {
                return self.fail(e).await;
            }
        }

        while let Some(state) = next {
            self.session.set_state(Some(state));
            self.publish().await;
            debug!(call_id = %self.session.id, state = %state, "Entering state");

            let step = tokio::select! {
                reason = token.cancelled() => return self.cancelled(reason).await,
                step = self.step(&state) => step,
            };

            next = match step {
                Ok(next) => next,
                Err(e) => return self.fail(e).await,
            };
        }

        self.finish(DialogOutcome::Completed).await
    }

    /// Execute one state and return the next.
    pub async fn step(&mut self, state: &DialogState) -> Result<Option<DialogState>, DialogError> {
        let entry = self.settings.mode.entry_state();

        match *state {
            DialogState::RootMenu => self.root_menu().await,
            DialogState::ListenFailure => {
                self.say(content::LISTEN_FAILURE).await?;
                Ok(Some(entry))
            }
            DialogState::TellTime => {
                self.say(&content::spoken_time(chrono::Local::now())).await?;
                Ok(Some(DialogState::RootMenu))
            }
            DialogState::TellJoke => {
                self.say(content::joke()).await?;
                Ok(Some(DialogState::RootMenu))
            }
            DialogState::EchoStart => {
                self.say(content::ECHO_START).await?;
                Ok(Some(DialogState::Echo))
            }
            DialogState::Echo => self.echo().await,
            DialogState::AwaitingDigits => self.awaiting_digits().await,
            DialogState::Reply { target } => {
                info!(call_id = %self.session.id, "Announcing new size: {}", target);
                self.say(&content::you_entered(target)).await?;
                Ok(Some(DialogState::Scaling { target }))
            }
            DialogState::Scaling { target } => self.scale(target, entry).await,
            DialogState::Confirm { target } => {
                let message = content::scaled(self.scaler.target_name(), target);
                self.say(&message).await?;
                Ok(match self.settings.mode {
                    DialogMode::Menu => Some(DialogState::RootMenu),
                    DialogMode::Digits => None,
                })
            }
        }
    }

    async fn root_menu(&mut self) -> Result<Option<DialogState>, DialogError> {
        let text = match self.listen().await? {
            Some(Input::Utterance(text) | Input::Digits(text)) => text,
            Some(Input::Incomplete) => {
                let next = self.retry(DialogState::RootMenu)?;
                self.say(content::NOTHING_HEARD).await?;
                return Ok(next);
            }
            None => return self.retry(DialogState::ListenFailure),
        };
        self.session.remember("last_utterance", &text);

        let next = match route_command(&text) {
            Command::Hangup => return Err(DialogError::Hangup(HangupOrigin::Dialog)),
            Command::Time => DialogState::TellTime,
            Command::Joke => DialogState::TellJoke,
            Command::Echo => DialogState::EchoStart,
            Command::Scale(Some(target)) => DialogState::Scaling { target },
            Command::Scale(None) => return Err(DialogError::InvalidNumber { input: text }),
            Command::Greeting => {
                self.session.reset_retries();
                self.say(content::GREETING).await?;
                return Ok(Some(DialogState::RootMenu));
            }
            Command::Unknown => {
                info!(call_id = %self.session.id, "Failed to parse command: {}", text);
                self.say(content::UNKNOWN_COMMAND).await?;
                return self.retry(DialogState::RootMenu);
            }
        };

        self.session.reset_retries();
        Ok(Some(next))
    }

    async fn echo(&mut self) -> Result<Option<DialogState>, DialogError> {
        let text = match self.listen().await? {
            Some(Input::Utterance(text) | Input::Digits(text)) => text,
            Some(Input::Incomplete) => return self.retry(DialogState::Echo),
            None => return self.retry(DialogState::ListenFailure),
        };

        if is_hangup(&text) {
            return Err(DialogError::Hangup(HangupOrigin::Dialog));
        }
        self.session.reset_retries();
        if is_leave_echo(&text) {
            return Ok(Some(DialogState::RootMenu));
        }

        self.say(&text).await?;
        Ok(Some(DialogState::Echo))
    }

    async fn awaiting_digits(&mut self) -> Result<Option<DialogState>, DialogError> {
        self.say(content::DIGITS_PROMPT).await?;

        let entry = match self.listen().await? {
            Some(Input::Digits(entry) | Input::Utterance(entry)) => entry,
            Some(Input::Incomplete) => return self.retry(DialogState::AwaitingDigits),
            None => return self.retry(DialogState::ListenFailure),
        };

        let target = entry
            .trim()
            .parse::<u32>()
            .map_err(|_| DialogError::InvalidNumber {
                input: entry.clone(),
            })?;

        self.session.reset_retries();
        self.session.remember("entered", &entry);
        Ok(Some(DialogState::Reply { target }))
    }

    async fn scale(
        &mut self,
        target: u32,
        entry: DialogState,
    ) -> Result<Option<DialogState>, DialogError> {
        if target > self.settings.max_replicas {
            info!(call_id = %self.session.id, "Refusing to scale to {}", target);
            self.say(&content::refusal(self.settings.max_replicas)).await?;
            return Ok(Some(entry));
        }

        let outcome = self
            .scaler
            .scale_to(target)
            .await
            .map_err(|e| DialogError::Action(e.into()))?;

        match outcome {
            ScaleOutcome::Unchanged => {
                info!(call_id = %self.session.id, "{} already at {} replicas", self.scaler.target_name(), target)
            }
            ScaleOutcome::Updated { from, to } => {
                info!(call_id = %self.session.id, "Scaled {} from {} to {} replicas", self.scaler.target_name(), from, to)
            }
        }
        self.session.remember("scaled_to", &target.to_string());
        Ok(Some(DialogState::Confirm { target }))
    }

    /// Count one unmatched input; past the bound the dialog gives up.
    fn retry(&mut self, next: DialogState) -> Result<Option<DialogState>, DialogError> {
        let retries = self.session.bump_retries();
        if retries > self.settings.max_retries {
            warn!(call_id = %self.session.id, "Too many retries ({})", retries);
            return Err(DialogError::ExceededRetries(self.settings.max_retries));
        }
        debug!(call_id = %self.session.id, "Retry {} of {}", retries, self.settings.max_retries);
        Ok(Some(next))
    }

    /// `Ok(None)` when listening failed but the call is still up.
    async fn listen(&mut self) -> Result<Option<Input>, DialogError> {
        match self.channel.listen().await {
            Ok(input) => Ok(Some(input)),
            Err(e) if e.is_disconnect() => Err(DialogError::Recognition(e)),
            Err(e) => {
                warn!(call_id = %self.session.id, "Failed to listen: {}", e);
                Ok(None)
            }
        }
    }

    /// Speak a prompt. A prompt that cannot be synthesized is skipped.
    async fn say(&mut self, text: &str) -> Result<(), DialogError> {
        match self.channel.say(text).await {
            Ok(()) => Ok(()),
            Err(SpeakError::Synthesis(e)) => {
                warn!(call_id = %self.session.id, "Skipping prompt {:?}: {}", text, e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Best effort, bounded; failures are only logged.
    async fn say_closing(&mut self, text: &str) {
        match tokio::time::timeout(CLOSING_PROMPT_GRACE, self.channel.say(text)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(call_id = %self.session.id, "Failed to play {:?}: {}", text, e),
            Err(_) => warn!(call_id = %self.session.id, "Timed out playing {:?}", text),
        }
    }

    async fn cancelled(&mut self, reason: CancelReason) -> Result<DialogOutcome, DialogError> {
        info!(call_id = %self.session.id, ?reason, "Dialog cancelled");
        if reason == CancelReason::Deadline {
            self.say_closing(content::TIMEOUT).await;
        }
        self.finish(DialogOutcome::Cancelled(reason)).await
    }

    async fn fail(&mut self, error: DialogError) -> Result<DialogOutcome, DialogError> {
        match error {
            DialogError::Hangup(HangupOrigin::Dialog) => {
                self.say_closing(content::PARTING).await;
                self.finish(DialogOutcome::Hangup(HangupOrigin::Dialog)).await
            }
            DialogError::Hangup(HangupOrigin::Caller) => {
                self.finish(DialogOutcome::Hangup(HangupOrigin::Caller)).await
            }
            DialogError::Recognition(e) if e.is_disconnect() => {
                info!(call_id = %self.session.id, "Caller left: {}", e);
                self.finish(DialogOutcome::Hangup(HangupOrigin::Caller)).await
            }
            error => {
                error!(call_id = %self.session.id, "Dialog failed: {}", error);
                if let Some(apology) = error.apology() {
                    self.say_closing(apology).await;
                }
                self.session.set_state(None);
                self.session.set_outcome(format!("failed: {}", error));
                self.publish().await;
                Err(error)
            }
        }
    }

    async fn finish(&mut self, outcome: DialogOutcome) -> Result<DialogOutcome, DialogError> {
        info!(call_id = %self.session.id, ?outcome, "Dialog ended");
        self.session.set_state(None);
        self.session.set_outcome(outcome_label(&outcome));
        self.publish().await;
        Ok(outcome)
    }

    async fn publish(&mut self) {
        if let Some(registry) = &self.registry {
            registry.upsert(self.session.summary()).await;
        }
    }
}

fn outcome_label(outcome: &DialogOutcome) -> String {
    match outcome {
        DialogOutcome::Completed => "completed".to_string(),
        DialogOutcome::Hangup(HangupOrigin::Dialog) => "hangup".to_string(),
        DialogOutcome::Hangup(HangupOrigin::Caller) => "caller hangup".to_string(),
        DialogOutcome::Cancelled(reason) => format!("cancelled ({:?})", reason).to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_states() {
        assert_eq!(DialogMode::Menu.entry_state(), DialogState::RootMenu);
        assert_eq!(DialogMode::Digits.entry_state(), DialogState::AwaitingDigits);
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(outcome_label(&DialogOutcome::Completed), "completed");
        assert_eq!(
            outcome_label(&DialogOutcome::Cancelled(CancelReason::Deadline)),
            "cancelled (deadline)"
        );
    }

    #[test]
    fn test_mode_from_config_string() {
        let mode: DialogMode = serde_json::from_str("\"digits\"").unwrap();
        assert_eq!(mode, DialogMode::Digits);
    }
}
