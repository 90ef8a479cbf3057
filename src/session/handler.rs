use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::call::CallSession;
use super::config::CallConfig;
use super::stats::CallRegistry;
use crate::audiosocket::{FrameWriter, Message, MessageReader, SharedReader};
use crate::bridge::driver::watch_hangup;
use crate::bridge::{ControlPlane, Subscription};
use crate::cancel::{CallToken, CancelReason};
use crate::dialog::{
    AudioSocketChannel, ControlPlaneChannel, DialogEngine, DialogMode, DialogOutcome,
    DialogSettings,
};
use crate::scaling::Scaler;
use crate::speech::{
    RecognitionPipeline, RecognitionSettings, Speaker, SpeechRecognizer, SpeechSynthesizer,
};

/// Longest wait for the call id at connection start
const ID_TIMEOUT: Duration = Duration::from_secs(5);

/// Collaborators shared by every call, opened once at startup
pub struct CallServices {
    pub pipeline: Arc<RecognitionPipeline>,
    pub speaker: Arc<Speaker>,
    pub scaler: Arc<dyn Scaler>,
    pub call: CallConfig,
    pub dialog: DialogSettings,
    pub registry: CallRegistry,
}

impl CallServices {
    pub fn new(
        recognizer: Arc<dyn SpeechRecognizer>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        scaler: Arc<dyn Scaler>,
        call: CallConfig,
        dialog: DialogSettings,
    ) -> Self {
        let pipeline = RecognitionPipeline::new(
            recognizer,
            RecognitionSettings {
                sample_rate: call.sample_rate,
                language: call.language.clone(),
            },
        );
        let speaker = Speaker::new(synthesizer, call.language.clone())
            .with_sample_rate(call.sample_rate)
            .with_chunk_size(call.chunk_size);

        Self {
            pipeline: Arc::new(pipeline),
            speaker: Arc::new(speaker),
            scaler,
            call,
            dialog,
            registry: CallRegistry::new(),
        }
    }

    pub fn with_registry(mut self, registry: CallRegistry) -> Self {
        self.registry = registry;
        self
    }
}

/// Process one AudioSocket connection from call id to hangup.
///
/// The hangup frame is written on every exit path, including a missing id
/// and a failed dialog.
pub async fn handle_connection<S>(
    stream: S,
    services: Arc<CallServices>,
    token: CallToken,
) -> Result<DialogOutcome>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let reader = MessageReader::new(read_half).shared();
    let mut writer = FrameWriter::new(write_half);
    let deadline = token.cancel_after(services.call.max_call, CancelReason::Deadline);

    let id = match read_call_id(&reader, &token).await {
        Ok(id) => id,
        Err(e) => {
            token.cancel(CancelReason::Completed);
            deadline.abort();
            send_hangup(&mut writer).await;
            return Err(e);
        }
    };
    info!(call_id = %id, "Processing call");

    let channel = AudioSocketChannel::new(
        reader,
        writer,
        Arc::clone(&services.pipeline),
        Arc::clone(&services.speaker),
    )
    .with_hints(services.call.phrase_hints.clone())
    .with_max_recognition(services.call.recognition_timeout);

    let session = CallSession::new(id, services.call.max_call);
    let mut engine = DialogEngine::new(
        channel,
        Arc::clone(&services.scaler),
        session,
        services.dialog.clone(),
    )
    .with_registry(services.registry.clone());

    let result = engine.run(&token).await;

    token.cancel(CancelReason::Completed);
    deadline.abort();

    let mut writer = engine.into_channel().into_writer();
    send_hangup(&mut writer).await;

    match result {
        Ok(outcome) => {
            info!(call_id = %id, ?outcome, "Call finished");
            Ok(outcome)
        }
        Err(e) => {
            error!(call_id = %id, "Call failed: {}", e);
            Err(e).context(format!("dialog failed for call {}", id))
        }
    }
}

async fn read_call_id<R>(reader: &SharedReader<R>, token: &CallToken) -> Result<Uuid>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = reader.lock().await;

    let message = tokio::select! {
        reason = token.cancelled() => anyhow::bail!("call cancelled ({:?}) before its id arrived", reason),
        read = tokio::time::timeout(ID_TIMEOUT, reader.next_message()) => {
            read.context("timed out waiting for call id")?
                .context("failed to get call ID")?
        }
    };

    match message {
        Message::Id(id) => Ok(id),
        other => anyhow::bail!("invalid message type {:?} getting call ID", other.kind()),
    }
}

async fn send_hangup<W>(writer: &mut FrameWriter<W>)
where
    W: AsyncWrite + Unpin,
{
    if writer.is_mid_frame() {
        debug!("Completing interrupted frame before hangup");
    }
    if let Err(e) = writer.hangup().await {
        warn!("Failed to send hangup message: {}", e);
    }
}

/// Run the DTMF scaling dialog on a control-plane channel.
pub async fn run_digit_call(
    control: Arc<dyn ControlPlane>,
    channel_id: &str,
    services: &CallServices,
    settle_delay: Duration,
    token: &CallToken,
) -> Result<DialogOutcome> {
    info!(channel = channel_id, "Running digit dialog");

    // Always quit on hangup.
    let destroyed = control
        .subscribe(Subscription::ChannelDestroyed(channel_id.to_string()))
        .await
        .context("failed to subscribe to channel hangup")?;
    let hangup_watch = tokio::spawn(watch_hangup(destroyed, token.clone()));
    let deadline = token.cancel_after(services.call.max_call, CancelReason::Deadline);

    let result = digit_dialog(&control, channel_id, services, settle_delay, token).await;

    token.cancel(CancelReason::Completed);
    hangup_watch.abort();
    deadline.abort();
    if let Err(e) = control.hangup(channel_id).await {
        debug!("failed to hang up {}: {:#}", channel_id, e);
    }

    result
}

async fn digit_dialog(
    control: &Arc<dyn ControlPlane>,
    channel_id: &str,
    services: &CallServices,
    settle_delay: Duration,
    token: &CallToken,
) -> Result<DialogOutcome> {
    control
        .answer(channel_id)
        .await
        .context("failed to answer call")?;

    tokio::select! {
        reason = token.cancelled() => return Ok(DialogOutcome::Cancelled(reason)),
        _ = tokio::time::sleep(settle_delay) => {}
    }

    let id = Uuid::parse_str(channel_id).unwrap_or_else(|_| Uuid::new_v4());
    let session = CallSession::new(id, services.call.max_call);
    let settings = DialogSettings {
        mode: DialogMode::Digits,
        ..services.dialog.clone()
    };

    let channel = ControlPlaneChannel::new(Arc::clone(control), channel_id);
    let mut engine = DialogEngine::new(channel, Arc::clone(&services.scaler), session, settings)
        .with_registry(services.registry.clone());

    engine
        .run(token)
        .await
        .with_context(|| format!("digit dialog failed on {}", channel_id))
}
