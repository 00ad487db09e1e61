mod config;
mod output;

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FrameCount, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use rubato::Resampler;
use secrecy::ExposeSecret;
use tracing_subscriber::fmt::time::ChronoLocal;

use crate::config::{
    Config, INPUT_CHUNK_SIZE, OUTPUT_CHUNK_SIZE, OUTPUT_LATENCY_MS, PLAYBACK_PUMP_MS,
    STATUS_TICK_SECS,
};
use crate::output::OutputFeeder;
use jarvis_audio::pcm::{CAPTURE_SAMPLE_RATE, PLAYBACK_SAMPLE_RATE};
use jarvis_audio::playback::{Clock, SystemClock};
use jarvis_core::hud::AspectRatio;
use jarvis_core::memory::{JsonFileStore, MemoryVault};
use jarvis_core::router::Attachment;
use jarvis_core::{Action, CapabilityClient, Orchestrator};
use jarvis_realtime::types::ServerEvent;

/// Events consumed by the single orchestrating loop.
pub enum Input {
    /// One raw capture frame from the microphone callback.
    Audio(Vec<f32>),
    /// One line typed by the user.
    Command(String),
    /// One inbound message from the live session.
    Server(ServerEvent),
    /// A scheduled playback handle finished naturally.
    PlaybackDone(u64),
    /// Move pending playback samples into the output ring.
    PlaybackPump,
    /// Periodic HUD gauge refresh.
    StatusTick,
}

#[derive(Parser)]
#[command(name = "jarvis", about = "Voice/chat assistant HUD core")]
struct Cli {
    /// Capture device name (host default when omitted)
    #[arg(long)]
    input_device: Option<String>,
    /// Playback device name (host default when omitted)
    #[arg(long)]
    output_device: Option<String>,
    /// List audio devices and exit
    #[arg(long)]
    list_devices: bool,
}

/// The live transport pair: typed client plus its pump tasks.
struct Link {
    client: jarvis_realtime::Client,
    connection: jarvis_realtime::Connection,
    pump: tokio::task::JoinHandle<()>,
}

impl Link {
    fn shutdown(&self) {
        self.connection.shutdown();
        self.pump.abort();
    }
}

fn guess_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load application configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let args = Cli::parse();
    if args.list_devices {
        println!("Capture devices:\n{}", jarvis_audio::device::list_inputs()?);
        println!("Playback devices:\n{}", jarvis_audio::device::list_outputs()?);
        return Ok(());
    }

    tracing::info!("Configuration loaded. Starting Jarvis service...");

    let (input_tx, mut input_rx) = tokio::sync::mpsc::channel::<Input>(1024);

    // --- Capture device ---
    let input = jarvis_audio::device::get_or_default_input(args.input_device.clone())
        .context("Failed to get audio input device")?;
    tracing::info!("Using input device: {:?}", input.name()?);

    let input_config = input
        .default_input_config()
        .context("Failed to get default input config")?;
    let input_config = StreamConfig {
        channels: input_config.channels(),
        sample_rate: input_config.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(FrameCount::from(INPUT_CHUNK_SIZE as u32)),
    };
    let input_channel_count = input_config.channels as usize;
    let input_sample_rate = input_config.sample_rate.0 as f64;
    tracing::info!("Input stream config: {:?}", &input_config);

    // Downmix to mono and hand each capture frame to the loop.
    let audio_input = input_tx.clone();
    let input_data_fn = move |data: &[f32], _: &cpal::InputCallbackInfo| {
        let audio = if input_channel_count > 1 {
            data.chunks(input_channel_count)
                .map(|c| c.iter().sum::<f32>() / input_channel_count as f32)
                .collect::<Vec<f32>>()
        } else {
            data.to_vec()
        };
        if let Err(e) = audio_input.try_send(Input::Audio(audio)) {
            tracing::warn!("Failed to send audio data to loop: {:?}", e);
        }
    };
    let input_stream = input.build_input_stream(
        &input_config,
        input_data_fn,
        move |err| tracing::error!("An error occurred on input stream: {}", err),
        None,
    )?;
    input_stream.play()?;

    // --- Playback device ---
    let output = jarvis_audio::device::get_or_default_output(args.output_device.clone())
        .context("Failed to get audio output device")?;
    tracing::info!("Using output device: {:?}", output.name()?);

    let output_config = output
        .default_output_config()
        .context("Failed to get default output config")?;
    let output_config = StreamConfig {
        channels: output_config.channels(),
        sample_rate: output_config.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(FrameCount::from(OUTPUT_CHUNK_SIZE as u32)),
    };
    let output_channel_count = output_config.channels as usize;
    let output_sample_rate = output_config.sample_rate.0 as f64;
    tracing::info!("Output stream config: {:?}", &output_config);

    let audio_out_buffer =
        jarvis_audio::pcm::shared_buffer(output_sample_rate as usize * OUTPUT_LATENCY_MS / 1000);
    let (audio_out_tx, mut audio_out_rx) = audio_out_buffer.split();
    let mut feeder = OutputFeeder::new(audio_out_tx);

    // Raised when the orchestrator interrupts playback; the output
    // callback drains any queued samples before producing silence.
    let interrupt_flag = Arc::new(AtomicBool::new(false));
    let interrupt_out = interrupt_flag.clone();

    let output_data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        if interrupt_out.swap(false, Ordering::AcqRel) {
            while audio_out_rx.try_pop().is_some() {}
        }
        let mut sample_index = 0;
        while sample_index < data.len() {
            let sample = audio_out_rx.try_pop().unwrap_or(0.0);
            // Left channel (ch:0).
            if sample_index < data.len() {
                data[sample_index] = sample;
                sample_index += 1;
            }
            // Right channel (ch:1), if it exists.
            if output_channel_count > 1 && sample_index < data.len() {
                data[sample_index] = sample;
                sample_index += 1;
            }
            // Ignore other channels.
            sample_index += output_channel_count.saturating_sub(2);
        }
    };
    let output_stream = output.build_output_stream(
        &output_config,
        output_data_fn,
        move |err| tracing::error!("An error occurred on output stream: {}", err),
        None,
    )?;
    output_stream.play()?;

    // --- Resamplers ---
    let mut in_resampler = jarvis_audio::pcm::create_resampler(
        input_sample_rate,
        CAPTURE_SAMPLE_RATE,
        INPUT_CHUNK_SIZE,
    )?;
    let mut out_resampler =
        jarvis_audio::pcm::create_resampler(PLAYBACK_SAMPLE_RATE, output_sample_rate, 100)?;

    // --- Orchestrator ---
    let clock: Arc<SystemClock> = Arc::new(SystemClock::new());
    let capability = Arc::new(CapabilityClient::new(config.api_key.clone()));
    let vault = MemoryVault::open(Box::new(JsonFileStore::new(config.memory_path.clone())));
    let mut orchestrator = Orchestrator::new(capability, vault, clock.clone());

    // --- User input ---
    let command_tx = input_tx.clone();
    let stdin_handle = tokio::spawn(async move {
        use tokio::io::AsyncBufReadExt;
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if command_tx.send(Input::Command(line)).await.is_err() {
                break;
            }
        }
    });

    // --- HUD gauges ---
    let tick_tx = input_tx.clone();
    let tick_handle = tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(STATUS_TICK_SECS));
        loop {
            interval.tick().await;
            if tick_tx.send(Input::StatusTick).await.is_err() {
                break;
            }
        }
    });

    // Drains the pending playback tail into the ring as the device
    // callback frees space.
    let pump_tx = input_tx.clone();
    let pump_handle = tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_millis(PLAYBACK_PUMP_MS));
        loop {
            interval.tick().await;
            if pump_tx.send(Input::PlaybackPump).await.is_err() {
                break;
            }
        }
    });

    println!("JARVIS online. Commands: /connect /disconnect /attach <file> /ratio <r> /memories /quit");
    println!("Anything else is routed as a command.");

    let mut link: Option<Link> = None;
    let mut capture_buffer: VecDeque<f32> = VecDeque::with_capacity(INPUT_CHUNK_SIZE * 2);

    let loop_result: Result<()> = async {
        while let Some(event) = input_rx.recv().await {
            match event {
                Input::Audio(frame) => {
                    if orchestrator.phase() != jarvis_core::SessionPhase::Live {
                        continue;
                    }
                    capture_buffer.extend(frame);
                    let mut resampled: Vec<f32> = vec![];
                    while capture_buffer.len() >= INPUT_CHUNK_SIZE {
                        let chunk: Vec<f32> = capture_buffer.drain(..INPUT_CHUNK_SIZE).collect();
                        if let Ok(frames) = in_resampler.process(&[chunk.as_slice()], None) {
                            if let Some(frames) = frames.first() {
                                resampled.extend(frames.iter().cloned());
                            }
                        }
                    }
                    if resampled.is_empty() {
                        continue;
                    }
                    if let Some(event) = orchestrator.capture_frame(&resampled) {
                        if let Some(link) = link.as_ref() {
                            if let Err(e) = link.client.send(event).await {
                                tracing::error!("Failed to forward capture frame: {:?}", e);
                            }
                        }
                    }
                }
                Input::Command(line) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    if line == "/quit" {
                        break;
                    }
                    handle_command_line(
                        &line,
                        &mut orchestrator,
                        &mut link,
                        &config,
                        &input_tx,
                        &mut out_resampler,
                        &mut feeder,
                        &interrupt_flag,
                        clock.clone(),
                    )
                    .await;
                }
                Input::Server(server_event) => {
                    let actions = orchestrator.handle_server_event(server_event).await;
                    execute_actions(
                        actions,
                        &link,
                        &input_tx,
                        &mut out_resampler,
                        &mut feeder,
                        clock.clone(),
                    )
                    .await;
                    if orchestrator.phase() == jarvis_core::SessionPhase::Closed {
                        if let Some(link) = link.take() {
                            link.shutdown();
                        }
                        feeder.clear();
                        interrupt_flag.store(true, Ordering::Release);
                    }
                }
                Input::PlaybackDone(id) => {
                    if !orchestrator.playback_complete(id) {
                        tracing::debug!("Jarvis finished speaking");
                    }
                }
                Input::PlaybackPump => {
                    feeder.pump();
                }
                Input::StatusTick => {
                    orchestrator.hud.status.tick();
                }
            }
        }
        Ok(())
    }
    .await;

    if let Some(link) = link.take() {
        link.shutdown();
    }
    stdin_handle.abort();
    tick_handle.abort();
    pump_handle.abort();
    tracing::info!("Shutting down...");
    loop_result
}

/// Parses one typed line: slash commands drive the session and HUD
/// controls, everything else goes to the request router.
#[allow(clippy::too_many_arguments)]
async fn handle_command_line<P: Producer<Item = f32>>(
    line: &str,
    orchestrator: &mut Orchestrator,
    link: &mut Option<Link>,
    config: &Config,
    input_tx: &tokio::sync::mpsc::Sender<Input>,
    out_resampler: &mut impl Resampler<f32>,
    feeder: &mut OutputFeeder<P>,
    interrupt_flag: &Arc<AtomicBool>,
    clock: Arc<SystemClock>,
) {
    match line.split_once(' ') {
        _ if line == "/connect" => {
            if !orchestrator.begin_connect() {
                return;
            }
            match open_link(config, input_tx.clone()).await {
                Ok(new_link) => {
                    *link = Some(new_link);
                }
                Err(e) => {
                    orchestrator.connect_failed(&e.to_string());
                }
            }
        }
        _ if line == "/disconnect" => {
            orchestrator.disconnect(Some("user request"));
            if let Some(link) = link.take() {
                link.shutdown();
            }
            feeder.clear();
            interrupt_flag.store(true, Ordering::Release);
        }
        _ if line == "/memories" => {
            for fact in orchestrator.vault.facts() {
                println!("[{}] {}", fact.category, fact.content);
            }
        }
        Some(("/attach", path)) => {
            let path = Path::new(path.trim());
            match std::fs::read(path) {
                Ok(bytes) => {
                    let name = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("attachment")
                        .to_string();
                    orchestrator.attach_file(Attachment {
                        mime_type: guess_mime(path).to_string(),
                        name,
                        bytes,
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to read attachment {:?}: {}", path, e);
                }
            }
        }
        Some(("/ratio", ratio)) => match AspectRatio::parse(ratio.trim()) {
            Some(ratio) => {
                orchestrator.hud.selected_ratio = ratio;
                tracing::info!("Aspect ratio set to {}", ratio.as_str());
            }
            None => {
                tracing::error!("Unknown aspect ratio {:?}", ratio.trim());
            }
        },
        _ => {
            let actions = orchestrator.handle_command(line).await;
            execute_actions(actions, &*link, input_tx, out_resampler, feeder, clock).await;
        }
    }
}

/// Opens the realtime websocket and pumps its server events into the
/// orchestrating loop.
async fn open_link(
    config: &Config,
    input_tx: tokio::sync::mpsc::Sender<Input>,
) -> Result<Link> {
    let mut builder = jarvis_realtime::Config::builder()
        .with_api_key(config.api_key.expose_secret());
    if let Some(model) = &config.realtime_model {
        builder = builder.with_model(model);
    }
    let (client, connection) =
        jarvis_realtime::connect_with_config(1024, builder.build()).await?;

    let mut server_events = client.server_events()?;
    let pump = tokio::spawn(async move {
        loop {
            match server_events.recv().await {
                Ok(event) => {
                    if input_tx.send(Input::Server(event)).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Server event pump lagged by {} events", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    Ok(Link {
        client,
        connection,
        pump,
    })
}

/// Executes the side effects an orchestrator step produced.
async fn execute_actions<P: Producer<Item = f32>>(
    actions: Vec<Action>,
    link: &Option<Link>,
    input_tx: &tokio::sync::mpsc::Sender<Input>,
    out_resampler: &mut impl Resampler<f32>,
    feeder: &mut OutputFeeder<P>,
    clock: Arc<SystemClock>,
) {
    for action in actions {
        match action {
            Action::Send(event) => {
                if let Some(link) = link.as_ref() {
                    if let Err(e) = link.client.send(event).await {
                        tracing::error!("Failed to send client event: {:?}", e);
                    }
                } else {
                    tracing::warn!("Dropping client event: no live link");
                }
            }
            Action::Play(scheduled) => {
                // Resample to the device rate and queue for playback.
                // The feeder holds whatever the ring cannot take yet.
                let chunk_size = out_resampler.input_frames_next();
                for samples in
                    jarvis_audio::pcm::split_for_chunks(scheduled.buffer.samples(), chunk_size)
                {
                    if let Ok(frames) = out_resampler.process(&[samples.as_slice()], None) {
                        if let Some(frames) = frames.first() {
                            feeder.enqueue(frames);
                        }
                    }
                }

                // Report natural completion at the scheduled end time.
                let delay = (scheduled.end_at() - clock.now()).max(0.0);
                let done_tx = input_tx.clone();
                let id = scheduled.id;
                tokio::spawn(async move {
                    tokio::time::sleep(std::time::Duration::from_secs_f64(delay)).await;
                    let _ = done_tx.send(Input::PlaybackDone(id)).await;
                });
            }
        }
    }
}
