//! Interactive terminal form
//!
//! The form walks through URL entry, output directory, source and method,
//! then hands the request to a background task. Progress from that task
//! comes back over a channel and is rendered between prompts.

use crate::cli::OutputFormatter;
use crate::core::{
    detect_handler, Credentials, Downloader, DriveMethod, HandlerOptions, InstagramAuth,
    ProgressEvent, Source,
};
use crate::error::MultidlError;
use crate::utils::{is_http_url, split_url_list};
use crate::Result;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const EMPTY_URLS_MESSAGE: &str = "Please enter one or more URLs";

/// Single-download-at-a-time flag shared by the form and its worker
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<AtomicBool>);

impl InFlight {
    /// Claim the slot, or fail with `InFlight` if a download is running
    pub fn try_acquire(&self) -> Result<InFlightGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| InFlightGuard(self.0.clone()))
            .map_err(|_| MultidlError::InFlight)
    }

    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Releases the in-flight slot when dropped
#[derive(Debug)]
pub struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormStep {
    Urls,
    OutputDir,
    Source,
    Method,
    Username,
    Password,
    SessionFile,
}

/// A completed form submission
#[derive(Debug, Clone)]
pub struct FormRequest {
    pub urls: Vec<String>,
    pub out_dir: PathBuf,
    pub source: Source,
    pub options: HandlerOptions,
    /// Credentials to cache before downloading
    pub credentials: Option<Credentials>,
}

#[derive(Debug)]
pub enum FormAction {
    /// Input accepted, show the next prompt
    Continue,
    /// Input rejected, show the message and ask again
    Invalid(String),
    Submit(FormRequest),
    Quit,
}

/// Messages from the download worker back to the form loop
#[derive(Debug, Clone, PartialEq)]
pub enum FormEvent {
    Progress(ProgressEvent),
    Done { succeeded: usize, failed: usize },
}

/// Form state machine, fed one line of input at a time
#[derive(Debug, Clone)]
pub struct FormState {
    step: FormStep,
    default_dir: PathBuf,
    base_options: HandlerOptions,
    urls: Vec<String>,
    out_dir: PathBuf,
    source: Option<Source>,
    options: HandlerOptions,
    username: String,
}

impl FormState {
    pub fn new(default_dir: impl Into<PathBuf>) -> Self {
        let default_dir = default_dir.into();
        Self {
            step: FormStep::Urls,
            out_dir: default_dir.clone(),
            default_dir,
            base_options: HandlerOptions::default(),
            urls: Vec::new(),
            source: None,
            options: HandlerOptions::default(),
            username: String::new(),
        }
    }

    /// Options every submission starts from
    pub fn with_base_options(mut self, options: HandlerOptions) -> Self {
        self.options = options.clone();
        self.base_options = options;
        self
    }

    pub fn step(&self) -> FormStep {
        self.step
    }

    fn reset(&mut self) {
        self.step = FormStep::Urls;
        self.urls.clear();
        self.out_dir = self.default_dir.clone();
        self.source = None;
        self.options = self.base_options.clone();
        self.username.clear();
    }

    /// Text asking for the current step's input
    pub fn prompt(&self) -> String {
        match self.step {
            FormStep::Urls => "URLs (comma separated, :q to quit)".to_string(),
            FormStep::OutputDir => format!("Output directory [{}]", self.default_dir.display()),
            FormStep::Source => {
                let menu: Vec<String> = Source::ALL
                    .iter()
                    .enumerate()
                    .map(|(i, source)| format!("{}) {}", i + 1, source))
                    .collect();
                format!("Source {} [blank = detect]", menu.join("  "))
            }
            FormStep::Method => match self.source {
                Some(Source::GoogleDrive) => "Method 1) public  2) authenticated [1]".to_string(),
                _ => "Method 1) unauthenticated  2) authenticated [1]".to_string(),
            },
            FormStep::Username => "Instagram username".to_string(),
            FormStep::Password => "Password (blank to load a session file)".to_string(),
            FormStep::SessionFile => "Instaloader session file".to_string(),
        }
    }

    /// Advance the form with one line of input
    pub fn handle_input(&mut self, line: &str) -> FormAction {
        let input = line.trim();
        if matches!(input, ":q" | "quit") {
            return FormAction::Quit;
        }

        match self.step {
            FormStep::Urls => {
                let urls = split_url_list(input);
                if urls.is_empty() {
                    return FormAction::Invalid(EMPTY_URLS_MESSAGE.to_string());
                }
                if let Some(bad) = urls.iter().find(|url| !is_http_url(url)) {
                    return FormAction::Invalid(format!("Not an http(s) URL: {}", bad));
                }
                self.urls = urls;
                self.step = FormStep::OutputDir;
                FormAction::Continue
            }
            FormStep::OutputDir => {
                self.out_dir = if input.is_empty() {
                    self.default_dir.clone()
                } else {
                    PathBuf::from(input)
                };
                self.step = FormStep::Source;
                FormAction::Continue
            }
            FormStep::Source => {
                let source = match parse_source_choice(input) {
                    Some(source) => source,
                    None if input.is_empty() => match self.detect_source() {
                        Some(source) => source,
                        None => {
                            return FormAction::Invalid(
                                "Could not detect the source, pick one from the list".to_string(),
                            )
                        }
                    },
                    None => return FormAction::Invalid(format!("Unknown source: {}", input)),
                };
                self.source = Some(source);

                if matches!(source, Source::GoogleDrive | Source::Instagram) {
                    self.step = FormStep::Method;
                    FormAction::Continue
                } else {
                    self.submit(None)
                }
            }
            FormStep::Method => {
                let authenticated = match input {
                    "" | "1" => false,
                    "2" => true,
                    other => match other.to_lowercase().as_str() {
                        "public" | "unauthenticated" => false,
                        "authenticated" => true,
                        _ => return FormAction::Invalid(format!("Unknown method: {}", other)),
                    },
                };

                match (self.source, authenticated) {
                    (Some(Source::GoogleDrive), true) => {
                        self.options.drive_method = DriveMethod::Authenticated;
                        self.submit(None)
                    }
                    (Some(Source::Instagram), true) => {
                        self.options.instagram_auth = InstagramAuth::Authenticated;
                        self.step = FormStep::Username;
                        FormAction::Continue
                    }
                    _ => self.submit(None),
                }
            }
            FormStep::Username => {
                if input.is_empty() {
                    return FormAction::Invalid("A username is required".to_string());
                }
                self.username = input.to_string();
                self.step = FormStep::Password;
                FormAction::Continue
            }
            FormStep::Password => {
                if input.is_empty() {
                    self.step = FormStep::SessionFile;
                    return FormAction::Continue;
                }
                // Password is taken untrimmed
                let password = line.trim_end_matches(['\r', '\n']).to_string();
                let credentials = Credentials::Password {
                    username: self.username.clone(),
                    password,
                };
                self.submit(Some(credentials))
            }
            FormStep::SessionFile => {
                if input.is_empty() {
                    return FormAction::Invalid("A session file path is required".to_string());
                }
                let credentials = Credentials::SessionFile {
                    username: self.username.clone(),
                    path: PathBuf::from(input),
                };
                self.submit(Some(credentials))
            }
        }
    }

    fn detect_source(&self) -> Option<Source> {
        self.urls.iter().find_map(|url| detect_handler("", url))
    }

    fn submit(&mut self, credentials: Option<Credentials>) -> FormAction {
        let Some(source) = self.source else {
            self.reset();
            return FormAction::Invalid("No source selected".to_string());
        };

        let mut options = self.options.clone();
        if credentials.is_some() {
            options = options.with_instagram_username(self.username.clone());
        }

        let request = FormRequest {
            urls: std::mem::take(&mut self.urls),
            out_dir: self.out_dir.clone(),
            source,
            options,
            credentials,
        };
        self.reset();
        FormAction::Submit(request)
    }
}

/// Menu number or source name
fn parse_source_choice(input: &str) -> Option<Source> {
    if let Ok(index) = input.parse::<usize>() {
        return index.checked_sub(1).and_then(|i| Source::ALL.get(i).copied());
    }
    input.parse().ok()
}

/// Download every URL of `request`; per-URL failures do not stop the rest
pub async fn process_request(
    downloader: Arc<Downloader>,
    request: FormRequest,
    events: UnboundedSender<FormEvent>,
    guard: InFlightGuard,
) {
    let mut succeeded = 0;
    let mut failed = 0;

    for url in &request.urls {
        match downloader
            .download_to(request.source, url, &request.out_dir, &request.options)
            .await
        {
            Ok(_) => succeeded += 1,
            Err(e) => {
                warn!("Form download failed for {}: {}", url, e);
                failed += 1;
            }
        }
    }

    drop(guard);
    let _ = events.send(FormEvent::Done { succeeded, failed });
}

fn show_prompt(prompt: &str) {
    print!("\n>>> {}: ", prompt);
    let _ = std::io::stdout().flush();
}

/// Read one line with terminal echo off; `None` when stdin is not a terminal
async fn read_hidden_line() -> Result<Option<String>> {
    if !std::io::stdin().is_terminal() {
        return Ok(None);
    }
    let line = tokio::task::spawn_blocking(rpassword::read_password)
        .await
        .map_err(|e| MultidlError::Generic(format!("password prompt failed: {}", e)))??;
    Ok(Some(line))
}

/// Cache the request's credentials, then start its download task
///
/// Fails with `InFlight` while another request is running, or with the
/// authentication error, in which case nothing is downloaded.
pub async fn start_request(
    downloader: Arc<Downloader>,
    request: FormRequest,
    in_flight: &InFlight,
    events: UnboundedSender<FormEvent>,
) -> Result<JoinHandle<()>> {
    let guard = in_flight.try_acquire()?;

    if let Some(credentials) = request.credentials.clone() {
        downloader.authenticate(request.source, credentials).await?;
        info!("Cached {} credentials", request.source);
    }

    info!("Form submitted {} URL(s) for {}", request.urls.len(), request.source);
    Ok(tokio::spawn(process_request(downloader, request, events, guard)))
}

/// Everything the form loop needs besides its input streams
struct FormSession {
    downloader: Arc<Downloader>,
    events_tx: UnboundedSender<FormEvent>,
    in_flight: InFlight,
    formatter: Arc<OutputFormatter>,
    worker: Option<JoinHandle<()>>,
}

impl FormSession {
    /// Act on one transition; `false` once the user quits
    async fn apply(&mut self, action: FormAction) -> bool {
        match action {
            FormAction::Continue => {}
            FormAction::Invalid(message) => self.formatter.error(&message),
            FormAction::Quit => return false,
            FormAction::Submit(request) => {
                let has_credentials = request.credentials.is_some();
                match start_request(
                    self.downloader.clone(),
                    request,
                    &self.in_flight,
                    self.events_tx.clone(),
                )
                .await
                {
                    Ok(worker) => {
                        if has_credentials {
                            self.formatter.success("Session saved");
                        }
                        self.worker = Some(worker);
                    }
                    Err(MultidlError::InFlight) => {
                        self.formatter.warning(&MultidlError::InFlight.to_string())
                    }
                    Err(e) => self.formatter.error(&format!("Authentication failed: {}", e)),
                }
            }
        }
        true
    }
}

/// Run the form until the user quits or stdin closes
pub async fn run_form(
    downloader: Arc<Downloader>,
    events_tx: UnboundedSender<FormEvent>,
    mut events: UnboundedReceiver<FormEvent>,
    mut state: FormState,
    formatter: Arc<OutputFormatter>,
) -> Result<()> {
    let mut session = FormSession {
        downloader,
        events_tx,
        in_flight: InFlight::default(),
        formatter: formatter.clone(),
        worker: None,
    };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    formatter.info("multidl form - enter URLs to download");
    show_prompt(&state.prompt());

    loop {
        if state.step() == FormStep::Password {
            if let Some(password) = read_hidden_line().await? {
                if !session.apply(state.handle_input(&password)).await {
                    break;
                }
                show_prompt(&state.prompt());
                continue;
            }
        }

        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("stdin closed");
                    break;
                };
                if !session.apply(state.handle_input(&line)).await {
                    break;
                }
                show_prompt(&state.prompt());
            }
            Some(event) = events.recv() => match event {
                FormEvent::Progress(event) => formatter.handle_event(&event),
                FormEvent::Done { succeeded, failed } => {
                    if failed == 0 {
                        formatter.success(&format!("Finished {} download(s)", succeeded));
                    } else {
                        formatter.warning(&format!("Finished: {} succeeded, {} failed", succeeded, failed));
                    }
                    show_prompt(&state.prompt());
                }
            },
        }
    }

    if let Some(worker) = session.worker.take() {
        if session.in_flight.is_busy() {
            formatter.info("Waiting for the running download to finish...");
        }
        let _ = worker.await;
        while let Ok(event) = events.try_recv() {
            if let FormEvent::Progress(event) = event {
                formatter.handle_event(&event);
            }
        }
    }

    Ok(())
}
