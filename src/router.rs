use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use teloxide::types::BotCommand;
use teloxide::utils::command::{BotCommands, ParseError};
use teloxide::utils::html::escape;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::analyzer::{Analyzer, LlmAnalyzer};
use crate::chunker::{outgoing_chunks, utf16_len, MESSAGE_CHUNK_LIMIT, TRANSPORT_MESSAGE_LIMIT};
use crate::codec::{self, CodecError};
use crate::config::{CommandKind, CommandSet, Config};
use crate::llm::LlmClient;
use crate::platform::{Attachment, Reply, ReplyFormat};
use crate::scanner::{self, truncate, FoundMatch};
use crate::scratch::ScratchStore;

pub const ALLOWED_EXTENSIONS: [&str; 6] = ["js", "py", "txt", "json", "html", "css"];
pub const MAX_UPLOAD_BYTES: u64 = 1024 * 1024;

pub const ANALYSIS_UNAVAILABLE: &str =
    "⚠️ AI analysis is currently unavailable. Please try again later.";

const ECHO_PREVIEW_CHARS: usize = 500;
const SCRATCH_FILE_NAME: &str = "result.txt";

/// Bot commands that can be invoked with /.
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Show the welcome guide")]
    Start,

    #[command(description = "Show usage examples")]
    Help,

    #[command(description = "Encode text to base64", parse_with = trimmed_args)]
    Encode(String),

    #[command(description = "Decode base64 back to text", parse_with = trimmed_args)]
    Decode(String),

    #[command(description = "AI deobfuscation analysis of code", parse_with = trimmed_args)]
    Analyze(String),

    #[command(description = "Find and decode base64 strings in text", parse_with = trimmed_args)]
    Findb64(String),
}

/// Arguments are everything after the command word, possibly empty.
fn trimmed_args(input: String) -> Result<(String,), ParseError> {
    Ok((input.trim().to_string(),))
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Start => CommandKind::Start,
            Command::Help => CommandKind::Help,
            Command::Encode(_) => CommandKind::Encode,
            Command::Decode(_) => CommandKind::Decode,
            Command::Analyze(_) => CommandKind::Analyze,
            Command::Findb64(_) => CommandKind::Findb64,
        }
    }
}

/// Why an uploaded file was refused before any processing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadRejection {
    #[error("❌ File type not allowed. Supported extensions: .js, .py, .txt, .json, .html, .css")]
    ExtensionNotAllowed,

    #[error("❌ File is too large. Maximum size is 1 MB.")]
    TooLarge,
}

/// Where an incoming text message goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Command(Command),
    /// Free text, or a command we don't know.
    Fallback,
}

impl Route {
    /// Whether handling may take long enough to warrant a typing indicator.
    pub fn is_slow(&self) -> bool {
        matches!(self, Route::Command(Command::Analyze(_)))
    }
}

/// Classify a text message. Commands addressed to another bot fall back.
pub fn parse_route(text: &str, bot_username: Option<&str>) -> Route {
    // The command parser splits on a space only; let a newline or tab after
    // the command word separate arguments too.
    let text = text.trim_start();
    let normalized = match text.find(char::is_whitespace) {
        Some(idx) => format!("{} {}", &text[..idx], &text[idx..]),
        None => text.to_string(),
    };

    match Command::parse(&normalized, bot_username.unwrap_or_default()) {
        Ok(command) => Route::Command(command),
        Err(e) => {
            debug!("Not a command ({}), using fallback route", e);
            Route::Fallback
        }
    }
}

/// Check an upload's name and declared size.
pub fn check_upload(file_name: Option<&str>, size: u64) -> Result<(), UploadRejection> {
    let allowed = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false);

    if !allowed {
        return Err(UploadRejection::ExtensionNotAllowed);
    }
    if size > MAX_UPLOAD_BYTES {
        return Err(UploadRejection::TooLarge);
    }
    Ok(())
}

/// Split a reply into transport-sized messages, labelling each part when
/// there is more than one.
pub fn render(reply: &Reply) -> Vec<String> {
    let chunks = outgoing_chunks(&reply.text, MESSAGE_CHUNK_LIMIT);
    if chunks.len() == 1 {
        return chunks.into_iter().map(|c| c.text).collect();
    }
    let parts: Vec<String> = chunks
        .into_iter()
        .map(|c| match reply.format {
            ReplyFormat::Html => format!("<b>{}</b>\n\n{}", c.label(), c.text),
            ReplyFormat::Plain => format!("{}\n\n{}", c.label(), c.text),
        })
        .collect();
    debug_assert!(parts.iter().all(|p| utf16_len(p) <= TRANSPORT_MESSAGE_LIMIT));
    parts
}

/// Maps incoming messages to codec, scanner and analysis operations.
/// Holds no per-chat state.
pub struct Router {
    commands: CommandSet,
    analyzer: Option<Arc<dyn Analyzer>>,
    scratch: Option<ScratchStore>,
}

impl Router {
    pub fn new(commands: CommandSet, analyzer: Option<Arc<dyn Analyzer>>) -> Self {
        Self {
            commands,
            analyzer,
            scratch: None,
        }
    }

    pub fn with_scratch(mut self, scratch: ScratchStore) -> Self {
        self.scratch = Some(scratch);
        self
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let analyzer: Option<Arc<dyn Analyzer>> = if config.analysis_available() {
            let llm = LlmClient::new(config.llm.clone())?;
            Some(Arc::new(LlmAnalyzer::new(llm)))
        } else {
            if config.analysis_misconfigured() {
                warn!("No AI API key configured; analysis commands are disabled");
            }
            None
        };

        let router = Router::new(config.commands.enabled.clone(), analyzer);
        if !config.scratch.enabled {
            return Ok(router);
        }
        let scratch = ScratchStore::new(&config.scratch);
        info!(
            "Scratch file: {} (expires after {}s)",
            scratch.path().display(),
            config.scratch.ttl_secs
        );
        Ok(router.with_scratch(scratch))
    }

    pub fn analysis_available(&self) -> bool {
        self.analyzer.is_some()
    }

    /// Menu entries for the enabled commands, in declaration order.
    pub fn bot_commands(&self) -> Vec<BotCommand> {
        Command::bot_commands()
            .into_iter()
            .filter(|cmd| {
                let name = cmd.command.trim_start_matches('/');
                CommandKind::ALL
                    .into_iter()
                    .any(|kind| kind.name() == name && self.commands.contains(kind))
            })
            .collect()
    }

    pub async fn handle_route(&self, route: Route) -> Reply {
        let command = match route {
            Route::Command(command) => command,
            Route::Fallback => return self.start(),
        };

        let kind = command.kind();
        if !self.commands.contains(kind) {
            return Reply::plain(format!(
                "This command is not enabled on this bot: /{}",
                kind.name()
            ));
        }

        match command {
            Command::Start => self.start(),
            Command::Help => self.help(),
            Command::Encode(args)
            | Command::Decode(args)
            | Command::Analyze(args)
            | Command::Findb64(args)
                if args.is_empty() =>
            {
                usage_hint(kind)
            }
            Command::Encode(text) => self.encode(&text).await,
            Command::Decode(input) => self.decode(&input).await,
            Command::Analyze(code) => self.analyze(&code).await,
            Command::Findb64(text) => find_b64(&text),
        }
    }

    pub async fn handle_document(&self, file_name: Option<&str>, bytes: &[u8]) -> Reply {
        if let Err(rejection) = check_upload(file_name, bytes.len() as u64) {
            info!("Rejected upload {:?}: {:?}", file_name, rejection);
            return Reply::plain(rejection.to_string());
        }
        let file_name = file_name.unwrap_or("file");

        if bytes.is_empty() {
            return Reply::plain("❌ The file is empty. Send a file with some code in it.");
        }

        let content = match std::str::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                error!("Uploaded file {} is not UTF-8: {}", file_name, e);
                return Reply::plain("❌ The file is not valid UTF-8 text.");
            }
        };

        let analysis = self
            .run_analysis(content)
            .await
            .unwrap_or_else(|| ANALYSIS_UNAVAILABLE.to_string());
        let found = scanner::find_encoded_substrings(content);

        let mut report = format!(
            "📄 <b>Report for {}</b> ({} bytes)\n\n🔍 <b>AI analysis:</b>\n{}\n\n",
            escape(file_name),
            bytes.len(),
            escape(&analysis)
        );
        report.push_str(&format_matches(&found));
        Reply::html(report)
    }

    fn start(&self) -> Reply {
        let mut text = String::from(
            "🤖 <b>Welcome to Code Encoder Bot!</b>\n\n\
             This bot encodes code to base64 and back",
        );
        if self.commands.contains(CommandKind::Analyze) && self.analysis_available() {
            text.push_str(", and explains obfuscated code with AI");
        }
        text.push_str(".\n\n📝 <b>Available commands:</b>\n");
        for cmd in self.bot_commands() {
            text.push_str(&format!(
                "/{} - {}\n",
                cmd.command.trim_start_matches('/'),
                cmd.description
            ));
        }
        text.push_str(
            "\n📎 You can also upload a .js, .py, .txt, .json, .html or .css file (max 1 MB) \
             for a full report.",
        );
        Reply::html(text)
    }

    fn help(&self) -> Reply {
        let mut text = String::from("📚 <b>How to use:</b>\n");
        for cmd in self.bot_commands() {
            let name = cmd.command.trim_start_matches('/');
            if let Some(example) = usage_example(name) {
                text.push_str(&format!(
                    "\n<b>/{}</b> - {}\n<code>{}</code>\n",
                    name,
                    cmd.description,
                    escape(example)
                ));
            }
        }
        text.push_str("\nSending plain text without a command shows the welcome guide.");
        Reply::html(text)
    }

    async fn encode(&self, text: &str) -> Reply {
        let encoded = codec::encode(text);
        let body = format!(
            "✅ <b>Encoded successfully!</b>\n\n📝 <b>Original:</b>\n<pre>{}</pre>\n\n🔐 <b>Base64:</b>\n<pre>{}</pre>",
            escape(&truncate(text, ECHO_PREVIEW_CHARS)),
            escape(&encoded)
        );
        self.attach_scratch(Reply::html(body), encoded).await
    }

    async fn decode(&self, input: &str) -> Reply {
        match codec::decode(input) {
            Ok(decoded) => {
                let body = format!(
                    "✅ <b>Decoded successfully!</b>\n\n📝 <b>Text:</b>\n<pre>{}</pre>",
                    escape(&decoded)
                );
                self.attach_scratch(Reply::html(body), decoded).await
            }
            Err(e) => {
                error!("Decode failed: {}", e);
                Reply::plain(match e {
                    CodecError::InvalidBase64(_) => {
                        "❌ Decoding failed: the input is not valid base64."
                    }
                    CodecError::InvalidUtf8(_) => {
                        "❌ Decoding failed: the decoded bytes are not UTF-8 text."
                    }
                })
            }
        }
    }

    async fn analyze(&self, code: &str) -> Reply {
        match self.run_analysis(code).await {
            Some(analysis) => Reply::html(format!("🔍 <b>Analysis:</b>\n\n{}", escape(&analysis))),
            None => Reply::plain(ANALYSIS_UNAVAILABLE),
        }
    }

    /// A single attempt. `None` when the service is missing or failed.
    async fn run_analysis(&self, code: &str) -> Option<String> {
        let Some(analyzer) = &self.analyzer else {
            warn!("Analysis requested but no AI service is configured");
            return None;
        };
        match analyzer.analyze(code).await {
            Ok(analysis) => Some(analysis),
            Err(e) => {
                error!("AI analysis failed: {:#}", e);
                None
            }
        }
    }

    /// Write the shared scratch file and attach this request's own copy of
    /// the content to the reply.
    async fn attach_scratch(&self, reply: Reply, content: String) -> Reply {
        let Some(scratch) = &self.scratch else {
            return reply;
        };
        let file_name = match scratch.write(&content).await {
            Ok(path) => path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(SCRATCH_FILE_NAME)
                .to_string(),
            Err(e) => {
                warn!("Failed to write scratch file: {:#}", e);
                SCRATCH_FILE_NAME.to_string()
            }
        };
        reply.with_attachment(Attachment {
            file_name,
            content: content.into_bytes(),
        })
    }
}

fn find_b64(text: &str) -> Reply {
    Reply::html(format_matches(&scanner::find_encoded_substrings(text)))
}

fn format_matches(found: &[FoundMatch]) -> String {
    if found.is_empty() {
        return "🔎 No base64 strings found.".to_string();
    }
    let mut text = format!("🔎 <b>Found {} base64 string(s):</b>\n", found.len());
    for (i, m) in found.iter().enumerate() {
        text.push_str(&format!(
            "\n<b>{}.</b> <code>{}</code>\n➡️ <code>{}</code>\n",
            i + 1,
            escape(&m.encoded),
            escape(&m.decoded)
        ));
    }
    text
}

fn usage_example(name: &str) -> Option<&'static str> {
    match name {
        "encode" => Some("/encode print(\"Hello World\")"),
        "decode" => Some("/decode cHJpbnQoIkhlbGxvIFdvcmxkIik="),
        "analyze" => Some("/analyze eval(atob('YWxlcnQoMSk='))"),
        "findb64" => Some("/findb64 var s = \"aGlkZGVuIHBheWxvYWQgaW5zaWRl\";"),
        _ => None,
    }
}

fn usage_hint(kind: CommandKind) -> Reply {
    let what = match kind {
        CommandKind::Encode => "the text to encode",
        CommandKind::Decode => "the base64 string to decode",
        CommandKind::Analyze => "the code to analyze",
        CommandKind::Findb64 => "the text to scan",
        CommandKind::Start | CommandKind::Help => "an argument",
    };
    Reply::plain(format!(
        "❌ Please provide {}!\n\nUsage: /{} <text>",
        what,
        kind.name()
    ))
}
