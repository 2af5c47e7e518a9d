use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::llm::{ChatMessage, LlmClient};
use crate::scanner::truncate;

const ANALYSIS_PROMPT: &str = "You are a code deobfuscation assistant. \
The user sends a snippet that may be obfuscated, minified, or contain encoded payloads. \
Explain concisely what the code does, list any obfuscation techniques used \
(base64, hex escapes, string splitting, eval chains, packers), show deobfuscated \
versions of the important parts, and call out anything that looks malicious. \
Answer in plain text without markdown tables.";

/// Something that can explain a piece of (possibly obfuscated) code.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, code: &str) -> Result<String>;
}

/// Analyzer backed by a chat-completions model.
pub struct LlmAnalyzer {
    llm: LlmClient,
}

impl LlmAnalyzer {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Analyzer for LlmAnalyzer {
    async fn analyze(&self, code: &str) -> Result<String> {
        let input = truncate(code, self.llm.config().max_input_chars);
        info!("Requesting analysis of {} chars", input.chars().count());

        let messages = [ChatMessage::system(ANALYSIS_PROMPT), ChatMessage::user(input)];
        self.llm.chat(&messages).await
    }
}
